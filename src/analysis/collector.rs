// Repository file collection

use crate::error::{Error, Result};
use glob::{MatchOptions, Pattern};
use std::path::{Component, Path, PathBuf};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

/// Directories never descended into
const PRUNED_DIRS: [&str; 14] = [
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    ".surveyor-cache",
    "__pycache__",
    ".idea",
    ".vscode",
    ".gradle",
    ".mvn",
    ".tox",
    ".venv",
    "venv",
    "coverage",
];

/// Directory names holding tests or fixtures
const TEST_DIRS: [&str; 9] = [
    "test",
    "tests",
    "__tests__",
    "spec",
    "specs",
    "testing",
    "fixtures",
    "__mocks__",
    "e2e",
];

/// Whether a repository-relative path is a test file or lives in a test directory
///
/// Every plugin filters on this before extraction, so fixtures never leak
/// actors or external systems into the result.
pub fn is_test_path(relative: &Path) -> bool {
    let mut components: Vec<&str> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect();
    let Some(file_name) = components.pop() else {
        return false;
    };

    if components
        .iter()
        .any(|dir| TEST_DIRS.contains(&dir.to_ascii_lowercase().as_str()))
    {
        return true;
    }

    let lower = file_name.to_ascii_lowercase();
    let stem = lower.split('.').next().unwrap_or(&lower);
    let original_stem = file_name.split('.').next().unwrap_or(file_name);

    stem.starts_with("test_")
        || stem.ends_with("_test")
        || stem.ends_with("_tests")
        || stem.ends_with("_spec")
        || stem == "tests"
        || stem == "conftest"
        || lower.contains(".test.")
        || lower.contains(".spec.")
        || lower.contains(".e2e.")
        || original_stem.ends_with("Test")
        || original_stem.ends_with("Tests")
}

/// Walks a repository and returns the files worth analyzing
pub struct FileCollector {
    excludes: Vec<Pattern>,
}

impl FileCollector {
    /// Create a collector from exclusion globs (relative to the root)
    pub fn new(patterns: &[String]) -> Result<Self> {
        let excludes = patterns
            .iter()
            .map(|p| Pattern::new(p))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { excludes })
    }

    fn match_options() -> MatchOptions {
        MatchOptions {
            case_sensitive: true,
            require_literal_separator: false,
            require_literal_leading_dot: false,
        }
    }

    /// Whether a relative path matches an exclusion pattern
    pub fn is_excluded(&self, relative: &Path) -> bool {
        let options = Self::match_options();
        // `**/target/**` should also exclude a top-level `target/`
        let rooted = Path::new(".").join(relative);
        self.excludes.iter().any(|p| {
            p.matches_path_with(relative, options) || p.matches_path_with(&rooted, options)
        })
    }

    fn is_pruned(entry: &DirEntry) -> bool {
        entry.depth() > 0
            && entry.file_type().is_dir()
            && entry
                .file_name()
                .to_str()
                .map(|name| PRUNED_DIRS.contains(&name))
                .unwrap_or(false)
    }

    /// Collect repository-relative file paths, sorted
    ///
    /// Symlinks are not followed. Unreadable directory entries are skipped.
    pub fn collect(&self, root: &Path) -> Result<Vec<PathBuf>> {
        if !root.is_dir() {
            return Err(Error::PathNotFound(root.to_path_buf()));
        }

        let mut files = Vec::new();
        let walker = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| !Self::is_pruned(e));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = match entry.path().strip_prefix(root) {
                Ok(relative) => relative.to_path_buf(),
                Err(_) => continue,
            };
            if self.is_excluded(&relative) {
                continue;
            }
            files.push(relative);
        }

        files.sort();
        debug!("Collected {} files under {}", files.len(), root.display());
        Ok(files)
    }
}
