// Per-run analysis context
//
// Everything a plugin needs for one run is passed explicitly through this
// value: the repository root, the collected file set, the cache handle and
// the worker pool. There is no global analyzer state.

use super::cache::{fingerprint, CacheEntry, CacheKey, Operation, ResultCache};
use super::collector::is_test_path;
use super::parallel::{FileError, FileErrorKind, ParallelProcessor};
use super::RunReport;
use crate::parser::{decode, scan_file, FileScan, Signal};
use crate::plugins::FrameworkAnalyzer;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Per-file extraction output of one operation, ordered by path
pub type Extracted = Arc<Vec<(PathBuf, FileScan)>>;

/// Explicit state of one analysis run
pub struct AnalysisContext<'a> {
    root: PathBuf,
    files: Vec<PathBuf>,
    cache: Arc<dyn ResultCache>,
    processor: &'a ParallelProcessor,
    max_file_bytes: u64,
    report: Mutex<RunReport>,
    aborted: AtomicBool,
    memo: Mutex<HashMap<(String, Operation), Extracted>>,
}

impl<'a> AnalysisContext<'a> {
    /// Create a context over a collected, sorted file set
    pub fn new(
        root: impl Into<PathBuf>,
        files: Vec<PathBuf>,
        cache: Arc<dyn ResultCache>,
        processor: &'a ParallelProcessor,
        max_file_bytes: u64,
    ) -> Self {
        Self {
            root: root.into(),
            files,
            cache,
            processor,
            max_file_bytes,
            report: Mutex::new(RunReport::default()),
            aborted: AtomicBool::new(false),
            memo: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// All collected files, relative to the root
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Whether a relative path is part of the collected file set
    pub fn contains(&self, relative: &Path) -> bool {
        self.files
            .binary_search_by(|f| f.as_path().cmp(relative))
            .is_ok()
    }

    pub fn cache(&self) -> &Arc<dyn ResultCache> {
        &self.cache
    }

    /// Whether the run hit the error ceiling
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Files a plugin extracts from: its own extensions, never test files
    pub fn source_files<P: FrameworkAnalyzer + ?Sized>(&self, plugin: &P) -> Vec<PathBuf> {
        self.files
            .iter()
            .filter(|f| !is_test_path(f))
            .filter(|f| plugin.handles(f))
            .cloned()
            .collect()
    }

    /// Record a run-level warning
    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.report.lock().warnings.push(message);
    }

    /// Run one extraction operation over the plugin's source files
    ///
    /// Results are memoized per (plugin, operation) for the rest of the run.
    /// After an abort every further operation yields nothing.
    pub fn extract<P: FrameworkAnalyzer + ?Sized>(&self, plugin: &P, operation: Operation) -> Extracted {
        let memo_key = (plugin.id().to_string(), operation);
        if let Some(done) = self.memo.lock().get(&memo_key) {
            return done.clone();
        }
        if self.is_aborted() {
            return Arc::new(Vec::new());
        }

        let files = self.source_files(plugin);
        debug!(
            "Extracting {} from {} files with {}",
            operation.as_str(),
            files.len(),
            plugin.id()
        );
        let outcome = self
            .processor
            .process(&files, |relative| self.extract_file(plugin, operation, relative));

        {
            let mut report = self.report.lock();
            report.record_errors(outcome.errors);
            if outcome.aborted {
                report.aborted = true;
                report.warnings.push(format!(
                    "Stopped extracting {} after too many failures; {} of {} files processed",
                    operation.as_str(),
                    outcome.processed,
                    files.len()
                ));
            }
        }
        if outcome.aborted {
            self.aborted.store(true, Ordering::SeqCst);
        }

        let results: Extracted = Arc::new(outcome.results);
        self.memo.lock().insert(memo_key, results.clone());
        results
    }

    /// Non-routing signals of all source files, in file order
    pub fn signals<P: FrameworkAnalyzer + ?Sized>(&self, plugin: &P) -> Vec<Signal> {
        self.extract(plugin, Operation::Signals)
            .iter()
            .flat_map(|(_, scan)| scan.signals.iter().cloned())
            .collect()
    }

    /// Extract one file, going through the cache
    ///
    /// A miss scans the file once and stores every operation's projection,
    /// so later operations over the same content are hits.
    fn extract_file<P: FrameworkAnalyzer + ?Sized>(
        &self,
        plugin: &P,
        operation: Operation,
        relative: &Path,
    ) -> Result<FileScan, FileError> {
        let absolute = self.root.join(relative);
        let io_error = |e: std::io::Error| FileError::new(relative, FileErrorKind::Io, e.to_string());

        let size = fs::metadata(&absolute).map_err(io_error)?.len();
        if size > self.max_file_bytes {
            return Err(FileError::new(
                relative,
                FileErrorKind::TooLarge,
                format!("{} bytes exceeds the {} byte limit", size, self.max_file_bytes),
            ));
        }
        let bytes = fs::read(&absolute).map_err(io_error)?;

        let fp = fingerprint(relative, &bytes);
        match self.cache.get(&CacheKey::new(&fp, plugin.id(), operation)) {
            Some(CacheEntry::Extracted { scan }) => return Ok(scan),
            Some(CacheEntry::Failed { kind, message }) => {
                return Err(FileError::new(relative, kind, message))
            }
            None => {}
        }

        let outcome = decode(relative, &bytes, self.max_file_bytes)
            .map(|text| scan_file(plugin.rules(), relative, &text));

        for op in Operation::ALL {
            let entry = match &outcome {
                Ok(scan) => CacheEntry::Extracted {
                    scan: op.project(scan.clone()),
                },
                Err(e) => CacheEntry::Failed {
                    kind: e.kind,
                    message: e.message.clone(),
                },
            };
            self.cache.put(&CacheKey::new(&fp, plugin.id(), op), &entry);
        }

        outcome.map(|scan| operation.project(scan))
    }

    /// Consume the context, returning the accumulated report
    pub fn into_report(self) -> RunReport {
        self.report.into_inner()
    }
}
