use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Hard ceiling on the default worker count.
pub const MAX_DEFAULT_WORKERS: usize = 16;

/// Name of the cache directory created inside the analyzed repository.
pub const DEFAULT_CACHE_DIR: &str = ".surveyor-cache";

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub analysis: AnalysisConfig,
    pub parallel: ParallelConfig,
    pub cache: CacheConfig,
    pub detection: DetectionConfig,
}

/// Analysis settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Glob patterns (relative to the repository root) excluded from analysis
    pub exclude: Vec<String>,
    /// Force a framework id instead of running detection
    pub framework: Option<String>,
}

/// Worker pool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelConfig {
    /// Allow the worker pool at all
    pub enabled: bool,
    /// Explicit worker count; `None` uses the CPU count capped at 16
    pub workers: Option<usize>,
    /// Batches with this many files or fewer run sequentially
    pub threshold: usize,
    /// A batch aborts once its failure count exceeds this ceiling
    pub max_errors: usize,
    /// Files larger than this are skipped and recorded as failures
    pub max_file_bytes: u64,
}

/// Extraction cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Cache location; defaults to `.surveyor-cache` under the repository root
    pub directory: Option<PathBuf>,
    /// Upper bound on stored entries, least recently used entries are pruned first
    pub max_entries: Option<usize>,
}

/// Framework detection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Minimum weighted score for a framework to be selected
    pub min_confidence: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            exclude: vec![
                "**/target/**".to_string(),
                "**/build/**".to_string(),
                "**/dist/**".to_string(),
                "**/out/**".to_string(),
                "**/node_modules/**".to_string(),
                "**/vendor/**".to_string(),
                "**/venv/**".to_string(),
                "**/.venv/**".to_string(),
                "**/__pycache__/**".to_string(),
                "**/*.min.js".to_string(),
            ],
            framework: None,
        }
    }
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            workers: None,
            threshold: 10,
            max_errors: 10,
            max_file_bytes: 4 * 1024 * 1024,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: None,
            max_entries: Some(100_000),
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self { min_confidence: 0.5 }
    }
}

impl ParallelConfig {
    /// Worker count after applying the default and the hard cap
    pub fn effective_workers(&self) -> usize {
        match self.workers {
            Some(n) => n.max(1),
            None => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
                .min(MAX_DEFAULT_WORKERS),
        }
    }
}

impl CacheConfig {
    /// Directory the cache should live in for a given repository
    pub fn directory_for(&self, repo_root: &Path) -> PathBuf {
        self.directory
            .clone()
            .unwrap_or_else(|| repo_root.join(DEFAULT_CACHE_DIR))
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from file or return defaults
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Force a framework instead of detecting one
    pub fn with_framework(mut self, framework: impl Into<String>) -> Self {
        self.analysis.framework = Some(framework.into());
        self
    }

    /// Enable or disable the worker pool
    pub fn with_parallel(mut self, enabled: bool) -> Self {
        self.parallel.enabled = enabled;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.parallel.workers == Some(0) {
            return Err(Error::config_validation("workers must be at least 1"));
        }

        if self.parallel.max_file_bytes == 0 {
            return Err(Error::config_validation("max_file_bytes must be positive"));
        }

        if !(0.0..=1.0).contains(&self.detection.min_confidence) {
            return Err(Error::config_validation(
                "min_confidence must be between 0 and 1",
            ));
        }

        if self.cache.max_entries == Some(0) {
            return Err(Error::config_validation("cache max_entries must be at least 1"));
        }

        for pattern in &self.analysis.exclude {
            glob::Pattern::new(pattern)?;
        }

        Ok(())
    }
}
