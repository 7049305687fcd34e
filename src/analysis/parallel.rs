// Parallel file processing
//
// Applies a per-file extraction function across a file list on a bounded
// rayon pool. Small batches run inline. Failures are collected per file and
// the batch stops taking new work once the failure ceiling is exceeded.

use crate::config::ParallelConfig;
use once_cell::sync::OnceCell;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Why a file could not be analyzed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileErrorKind {
    Io,
    Empty,
    Binary,
    Encoding,
    Malformed,
    TooLarge,
    Panicked,
}

/// A per-file extraction failure
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{}: {kind:?}: {message}", .path.display())]
pub struct FileError {
    pub path: PathBuf,
    pub kind: FileErrorKind,
    pub message: String,
}

impl FileError {
    pub fn new(path: impl Into<PathBuf>, kind: FileErrorKind, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind,
            message: message.into(),
        }
    }

    /// Whether the failure counts toward the batch error ceiling
    ///
    /// Empty files are recorded but never abort a batch.
    pub fn counts_toward_limit(&self) -> bool {
        self.kind != FileErrorKind::Empty
    }
}

/// Completed/total counts reported after each file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

/// Observer called from worker threads
pub type ProgressHook = Arc<dyn Fn(Progress) + Send + Sync>;

/// Outcome of one batch
#[derive(Debug)]
pub struct BatchOutcome<T> {
    /// Successful results, ordered by path
    pub results: Vec<(PathBuf, T)>,
    /// Failures, ordered by path
    pub errors: Vec<FileError>,
    /// The failure ceiling was exceeded and remaining files were skipped
    pub aborted: bool,
    /// Number of files actually processed
    pub processed: usize,
}

impl<T> Default for BatchOutcome<T> {
    fn default() -> Self {
        Self {
            results: Vec::new(),
            errors: Vec::new(),
            aborted: false,
            processed: 0,
        }
    }
}

/// Bounded worker pool for per-file extraction
pub struct ParallelProcessor {
    enabled: bool,
    workers: usize,
    threshold: usize,
    max_errors: usize,
    pool: OnceCell<Option<ThreadPool>>,
    progress: Option<ProgressHook>,
}

impl ParallelProcessor {
    /// Create a processor from configuration
    pub fn new(config: &ParallelConfig) -> Self {
        Self {
            enabled: config.enabled,
            workers: config.effective_workers(),
            threshold: config.threshold,
            max_errors: config.max_errors,
            pool: OnceCell::new(),
            progress: None,
        }
    }

    /// Attach a progress observer
    pub fn with_progress(mut self, hook: ProgressHook) -> Self {
        self.progress = Some(hook);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Whether a batch of this size would use the pool
    pub fn is_parallel_for(&self, files: usize) -> bool {
        self.enabled && self.workers > 1 && files > self.threshold
    }

    fn pool(&self) -> Option<&ThreadPool> {
        self.pool
            .get_or_init(|| {
                ThreadPoolBuilder::new()
                    .num_threads(self.workers)
                    .thread_name(|i| format!("surveyor-worker-{}", i))
                    .build()
                    .map_err(|e| warn!("Worker pool unavailable, running sequentially: {}", e))
                    .ok()
            })
            .as_ref()
    }

    /// Apply `extract` to every file
    ///
    /// Per-file failures and panics are recorded and never abort the batch on
    /// their own. Once more than `max_errors` counted failures have been
    /// seen, no new files are started; files already running are drained.
    pub fn process<T, F>(&self, files: &[PathBuf], extract: F) -> BatchOutcome<T>
    where
        T: Send,
        F: Fn(&Path) -> Result<T, FileError> + Send + Sync,
    {
        let total = files.len();
        let completed = AtomicUsize::new(0);
        let failures = AtomicUsize::new(0);
        let abort = AtomicBool::new(false);

        let run_one = |path: &PathBuf| -> Option<(PathBuf, Result<T, FileError>)> {
            if abort.load(Ordering::SeqCst) {
                return None;
            }

            let result = catch_unwind(AssertUnwindSafe(|| extract(path))).unwrap_or_else(|_| {
                Err(FileError::new(
                    path.as_path(),
                    FileErrorKind::Panicked,
                    "extraction panicked",
                ))
            });

            if let Err(e) = &result {
                debug!("Skipping {}: {}", path.display(), e.message);
                if e.counts_toward_limit() {
                    let seen = failures.fetch_add(1, Ordering::SeqCst) + 1;
                    if seen > self.max_errors {
                        abort.store(true, Ordering::SeqCst);
                    }
                }
            }

            let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(hook) = &self.progress {
                hook(Progress {
                    completed: done,
                    total,
                });
            }
            Some((path.clone(), result))
        };

        let pool = if self.is_parallel_for(total) {
            self.pool()
        } else {
            None
        };

        let raw: Vec<(PathBuf, Result<T, FileError>)> = match pool {
            Some(pool) => {
                debug!("Processing {} files on {} workers", total, self.workers);
                pool.install(|| files.par_iter().filter_map(run_one).collect())
            }
            None => {
                let mut out = Vec::with_capacity(total);
                for path in files {
                    match run_one(path) {
                        Some(item) => out.push(item),
                        None => break,
                    }
                }
                out
            }
        };

        let mut outcome = BatchOutcome {
            processed: raw.len(),
            aborted: abort.load(Ordering::SeqCst),
            ..BatchOutcome::default()
        };
        for (path, result) in raw {
            match result {
                Ok(value) => outcome.results.push((path, value)),
                Err(e) => outcome.errors.push(e),
            }
        }
        outcome.results.sort_by(|a, b| a.0.cmp(&b.0));
        outcome.errors.sort_by(|a, b| a.path.cmp(&b.path));

        if outcome.aborted {
            warn!(
                "Batch aborted after {} failures (limit {}); {} of {} files processed",
                outcome.errors.len(),
                self.max_errors,
                outcome.processed,
                total
            );
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn files(n: usize) -> Vec<PathBuf> {
        (0..n).map(|i| PathBuf::from(format!("f{:03}.py", i))).collect()
    }

    fn config(enabled: bool, max_errors: usize) -> ParallelConfig {
        ParallelConfig {
            enabled,
            workers: Some(4),
            max_errors,
            ..ParallelConfig::default()
        }
    }

    #[test]
    fn test_activation_threshold() {
        let processor = ParallelProcessor::new(&config(true, 10));
        assert!(!processor.is_parallel_for(10));
        assert!(processor.is_parallel_for(11));

        let disabled = ParallelProcessor::new(&config(false, 10));
        assert!(!disabled.is_parallel_for(1000));
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let extract = |p: &Path| -> Result<String, FileError> {
            Ok(p.to_string_lossy().to_uppercase())
        };
        let input = files(50);

        let sequential = ParallelProcessor::new(&config(false, 10)).process(&input, extract);
        let parallel = ParallelProcessor::new(&config(true, 10)).process(&input, extract);

        assert_eq!(sequential.results, parallel.results);
        assert_eq!(parallel.processed, 50);
        assert!(!parallel.aborted);
    }

    #[test]
    fn test_failures_are_recorded_not_fatal() {
        let processor = ParallelProcessor::new(&config(true, 10));
        let outcome = processor.process(&files(30), |p: &Path| {
            if p.to_string_lossy().ends_with("5.py") {
                Err(FileError::new(p, FileErrorKind::Malformed, "bad"))
            } else {
                Ok(())
            }
        });
        assert_eq!(outcome.errors.len(), 3);
        assert_eq!(outcome.results.len(), 27);
        assert!(!outcome.aborted);
    }

    #[test]
    fn test_panics_become_errors() {
        let processor = ParallelProcessor::new(&config(false, 10));
        let outcome = processor.process(&files(3), |p: &Path| -> Result<(), FileError> {
            if p.ends_with("f001.py") {
                panic!("boom");
            }
            Ok(())
        });
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].kind, FileErrorKind::Panicked);
        assert_eq!(outcome.results.len(), 2);
    }

    #[test]
    fn test_error_ceiling_aborts_sequential_batch() {
        let processor = ParallelProcessor::new(&config(false, 10));
        let outcome = processor.process(&files(20), |p: &Path| -> Result<(), FileError> {
            Err(FileError::new(p, FileErrorKind::Binary, "nul"))
        });
        assert!(outcome.aborted);
        assert_eq!(outcome.errors.len(), 11);
        assert_eq!(outcome.processed, 11);
    }

    #[test]
    fn test_error_ceiling_aborts_parallel_batch() {
        let mut cfg = config(true, 10);
        cfg.threshold = 0;
        cfg.workers = Some(4);
        let processor = ParallelProcessor::new(&cfg);
        let input = files(900);
        // Every other file fails
        let outcome = processor.process(&input, |p: &Path| -> Result<usize, FileError> {
            let n: usize = p.to_string_lossy()[1..4].parse().unwrap_or(0);
            if n % 2 == 0 {
                Err(FileError::new(p, FileErrorKind::Malformed, "unclosed '('"))
            } else {
                Ok(n)
            }
        });

        assert!(outcome.aborted);
        assert!(outcome.errors.len() > 10);
        // At most one in-flight file per other worker finishes after the flag is set
        assert!(outcome.errors.len() <= 11 + 3);
        assert!(outcome.processed < input.len());
        assert!(!outcome.results.is_empty());
        assert_eq!(outcome.results.len() + outcome.errors.len(), outcome.processed);
    }

    #[test]
    fn test_empty_files_do_not_count_toward_ceiling() {
        let processor = ParallelProcessor::new(&config(false, 2));
        let outcome = processor.process(&files(6), |p: &Path| -> Result<(), FileError> {
            Err(FileError::new(p, FileErrorKind::Empty, "empty"))
        });
        assert!(!outcome.aborted);
        assert_eq!(outcome.errors.len(), 6);
    }

    #[test]
    fn test_progress_hook() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let processor = ParallelProcessor::new(&config(false, 10)).with_progress(Arc::new(
            move |p: Progress| {
                sink.lock().unwrap().push(p.completed);
            },
        ));
        processor.process(&files(4), |_: &Path| Ok::<_, FileError>(()));
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_file_error_display() {
        let err = FileError::new("a.py", FileErrorKind::Encoding, "invalid UTF-8");
        assert_eq!(err.to_string(), "a.py: Encoding: invalid UTF-8");
    }
}
