// Analysis pipeline: collection, detection, extraction and inference

pub mod cache;
pub mod collector;
pub mod context;
pub mod detector;
pub mod modules;
pub mod parallel;

pub use cache::{
    fingerprint, CacheEntry, CacheKey, CacheStats, DiskCache, MemoryCache, NullCache, Operation,
    ResultCache,
};
pub use collector::{is_test_path, FileCollector};
pub use context::{AnalysisContext, Extracted};
pub use detector::{Candidate, Detection, FrameworkDetector, FrameworkSignature};
pub use parallel::{BatchOutcome, FileError, FileErrorKind, ParallelProcessor, Progress, ProgressHook};

use crate::config::Config;
use crate::error::Result;
use crate::model::{
    Actor, Endpoint, Model, Relationship, Service, SystemBoundary, TechStack, UseCase,
};
use crate::plugins::{Discovered, FrameworkAnalyzer, PluginRegistry};
use crate::process::RelationshipMapper;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Problems observed during a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Low-confidence detection, unusable cache, aborted batches
    pub warnings: Vec<String>,
    /// Files that could not be analyzed, one entry per file, ordered by path
    pub errors: Vec<FileError>,
    /// The error ceiling was hit and the result is partial
    pub aborted: bool,
    /// Cache activity of this run
    pub cache: CacheStats,
}

impl RunReport {
    /// Add per-file errors, keeping the first error seen for each file
    pub fn record_errors(&mut self, errors: Vec<FileError>) {
        for error in errors {
            if !self.errors.iter().any(|e| e.path == error.path) {
                self.errors.push(error);
            }
        }
        self.errors.sort_by(|a, b| a.path.cmp(&b.path));
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty() && self.errors.is_empty() && !self.aborted
    }
}

/// Entity counts, computed once when the result is assembled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub files: usize,
    pub endpoints: usize,
    pub models: usize,
    pub services: usize,
    pub actors: usize,
    pub boundaries: usize,
    pub relationships: usize,
    pub use_cases: usize,
    pub errors: usize,
    pub warnings: usize,
}

/// Structured architecture model of a repository
///
/// Plain data only; renderers consume it without any analysis code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub root: PathBuf,
    pub tech_stack: TechStack,
    pub endpoints: Vec<Endpoint>,
    pub models: Vec<Model>,
    pub services: Vec<Service>,
    pub actors: Vec<Actor>,
    pub boundaries: Vec<SystemBoundary>,
    pub relationships: Vec<Relationship>,
    pub use_cases: Vec<UseCase>,
    pub summary: Summary,
    pub report: RunReport,
}

impl AnalysisResult {
    fn assemble(
        root: PathBuf,
        tech_stack: TechStack,
        files: usize,
        discovered: Discovered,
        relationships: Vec<Relationship>,
        use_cases: Vec<UseCase>,
        report: RunReport,
    ) -> Self {
        let actors = discovered.actors.unwrap_or_default();
        let boundaries = discovered.boundaries.unwrap_or_default();
        let summary = Summary {
            files,
            endpoints: discovered.endpoints.len(),
            models: discovered.models.len(),
            services: discovered.services.len(),
            actors: actors.len(),
            boundaries: boundaries.len(),
            relationships: relationships.len(),
            use_cases: use_cases.len(),
            errors: report.errors.len(),
            warnings: report.warnings.len(),
        };

        Self {
            root,
            tech_stack,
            endpoints: discovered.endpoints,
            models: discovered.models,
            services: discovered.services,
            actors,
            boundaries,
            relationships,
            use_cases,
            summary,
            report,
        }
    }

    /// Result for a run that could not get as far as extraction
    fn empty(root: PathBuf, tech_stack: TechStack, report: RunReport) -> Self {
        Self::assemble(
            root,
            tech_stack,
            0,
            Discovered::default(),
            Vec::new(),
            Vec::new(),
            report,
        )
    }
}

/// Main analyzer that orchestrates the analysis pipeline
pub struct Analyzer {
    config: Config,
    registry: PluginRegistry,
    detector: FrameworkDetector,
    collector: FileCollector,
    cache: Option<Arc<dyn ResultCache>>,
    progress: Option<ProgressHook>,
    verbose: bool,
}

impl Analyzer {
    /// Create a new analyzer with the given configuration
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let registry = PluginRegistry::with_defaults()?;
        let detector =
            FrameworkDetector::new(registry.signatures(), config.detection.min_confidence)?;
        let collector = FileCollector::new(&config.analysis.exclude)?;

        Ok(Self {
            config,
            registry,
            detector,
            collector,
            cache: None,
            progress: None,
            verbose: false,
        })
    }

    /// Show a terminal progress bar while extracting
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Observe completed/total file counts
    pub fn with_progress(mut self, hook: ProgressHook) -> Self {
        self.progress = Some(hook);
        self
    }

    /// Use a specific cache instead of the configured one
    pub fn with_cache(mut self, cache: Arc<dyn ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Replace the plugin registry; detection follows the new signatures
    pub fn with_registry(mut self, registry: PluginRegistry) -> Result<Self> {
        self.detector = FrameworkDetector::new(
            registry.signatures(),
            self.config.detection.min_confidence,
        )?;
        self.registry = registry;
        Ok(self)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Analyze a repository
    ///
    /// Never fails: problems end up in the result's report, and an aborted
    /// run returns whatever was extracted before the abort.
    pub fn analyze(&self, root: &Path) -> AnalysisResult {
        let mut report = RunReport::default();

        let root = match root.canonicalize() {
            Ok(root) => root,
            Err(e) => {
                report
                    .warnings
                    .push(format!("Cannot access {}: {}", root.display(), e));
                return AnalysisResult::empty(root.to_path_buf(), TechStack::generic(0.0), report);
            }
        };

        // Step 1: Collect files
        let files = match self.collector.collect(&root) {
            Ok(files) => files,
            Err(e) => {
                report.warnings.push(format!("Cannot walk {}: {}", root.display(), e));
                return AnalysisResult::empty(root, TechStack::generic(0.0), report);
            }
        };
        info!("Collected {} files", files.len());

        // Step 2: Detect the framework and pick a plugin
        let (tech_stack, plugin) = self.select_plugin(&root, &mut report);
        info!(
            "Using {} analyzer (confidence {:.2})",
            plugin.id(),
            tech_stack.confidence
        );

        // Step 3: Extract through the worker pool and the cache
        let cache = self.open_cache(&root, &mut report);
        let before = cache.stats();
        let bar = self.progress_bar();
        let mut processor = ParallelProcessor::new(&self.config.parallel);
        if let Some(hook) = self.progress_hook(bar.clone()) {
            processor = processor.with_progress(hook);
        }

        let file_count = files.len();
        let ctx = AnalysisContext::new(
            root.clone(),
            files,
            cache.clone(),
            &processor,
            self.config.parallel.max_file_bytes,
        );
        for warning in report.warnings.drain(..) {
            ctx.warn(warning);
        }

        let discovered = discover(plugin.as_ref(), &ctx);

        // Step 4: Relationships and use cases
        let signals = ctx.signals(plugin.as_ref());
        let relationships = RelationshipMapper::new().map(&discovered, &signals);
        info!("Mapped {} relationships", relationships.len());
        let use_cases = plugin.extract_use_cases(&ctx, &discovered);
        info!("Built {} use cases", use_cases.len());

        if let Some(bar) = bar {
            bar.finish_and_clear();
        }
        if let Some(max_entries) = self.config.cache.max_entries {
            cache.prune(max_entries);
        }

        let mut report = ctx.into_report();
        report.cache = cache.stats().since(&before);
        if report.aborted {
            warn!(
                "Analysis aborted after {} file errors; result is partial",
                report.errors.len()
            );
        }

        AnalysisResult::assemble(
            root,
            tech_stack,
            file_count,
            discovered,
            relationships,
            use_cases,
            report,
        )
    }

    fn select_plugin(
        &self,
        root: &Path,
        report: &mut RunReport,
    ) -> (TechStack, Arc<dyn FrameworkAnalyzer>) {
        if let Some(forced) = &self.config.analysis.framework {
            let plugin = self.registry.resolve(forced);
            if plugin.id() != forced.as_str() {
                report.warnings.push(format!(
                    "No analyzer registered for framework '{}'; using {}",
                    forced,
                    plugin.id()
                ));
            }
            let stack = TechStack {
                framework_id: plugin.id().to_string(),
                language: plugin.language().to_string(),
                version: None,
                confidence: 1.0,
            };
            return (stack, plugin);
        }

        let detection = self.detector.assess(root);
        report.warnings.extend(detection.warnings);
        let plugin = self.registry.resolve(&detection.stack.framework_id);
        (detection.stack, plugin)
    }

    fn open_cache(&self, root: &Path, report: &mut RunReport) -> Arc<dyn ResultCache> {
        if let Some(cache) = &self.cache {
            return cache.clone();
        }
        if !self.config.cache.enabled {
            return Arc::new(NullCache);
        }

        let directory = self.config.cache.directory_for(root);
        match DiskCache::open(&directory) {
            Ok(cache) => Arc::new(cache),
            Err(e) => {
                report
                    .warnings
                    .push(format!("Cache disabled for this run: {}", e));
                Arc::new(NullCache)
            }
        }
    }

    fn progress_bar(&self) -> Option<ProgressBar> {
        if !self.verbose {
            return None;
        }
        let pb = ProgressBar::new(0);
        if let Ok(style) =
            ProgressStyle::default_bar().template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        Some(pb)
    }

    fn progress_hook(&self, bar: Option<ProgressBar>) -> Option<ProgressHook> {
        let user = self.progress.clone();
        if bar.is_none() && user.is_none() {
            return None;
        }
        Some(Arc::new(move |progress: Progress| {
            if let Some(bar) = &bar {
                bar.set_length(progress.total as u64);
                bar.set_position(progress.completed as u64);
            }
            if let Some(user) = &user {
                user(progress);
            }
        }))
    }
}

/// Run the five discovery operations in dependency order
fn discover(plugin: &dyn FrameworkAnalyzer, ctx: &AnalysisContext<'_>) -> Discovered {
    let mut discovered = Discovered {
        endpoints: plugin.discover_endpoints(ctx),
        ..Discovered::default()
    };
    info!("Discovered {} endpoints", discovered.endpoints.len());

    discovered.models = plugin.discover_models(ctx);
    info!("Discovered {} models", discovered.models.len());

    discovered.services = plugin.discover_services(ctx);
    info!("Discovered {} services", discovered.services.len());

    let actors = plugin.discover_actors(ctx, &discovered);
    info!("Discovered {} actors", actors.len());
    discovered.actors = Some(actors);

    let boundaries = plugin.discover_boundaries(ctx, &discovered);
    info!("Discovered {} boundaries", boundaries.len());
    discovered.boundaries = Some(boundaries);

    discovered
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_record_errors_dedupes_by_path() {
        let mut report = RunReport::default();
        report.record_errors(vec![
            FileError::new("b.py", FileErrorKind::Binary, "nul"),
            FileError::new("a.py", FileErrorKind::Empty, "empty"),
        ]);
        report.record_errors(vec![FileError::new("b.py", FileErrorKind::Malformed, "again")]);

        assert_eq!(report.errors.len(), 2);
        assert_eq!(report.errors[0].path, PathBuf::from("a.py"));
        assert_eq!(report.errors[1].kind, FileErrorKind::Binary);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_missing_root_still_returns_result() {
        let analyzer = Analyzer::new(Config::default()).unwrap();
        let result = analyzer.analyze(Path::new("/nonexistent/surveyor/repo"));
        assert!(result.endpoints.is_empty());
        assert_eq!(result.tech_stack.framework_id, crate::plugins::GENERIC_ID);
        assert_eq!(result.report.warnings.len(), 1);
        assert_eq!(result.summary, Summary { warnings: 1, ..Summary::default() });
    }

    #[test]
    fn test_unknown_forced_framework_falls_back() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("main.go"), "package main\n").unwrap();
        let mut config = Config::default().with_framework("gin");
        config.cache.enabled = false;

        let result = Analyzer::new(config).unwrap().analyze(dir.path());
        assert_eq!(result.tech_stack.framework_id, crate::plugins::GENERIC_ID);
        assert!(result.report.warnings[0].contains("gin"));
    }

    #[test]
    fn test_progress_hook_sees_every_file() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let dir = TempDir::new().unwrap();
        for name in ["a.py", "b.py", "c.py"] {
            fs::write(dir.path().join(name), "x = 1\n").unwrap();
        }
        let mut config = Config::default().with_parallel(false).with_framework("flask");
        config.cache.enabled = false;

        let seen = Arc::new(AtomicUsize::new(0));
        let sink = seen.clone();
        let analyzer = Analyzer::new(config).unwrap().with_progress(Arc::new(move |p: Progress| {
            assert!(p.completed <= p.total);
            sink.fetch_add(1, Ordering::SeqCst);
        }));
        let result = analyzer.analyze(dir.path());

        assert_eq!(result.summary.files, 3);
        // One batch per extraction operation that ran
        assert!(seen.load(Ordering::SeqCst) >= 3);
        assert_eq!(seen.load(Ordering::SeqCst) % 3, 0);
    }

    #[test]
    fn test_cache_directory_is_created_under_root() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("app.py"), "x = 1\n").unwrap();
        let analyzer = Analyzer::new(Config::default().with_framework("flask")).unwrap();
        let result = analyzer.analyze(dir.path());

        assert!(dir.path().join(crate::config::DEFAULT_CACHE_DIR).is_dir());
        assert!(result.report.cache.writes > 0);
    }
}
