// Framework analyzer plugins
//
// Every framework implements one discovery contract. A plugin mostly
// consists of a rule table; extraction, caching and post-processing are
// shared through the default methods.

pub mod django;
pub mod express;
pub mod fastapi;
pub mod flask;
pub mod generic;
pub mod merge;
pub mod python;
pub mod rails;
pub mod routing;
pub mod spring;

use crate::analysis::{AnalysisContext, FrameworkSignature, Operation};
use crate::error::Result;
use crate::model::{Actor, Endpoint, Model, Service, SystemBoundary, UseCase};
use crate::parser::RuleSet;
use crate::process::{actors, boundaries, UseCaseBuilder};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Id of the cross-framework fallback plugin
pub const GENERIC_ID: &str = "generic";

/// Working state shared by the discovery operations of one run
#[derive(Debug, Clone, Default)]
pub struct Discovered {
    pub endpoints: Vec<Endpoint>,
    pub models: Vec<Model>,
    pub services: Vec<Service>,
    pub actors: Option<Vec<Actor>>,
    pub boundaries: Option<Vec<SystemBoundary>>,
}

impl Discovered {
    /// Whether every discovery operation use cases depend on has run
    pub fn is_complete(&self) -> bool {
        self.actors.is_some() && self.boundaries.is_some()
    }

    pub fn actors(&self) -> &[Actor] {
        self.actors.as_deref().unwrap_or(&[])
    }

    pub fn boundaries(&self) -> &[SystemBoundary] {
        self.boundaries.as_deref().unwrap_or(&[])
    }
}

/// Discovery contract shared by all framework plugins
///
/// Discovery operations never fail: unreadable files are recorded in the
/// context's report and contribute nothing.
pub trait FrameworkAnalyzer: Send + Sync {
    /// Framework id the plugin registers under
    fn id(&self) -> &'static str;

    fn language(&self) -> &'static str;

    /// Source file extensions the plugin reads
    fn extensions(&self) -> &'static [&'static str];

    /// Compiled rule table
    fn rules(&self) -> &RuleSet;

    /// Detection signature; `None` for plugins that are only used as fallback
    fn signature(&self) -> Option<FrameworkSignature> {
        None
    }

    fn handles(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| self.extensions().contains(&ext))
            .unwrap_or(false)
    }

    /// Candidate files for a module reference made in `from`, best first
    fn module_candidates(&self, _from: &Path, _module: &str, _binding: Option<&str>) -> Vec<PathBuf> {
        Vec::new()
    }

    fn discover_endpoints(&self, ctx: &AnalysisContext<'_>) -> Vec<Endpoint> {
        let scans = ctx.extract(self, Operation::Endpoints);
        routing::finish_endpoints(self, ctx, &scans)
    }

    fn discover_models(&self, ctx: &AnalysisContext<'_>) -> Vec<Model> {
        merge::merge_models(ctx.extract(self, Operation::Models).iter().map(|(_, s)| s))
    }

    fn discover_services(&self, ctx: &AnalysisContext<'_>) -> Vec<Service> {
        merge::merge_services(ctx.extract(self, Operation::Services).iter().map(|(_, s)| s))
    }

    fn discover_actors(&self, ctx: &AnalysisContext<'_>, state: &Discovered) -> Vec<Actor> {
        actors::discover_actors(state, &ctx.signals(self))
    }

    fn discover_boundaries(&self, ctx: &AnalysisContext<'_>, state: &Discovered) -> Vec<SystemBoundary> {
        boundaries::discover_boundaries(state, &ctx.signals(self))
    }

    /// Synthesize use cases; requires the other five operations to have run
    fn extract_use_cases(&self, ctx: &AnalysisContext<'_>, state: &Discovered) -> Vec<UseCase> {
        if !state.is_complete() {
            ctx.warn(format!(
                "{}: use cases requested before actors and boundaries were discovered",
                self.id()
            ));
            return Vec::new();
        }
        UseCaseBuilder::new().build(state)
    }
}

/// Framework id to plugin mapping
pub struct PluginRegistry {
    plugins: Vec<Arc<dyn FrameworkAnalyzer>>,
    fallback: Arc<dyn FrameworkAnalyzer>,
}

impl PluginRegistry {
    /// Registry with only the generic fallback
    pub fn new() -> Result<Self> {
        Ok(Self {
            plugins: Vec::new(),
            fallback: Arc::new(generic::GenericAnalyzer::new()?),
        })
    }

    /// Registry with every built-in plugin
    pub fn with_defaults() -> Result<Self> {
        let mut registry = Self::new()?;
        registry.register(Arc::new(spring::SpringAnalyzer::new()?));
        registry.register(Arc::new(express::ExpressAnalyzer::new()?));
        registry.register(Arc::new(django::DjangoAnalyzer::new()?));
        registry.register(Arc::new(fastapi::FastApiAnalyzer::new()?));
        registry.register(Arc::new(flask::FlaskAnalyzer::new()?));
        registry.register(Arc::new(rails::RailsAnalyzer::new()?));
        Ok(registry)
    }

    /// Register a plugin, replacing any plugin with the same id
    pub fn register(&mut self, plugin: Arc<dyn FrameworkAnalyzer>) {
        if plugin.id() == GENERIC_ID {
            self.fallback = plugin;
            return;
        }
        match self.plugins.iter_mut().find(|p| p.id() == plugin.id()) {
            Some(existing) => *existing = plugin,
            None => self.plugins.push(plugin),
        }
    }

    /// Plugin for a framework id; unknown ids get the generic plugin
    pub fn resolve(&self, id: &str) -> Arc<dyn FrameworkAnalyzer> {
        self.plugins
            .iter()
            .find(|p| p.id() == id)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }

    /// Detection signatures in registration order
    pub fn signatures(&self) -> Vec<FrameworkSignature> {
        self.plugins.iter().filter_map(|p| p.signature()).collect()
    }

    /// Registered framework ids
    pub fn ids(&self) -> Vec<&'static str> {
        self.plugins.iter().map(|p| p.id()).collect()
    }
}

/// Join a relative module path onto a directory, folding `.` and `..`
pub(crate) fn lexical_join(dir: &Path, relative: &str) -> PathBuf {
    let mut parts: Vec<String> = dir
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str().map(str::to_string),
            _ => None,
        })
        .collect();
    for segment in relative.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other.to_string()),
        }
    }
    parts.iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_resolves_and_falls_back() {
        let registry = PluginRegistry::with_defaults().unwrap();
        assert_eq!(registry.resolve("spring").id(), "spring");
        assert_eq!(registry.resolve("django").language(), "python");
        assert_eq!(registry.resolve("phoenix").id(), GENERIC_ID);
        assert_eq!(registry.resolve(GENERIC_ID).id(), GENERIC_ID);
        assert_eq!(
            registry.ids(),
            vec!["spring", "express", "django", "fastapi", "flask", "rails"]
        );
    }

    #[test]
    fn test_signatures_follow_registration() {
        let registry = PluginRegistry::with_defaults().unwrap();
        let ids: Vec<&str> = registry.signatures().iter().map(|s| s.id).collect();
        assert_eq!(ids, registry.ids());
    }

    #[test]
    fn test_register_replaces_same_id() {
        let mut registry = PluginRegistry::with_defaults().unwrap();
        registry.register(Arc::new(flask::FlaskAnalyzer::new().unwrap()));
        assert_eq!(registry.ids().len(), 6);
    }

    #[test]
    fn test_handles_by_extension() {
        let spring = spring::SpringAnalyzer::new().unwrap();
        assert!(spring.handles(Path::new("src/main/java/App.java")));
        assert!(spring.handles(Path::new("src/main/kotlin/App.kt")));
        assert!(!spring.handles(Path::new("pom.xml")));
    }

    #[test]
    fn test_lexical_join() {
        assert_eq!(lexical_join(Path::new("src"), "./routes/users"), PathBuf::from("src/routes/users"));
        assert_eq!(lexical_join(Path::new("src/routes"), "../app"), PathBuf::from("src/app"));
        assert_eq!(lexical_join(Path::new(""), "a"), PathBuf::from("a"));
    }
}
