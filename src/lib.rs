//! Surveyor - Reverse-engineer architecture models from source repositories
//!
//! Detects the web framework a repository is built with, extracts endpoints,
//! models and services with framework-specific pattern rules, and infers
//! actors, system boundaries, relationships and use cases. The result is a
//! plain serializable [`AnalysisResult`] for any renderer to consume.

pub mod analysis;
pub mod config;
pub mod error;
pub mod model;
pub mod parser;
pub mod plugins;
pub mod process;

// Re-export main types
pub use analysis::{AnalysisResult, Analyzer, RunReport, Summary};
pub use config::Config;
pub use error::{Error, Result};
pub use model::*;
pub use plugins::{Discovered, FrameworkAnalyzer, PluginRegistry};
pub use process::{RelationshipMapper, UseCaseBuilder};
