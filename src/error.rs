use std::path::PathBuf;
use thiserror::Error;

/// Surveyor error types
///
/// These cover construction-time failures only. Problems with individual
/// source files are reported as [`FileError`](crate::analysis::FileError)
/// values inside the analysis result instead.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config validation error: {0}")]
    ConfigValidation(String),

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Glob pattern error: {0}")]
    GlobPattern(#[from] glob::PatternError),

    #[error("Invalid {role} rule `{pattern}`: {source}")]
    Rule {
        role: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Cache error: {0}")]
    Cache(String),
}

/// Result type alias for Surveyor operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a config validation error
    pub fn config_validation(msg: impl Into<String>) -> Self {
        Error::ConfigValidation(msg.into())
    }

    /// Create a rule compilation error
    pub fn rule(role: impl Into<String>, pattern: impl Into<String>, source: regex::Error) -> Self {
        Error::Rule {
            role: role.into(),
            pattern: pattern.into(),
            source,
        }
    }

    /// Create a cache error
    pub fn cache(msg: impl Into<String>) -> Self {
        Error::Cache(msg.into())
    }
}
