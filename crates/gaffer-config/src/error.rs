//! Error types for configuration loading and target resolution.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("invalid TOML in {}: {message}", path.display())]
    InvalidToml { path: PathBuf, message: String },

    #[error("target '{target}': missing required field '{field}'")]
    MissingField { target: String, field: String },

    #[error("target '{target}': invalid value for '{field}': {hint}")]
    InvalidValue {
        target: String,
        field: String,
        hint: String,
    },

    #[error("target '{target}': invalid pattern '{pattern}': {message}")]
    InvalidPattern {
        target: String,
        pattern: String,
        message: String,
    },

    #[error("unknown target '{0}'")]
    UnknownTarget(String),

    #[error("target '{target}' extends '{parent}', which is not defined")]
    UnknownParent { target: String, parent: String },

    #[error("target '{0}' has a cyclic extends chain")]
    CyclicExtends(String),

    #[error("invalid settings: {0}")]
    Settings(String),

    #[error("unknown mode '{0}' (expected 'development' or 'production')")]
    UnknownMode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Settings(err.to_string())
    }
}
