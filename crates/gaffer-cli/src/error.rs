//! Error handling for the gaffer CLI.
//!
//! `CliError` aggregates the failures of every component with `#[from]`
//! conversions; `main` turns it into a `miette` report through
//! [`cli_error_to_miette`].
//!
//! Compile errors are not part of this hierarchy. They travel as data inside
//! `BuildStats` and only become a [`CliError::BuildFailed`] when a one-shot
//! command has to exit non-zero.

mod report;

use std::path::PathBuf;

use thiserror::Error;

use crate::supervisor::SpawnError;

pub use report::cli_error_to_miette;

/// Top-level CLI error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration could not be loaded or resolved
    #[error("Configuration error: {0}")]
    Config(#[from] gaffer_config::ConfigError),

    /// The compiler could not run a pass at all
    #[error("Build error: {0}")]
    Compiler(#[from] gaffer_bundler::CompilerError),

    /// One or more targets finished with compile errors
    #[error("Build failed for {}", .targets.join(", "))]
    BuildFailed { targets: Vec<String> },

    /// The supervised server process could not be started
    #[error("Process error: {0}")]
    Spawn(#[from] SpawnError),

    /// File watching errors
    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),

    /// Invalid command-line arguments or options
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// File or directory not found
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// I/O errors from file system operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Development server errors
    #[error("Server error: {0}")]
    Server(String),

    /// A background task panicked or was cancelled
    #[error("Task error: {0}")]
    Task(String),

    /// Generic errors with custom messages
    #[error("{0}")]
    Custom(String),
}

pub type Result<T, E = CliError> = std::result::Result<T, E>;

/// Extension trait for adding context to `Result` types.
pub trait ResultExt<T> {
    /// Turn a not-found I/O error into [`CliError::FileNotFound`] for `path`.
    ///
    /// ```rust,no_run
    /// # use std::path::Path;
    /// # use gaffer_cli::error::{Result, ResultExt};
    /// # fn run() -> Result<()> {
    /// let path = Path::new("project");
    /// std::fs::canonicalize(path).with_path(path)?;
    /// # Ok(())
    /// # }
    /// ```
    fn with_path(self, path: impl AsRef<std::path::Path>) -> Result<T>;

    /// Prefix the error message.
    fn context(self, msg: impl std::fmt::Display) -> Result<T>;
}

impl<T, E: Into<CliError>> ResultExt<T> for std::result::Result<T, E> {
    fn with_path(self, path: impl AsRef<std::path::Path>) -> Result<T> {
        self.map_err(|e| match e.into() {
            CliError::Io(io_err) if io_err.kind() == std::io::ErrorKind::NotFound => {
                CliError::FileNotFound(path.as_ref().to_path_buf())
            }
            other => other,
        })
    }

    fn context(self, msg: impl std::fmt::Display) -> Result<T> {
        self.map_err(|e| {
            let err: CliError = e.into();
            CliError::Custom(format!("{}: {}", msg, err))
        })
    }
}

impl From<tokio::task::JoinError> for CliError {
    fn from(err: tokio::task::JoinError) -> Self {
        CliError::Task(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn with_path_maps_not_found() {
        let result: std::result::Result<(), io::Error> =
            Err(io::Error::new(io::ErrorKind::NotFound, "gone"));
        let err = result.with_path("/missing/project").unwrap_err();
        assert!(matches!(err, CliError::FileNotFound(p) if p == PathBuf::from("/missing/project")));
    }

    #[test]
    fn with_path_keeps_other_errors() {
        let result: std::result::Result<(), io::Error> =
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "nope"));
        assert!(matches!(result.with_path("/x").unwrap_err(), CliError::Io(_)));
    }

    #[test]
    fn context_prefixes_message() {
        let result: std::result::Result<(), CliError> = Err(CliError::Server("bind failed".into()));
        let err = result.context("dev server").unwrap_err();
        assert_eq!(err.to_string(), "dev server: Server error: bind failed");
    }

    #[test]
    fn build_failed_lists_targets() {
        let err = CliError::BuildFailed {
            targets: vec!["frontend".into(), "bin/seed".into()],
        };
        assert_eq!(err.to_string(), "Build failed for frontend, bin/seed");
    }

    #[test]
    fn config_errors_convert() {
        let err: CliError = gaffer_config::ConfigError::UnknownTarget("web".into()).into();
        assert_eq!(err.to_string(), "Configuration error: unknown target 'web'");
    }
}
