//! The compiler seam.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use gaffer_config::BuildTarget;
use thiserror::Error;

use crate::stats::BuildStats;

/// Compiles one target per call.
///
/// Compile errors in the sources are reported inside the returned
/// [`BuildStats`]; `Err` is reserved for structural failures where no build
/// pass could run at all.
#[async_trait]
pub trait Compiler: Send + Sync {
    async fn compile(&self, target: Arc<BuildTarget>) -> Result<BuildStats, CompilerError>;
}

/// A structural compiler failure.
#[derive(Debug, Error)]
pub enum CompilerError {
    #[error("entry module not found: {}", .0.display())]
    EntryNotFound(PathBuf),

    #[error("target '{target}' is invalid: {reason}")]
    InvalidTarget { target: String, reason: String },

    #[error("cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("compiler task failed: {0}")]
    Task(String),
}
