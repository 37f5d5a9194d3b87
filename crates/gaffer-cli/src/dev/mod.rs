//! Development server for `gaffer watch`.
//!
//! Provides:
//! - the frontend output served over HTTP
//! - reload events via Server-Sent Events
//! - a status document
//! - the HMR listener that backend servers connect to

pub mod hmr;
pub mod server;
pub mod state;

pub use hmr::HmrListener;
pub use server::DevServer;
pub use state::{BuildStatus, DevServerState, SharedState, StatusDocument};

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::error::{CliError, Result};

/// Events in the dev server lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DevEvent {
    /// A watched target finished a pass without errors
    BuildCompleted {
        target: String,
        hash: String,
        duration_ms: u64,
    },

    /// A watched target finished a pass with errors
    BuildFailed { target: String, errors: Vec<String> },

    /// A hash arrived on the HMR listener
    HashUpdated { hash: String },

    /// Client connected
    ClientConnected { id: usize },
}

/// A bound listener served by a background task.
pub struct ServiceHandle {
    addr: SocketAddr,
    task: Option<JoinHandle<Result<()>>>,
}

impl ServiceHandle {
    pub(crate) fn new(addr: SocketAddr, task: JoinHandle<Result<()>>) -> Self {
        Self { addr, task: Some(task) }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Wait for the service to stop on its own, which only happens on error.
    ///
    /// Returns immediately once the service has been waited for.
    pub async fn stopped(&mut self) -> Result<()> {
        let Some(task) = self.task.as_mut() else {
            return Ok(());
        };
        let joined = task.await;
        self.task = None;
        match joined {
            Ok(result) => result,
            Err(err) if err.is_cancelled() => Ok(()),
            Err(err) => Err(CliError::from(err)),
        }
    }

    pub async fn stop(mut self) {
        if let Some(task) = self.task.as_ref() {
            task.abort();
        }
        if let Err(err) = self.stopped().await {
            tracing::debug!(addr = %self.addr, error = %err, "service stopped with error");
        }
    }
}
