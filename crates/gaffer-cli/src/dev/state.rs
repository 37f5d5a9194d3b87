//! Shared state for the development server.
//!
//! Build status per target, the last hash seen and the SSE client registry,
//! behind `parking_lot` locks so build callbacks can update it without
//! awaiting.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use gaffer_bundler::BuildStats;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::dev::DevEvent;

/// Build status tracking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BuildStatus {
    /// No build has been performed yet
    NotStarted,
    Success { hash: String, duration_ms: u64 },
    Failed { errors: usize, message: String },
}

impl BuildStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, BuildStatus::Success { .. })
    }

    /// First error message if the last pass failed.
    pub fn error(&self) -> Option<&str> {
        match self {
            BuildStatus::Failed { message, .. } => Some(message),
            _ => None,
        }
    }
}

/// Client connection tracker for Server-Sent Events.
pub type ClientRegistry = Arc<RwLock<HashMap<usize, mpsc::Sender<String>>>>;

/// What `/__gaffer/status` returns.
#[derive(Debug, Clone, Serialize)]
pub struct StatusDocument {
    pub targets: IndexMap<String, BuildStatus>,
    pub last_hash: Option<String>,
    pub clients: usize,
}

pub struct DevServerState {
    status: RwLock<IndexMap<String, BuildStatus>>,
    last_hash: RwLock<Option<String>>,
    clients: ClientRegistry,
    next_client_id: RwLock<usize>,
    out_dir: PathBuf,
}

impl DevServerState {
    /// State for a server over `out_dir`, with every target `NotStarted`.
    pub fn new<'a>(out_dir: PathBuf, targets: impl IntoIterator<Item = &'a str>) -> Self {
        let status = targets
            .into_iter()
            .map(|name| (name.to_string(), BuildStatus::NotStarted))
            .collect();
        Self {
            status: RwLock::new(status),
            last_hash: RwLock::new(None),
            clients: Arc::new(RwLock::new(HashMap::new())),
            next_client_id: RwLock::new(0),
            out_dir,
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    pub fn status(&self, target: &str) -> Option<BuildStatus> {
        self.status.read().get(target).cloned()
    }

    pub fn last_hash(&self) -> Option<String> {
        self.last_hash.read().clone()
    }

    /// Record a finished pass and tell the clients about it.
    pub fn record_build(&self, stats: &BuildStats) -> DevEvent {
        let (status, event) = if stats.is_success() {
            (
                BuildStatus::Success {
                    hash: stats.hash.clone(),
                    duration_ms: stats.timing_ms,
                },
                DevEvent::BuildCompleted {
                    target: stats.target_name.clone(),
                    hash: stats.hash.clone(),
                    duration_ms: stats.timing_ms,
                },
            )
        } else {
            let errors: Vec<String> = stats.errors.iter().map(|error| error.message.clone()).collect();
            (
                BuildStatus::Failed {
                    errors: errors.len(),
                    message: errors.first().cloned().unwrap_or_default(),
                },
                DevEvent::BuildFailed {
                    target: stats.target_name.clone(),
                    errors,
                },
            )
        };

        self.status.write().insert(stats.target_name.clone(), status);
        self.broadcast(&event);
        event
    }

    /// Record a hash received over HMR and tell the clients about it.
    pub fn record_hash(&self, hash: &str) -> DevEvent {
        *self.last_hash.write() = Some(hash.to_string());
        let event = DevEvent::HashUpdated {
            hash: hash.to_string(),
        };
        self.broadcast(&event);
        event
    }

    /// Register a new SSE client.
    pub fn register_client(&self) -> (usize, mpsc::Receiver<String>) {
        let id = {
            let mut next_id = self.next_client_id.write();
            let id = *next_id;
            *next_id += 1;
            id
        };

        let (tx, rx) = mpsc::channel(100);
        self.clients.write().insert(id, tx);

        (id, rx)
    }

    pub fn unregister_client(&self, id: usize) {
        self.clients.write().remove(&id);
    }

    /// Send `event` to every client. Returns how many received it.
    ///
    /// Clients whose stream is gone are dropped; a client that is too slow
    /// misses the event.
    pub fn broadcast(&self, event: &DevEvent) -> usize {
        let json = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());

        let clients = self.clients.read().clone();
        let mut delivered = 0;
        let mut closed = Vec::new();

        for (id, tx) in clients {
            match tx.try_send(json.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => tracing::debug!(client = id, "sse client lagging"),
                Err(TrySendError::Closed(_)) => closed.push(id),
            }
        }

        for id in closed {
            self.unregister_client(id);
        }
        delivered
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    pub fn snapshot(&self) -> StatusDocument {
        StatusDocument {
            targets: self.status.read().clone(),
            last_hash: self.last_hash(),
            clients: self.client_count(),
        }
    }
}

/// Shared state handle for passing around the application.
pub type SharedState = Arc<DevServerState>;

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> DevServerState {
        DevServerState::new(PathBuf::from("static/build"), ["frontend"])
    }

    #[test]
    fn build_lifecycle() {
        let state = state();
        assert_eq!(state.status("frontend"), Some(BuildStatus::NotStarted));

        let mut stats = BuildStats::from_failure("frontend", "Module not found: ./x", 12);
        state.record_build(&stats);
        assert_eq!(state.status("frontend").unwrap().error(), Some("Module not found: ./x"));

        stats.errors.clear();
        stats.hash = "abc".to_string();
        let event = state.record_build(&stats);
        assert!(state.status("frontend").unwrap().is_success());
        assert_eq!(
            event,
            DevEvent::BuildCompleted {
                target: "frontend".to_string(),
                hash: "abc".to_string(),
                duration_ms: 12,
            }
        );
    }

    #[test]
    fn broadcast_drops_closed_clients() {
        let state = state();
        let (_, mut open) = state.register_client();
        let (_, closed) = state.register_client();
        drop(closed);

        let delivered = state.broadcast(&DevEvent::HashUpdated { hash: "h".into() });
        assert_eq!(delivered, 1);
        assert_eq!(state.client_count(), 1);
        assert_eq!(open.try_recv().unwrap(), r#"{"type":"HashUpdated","hash":"h"}"#);
    }

    #[test]
    fn snapshot_reports_last_hash() {
        let state = state();
        state.record_hash("deadbeef");

        let doc = serde_json::to_value(state.snapshot()).unwrap();
        assert_eq!(doc["last_hash"], "deadbeef");
        assert_eq!(doc["targets"]["frontend"]["state"], "not_started");
        assert_eq!(doc["clients"], 0);
    }
}
