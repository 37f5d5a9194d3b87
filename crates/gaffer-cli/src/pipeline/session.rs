//! The watch state machine of one target.
//!
//! `WatchSession` only records transitions; the async loop in
//! [`CompilerPipeline::watch`](super::CompilerPipeline::watch) drives it with
//! change events, timer expiries and build completions.
//!
//! ```text
//! Idle --change--> PendingChange --deadline--> Building --done--> Idle
//!                   ^    |change (re-arm)         |change (dirty)
//!                   |____|                        v
//!                   <--------------------done, dirty
//! ```

use std::sync::Arc;
use std::time::Duration;

use gaffer_bundler::BuildStats;
use gaffer_config::BuildTarget;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    /// A build starts at `deadline` unless another change re-arms it.
    PendingChange { deadline: Instant },
    /// `dirty` records changes that arrived during the build.
    Building { dirty: bool },
}

#[derive(Debug)]
pub struct WatchSession {
    target: Arc<BuildTarget>,
    debounce: Duration,
    state: SessionState,
    last_hash: Option<String>,
    builds: u64,
}

impl WatchSession {
    pub fn new(target: Arc<BuildTarget>, debounce: Duration) -> Self {
        Self {
            target,
            debounce,
            state: SessionState::Idle,
            last_hash: None,
            builds: 0,
        }
    }

    pub fn target(&self) -> &Arc<BuildTarget> {
        &self.target
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Hash of the last successful build.
    pub fn last_hash(&self) -> Option<&str> {
        self.last_hash.as_deref()
    }

    /// Completed builds, failed ones included.
    pub fn builds(&self) -> u64 {
        self.builds
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            SessionState::PendingChange { deadline } => Some(deadline),
            _ => None,
        }
    }

    pub fn is_building(&self) -> bool {
        matches!(self.state, SessionState::Building { .. })
    }

    /// A file changed. Never starts a build by itself.
    pub fn on_change(&mut self, now: Instant) {
        self.state = match self.state {
            SessionState::Idle | SessionState::PendingChange { .. } => SessionState::PendingChange {
                deadline: now + self.debounce,
            },
            SessionState::Building { .. } => SessionState::Building { dirty: true },
        };
    }

    /// The timer fired. Returns true when a build should start now.
    pub fn on_deadline(&mut self, now: Instant) -> bool {
        match self.state {
            SessionState::PendingChange { deadline } if now >= deadline => {
                self.state = SessionState::Building { dirty: false };
                true
            }
            _ => false,
        }
    }

    /// Enter `Building` without waiting, as for the initial build.
    ///
    /// Returns false if a build is already running.
    pub fn begin_build(&mut self) -> bool {
        if self.is_building() {
            return false;
        }
        self.state = SessionState::Building { dirty: false };
        true
    }

    /// A build finished. Goes back to `Idle`, or straight to
    /// `PendingChange` if changes arrived while building.
    pub fn on_build_complete(&mut self, stats: &BuildStats, now: Instant) {
        let dirty = matches!(self.state, SessionState::Building { dirty: true });
        self.builds += 1;
        if stats.is_success() && !stats.hash.is_empty() {
            self.last_hash = Some(stats.hash.clone());
        }
        self.state = if dirty {
            SessionState::PendingChange {
                deadline: now + self.debounce,
            }
        } else {
            SessionState::Idle
        };
    }
}
