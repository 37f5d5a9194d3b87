//! One compiler pipeline per build target.
//!
//! [`CompilerPipeline::build_once`] runs a single pass.
//! [`CompilerPipeline::watch`] keeps rebuilding on file changes, one build in
//! flight at a time, with changes debounced by a [`WatchSession`].

mod session;
mod watcher;

use std::sync::Arc;
use std::time::{Duration, Instant as StdInstant};

use gaffer_bundler::{BuildStats, Compiler, CompilerError};
use gaffer_config::{BuildTarget, WatchSettings};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};

use crate::error::{CliError, Result};

pub use session::{SessionState, WatchSession};
pub use watcher::{ChangeEvent, FileChange, FileWatcher};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    pub debounce: Duration,
    /// Build once before waiting for the first change.
    pub initial_build: bool,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(100),
            initial_build: true,
        }
    }
}

impl WatchOptions {
    pub fn from_settings(settings: &WatchSettings) -> Self {
        Self {
            debounce: Duration::from_millis(settings.debounce_ms),
            ..Self::default()
        }
    }
}

#[derive(Clone)]
pub struct CompilerPipeline {
    target: Arc<BuildTarget>,
    compiler: Arc<dyn Compiler>,
}

impl CompilerPipeline {
    pub fn new(target: Arc<BuildTarget>, compiler: Arc<dyn Compiler>) -> Self {
        Self { target, compiler }
    }

    pub fn target(&self) -> &Arc<BuildTarget> {
        &self.target
    }

    /// Run one pass.
    ///
    /// Compile errors are part of the returned stats; `Err` means no pass
    /// could run.
    pub async fn build_once(&self) -> Result<BuildStats, CompilerError> {
        tracing::debug!(target_name = %self.target.name, "build started");
        self.compiler.compile(Arc::clone(&self.target)).await
    }

    /// A pass whose structural failure is folded into the stats.
    async fn build_reported(&self) -> BuildStats {
        let started = StdInstant::now();
        match self.build_once().await {
            Ok(stats) => stats,
            Err(err) => {
                tracing::warn!(target_name = %self.target.name, error = %err, "build could not run");
                BuildStats::from_failure(
                    self.target.name.clone(),
                    err.to_string(),
                    started.elapsed().as_millis() as u64,
                )
            }
        }
    }

    /// Rebuild on every quiet period after changes.
    ///
    /// `on_build` is called exactly once per completed build. A structural
    /// failure of the initial build is returned as an error; after that,
    /// failures are reported through `on_build` and the loop keeps going.
    ///
    /// Returns `Ok(())` when `changes` closes and the watcher error if one
    /// arrives.
    pub async fn watch<F>(
        &self,
        mut changes: mpsc::Receiver<ChangeEvent>,
        options: WatchOptions,
        mut on_build: F,
    ) -> Result<()>
    where
        F: FnMut(&BuildStats) + Send,
    {
        let mut session = WatchSession::new(Arc::clone(&self.target), options.debounce);
        let mut closed = false;

        if options.initial_build {
            session.begin_build();
            let stats = self.build_once().await?;
            session.on_build_complete(&stats, Instant::now());
            on_build(&stats);
        }

        loop {
            if closed {
                return Ok(());
            }

            match session.deadline() {
                Some(deadline) => {
                    tokio::select! {
                        event = changes.recv() => {
                            closed = apply(&mut session, event)?;
                        }
                        _ = sleep_until(deadline) => {
                            if session.on_deadline(Instant::now()) {
                                let stats = self.build_tracking(&mut session, &mut changes, &mut closed).await?;
                                session.on_build_complete(&stats, Instant::now());
                                on_build(&stats);
                            }
                        }
                    }
                }
                None => {
                    let event = changes.recv().await;
                    closed = apply(&mut session, event)?;
                }
            }
        }
    }

    /// Build while still listening for changes so they mark the session dirty.
    async fn build_tracking(
        &self,
        session: &mut WatchSession,
        changes: &mut mpsc::Receiver<ChangeEvent>,
        closed: &mut bool,
    ) -> Result<BuildStats> {
        let build = self.build_reported();
        tokio::pin!(build);

        loop {
            tokio::select! {
                stats = &mut build => return Ok(stats),
                event = changes.recv(), if !*closed => {
                    *closed = apply(session, event)?;
                }
            }
        }
    }
}

/// Feed one channel item to the session. Returns true if the channel closed.
fn apply(session: &mut WatchSession, event: Option<ChangeEvent>) -> Result<bool> {
    match event {
        Some(Ok(change)) => {
            tracing::debug!(
                target_name = %session.target().name,
                path = %change.path().display(),
                "change"
            );
            session.on_change(Instant::now());
            Ok(false)
        }
        Some(Err(err)) => Err(CliError::Watch(err)),
        None => Ok(true),
    }
}
