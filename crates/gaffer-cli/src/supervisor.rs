//! Supervision of the server process started by `gaffer run`.
//!
//! A [`ProcessSupervisor`] owns at most one child at a time. Each child is
//! watched by a small monitor task that reports an unexpected exit and kills
//! the child when asked to. Nothing here restarts a process on its own;
//! restarts only happen when requested through a [`SupervisorHandle`].

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use gaffer_config::SupervisorSettings;
use indexmap::IndexMap;
use thiserror::Error;
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("server script not found: {}", .0.display())]
    ScriptNotFound(PathBuf),

    #[error("failed to start '{interpreter}': {source}")]
    Spawn {
        interpreter: String,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    /// A process is running. `generation` counts starts from 1.
    Started { generation: u64, pid: Option<u32> },
    /// The process of generation `previous` was stopped for a restart.
    Restarted { previous: u64 },
    /// A process exited without being asked to.
    Exited { generation: u64, code: Option<i32> },
}

/// How to launch the server.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub interpreter: String,
    pub args: Vec<String>,
    pub script: PathBuf,
    pub env: IndexMap<String, String>,
    pub watch: Vec<PathBuf>,
    pub cwd: PathBuf,
    pub restart_delay: Duration,
}

impl SupervisorConfig {
    pub fn from_settings(settings: &SupervisorSettings, root: &Path) -> Self {
        Self {
            interpreter: settings.interpreter.clone(),
            args: settings.args.clone(),
            script: root.join(&settings.script),
            env: settings.env.clone(),
            watch: settings.watch.iter().map(|path| root.join(path)).collect(),
            cwd: root.to_path_buf(),
            restart_delay: Duration::from_millis(settings.restart_delay_ms),
        }
    }
}

/// A running child and its monitor.
#[derive(Debug)]
pub struct SupervisedProcess {
    script_path: PathBuf,
    watched_restart_paths: Vec<PathBuf>,
    environment: IndexMap<String, String>,
    generation: u64,
    pid: Option<u32>,
    kill: Option<oneshot::Sender<()>>,
    monitor: JoinHandle<()>,
}

impl SupervisedProcess {
    pub fn script_path(&self) -> &Path {
        &self.script_path
    }

    /// Recorded for reference; no file watch is installed for these.
    pub fn watched_restart_paths(&self) -> &[PathBuf] {
        &self.watched_restart_paths
    }

    pub fn environment(&self) -> &IndexMap<String, String> {
        &self.environment
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn is_alive(&self) -> bool {
        !self.monitor.is_finished()
    }

    /// Kill the child if it is still running and wait for it.
    async fn terminate(mut self) {
        if let Some(kill) = self.kill.take() {
            let _ = kill.send(());
        }
        if let Err(err) = (&mut self.monitor).await {
            tracing::warn!(error = %err, "process monitor failed");
        }
    }
}

pub struct ProcessSupervisor {
    config: SupervisorConfig,
    events: broadcast::Sender<SupervisorEvent>,
    current: Option<SupervisedProcess>,
    generation: u64,
}

impl ProcessSupervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            config,
            events,
            current: None,
            generation: 0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.events.subscribe()
    }

    pub fn current(&self) -> Option<&SupervisedProcess> {
        self.current.as_ref()
    }

    /// Spawn the server. A process that is still running is stopped first.
    pub async fn start(&mut self) -> Result<&SupervisedProcess, SpawnError> {
        if let Some(previous) = self.current.take() {
            previous.terminate().await;
        }

        let script = &self.config.script;
        if !script.is_file() {
            return Err(SpawnError::ScriptNotFound(script.clone()));
        }

        let child = Command::new(&self.config.interpreter)
            .args(&self.config.args)
            .arg(script)
            .envs(&self.config.env)
            .current_dir(&self.config.cwd)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SpawnError::Spawn {
                interpreter: self.config.interpreter.clone(),
                source,
            })?;

        self.generation += 1;
        let generation = self.generation;
        let pid = child.id();
        let (kill, kill_rx) = oneshot::channel();
        let monitor = tokio::spawn(monitor(child, kill_rx, generation, self.events.clone()));

        tracing::info!(generation, ?pid, script = %script.display(), "server started");
        let _ = self.events.send(SupervisorEvent::Started { generation, pid });

        Ok(self.current.insert(SupervisedProcess {
            script_path: script.clone(),
            watched_restart_paths: self.config.watch.clone(),
            environment: self.config.env.clone(),
            generation,
            pid,
            kill: Some(kill),
            monitor,
        }))
    }

    /// Stop the current process, if any, and start a new one.
    pub async fn restart(&mut self) -> Result<&SupervisedProcess, SpawnError> {
        if let Some(previous) = self.current.take() {
            let generation = previous.generation;
            previous.terminate().await;
            tracing::info!(previous = generation, "restarting server");
            let _ = self.events.send(SupervisorEvent::Restarted {
                previous: generation,
            });
            if !self.config.restart_delay.is_zero() {
                tokio::time::sleep(self.config.restart_delay).await;
            }
        }
        self.start().await
    }

    pub async fn shutdown(&mut self) {
        if let Some(process) = self.current.take() {
            process.terminate().await;
        }
    }

    /// Move the supervisor into a task that starts or restarts the server
    /// once per request.
    ///
    /// Requests that arrive while a restart is in progress collapse into one.
    pub fn spawn(self) -> SupervisorHandle {
        let (requests, mut rx) = watch::channel(0_u64);
        let events = self.events.clone();
        let mut supervisor = self;

        let task = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let request = *rx.borrow_and_update();
                tracing::debug!(request, "restart requested");

                let result = if supervisor.current.is_some() {
                    supervisor.restart().await.map(|_| ())
                } else {
                    supervisor.start().await.map(|_| ())
                };
                if let Err(err) = result {
                    supervisor.shutdown().await;
                    return Err(err);
                }
            }
            supervisor.shutdown().await;
            Ok(())
        });

        SupervisorHandle {
            requests,
            events,
            task: Some(task),
        }
    }
}

async fn monitor(
    mut child: Child,
    mut kill: oneshot::Receiver<()>,
    generation: u64,
    events: broadcast::Sender<SupervisorEvent>,
) {
    tokio::select! {
        status = child.wait() => {
            let code = status.ok().and_then(|status| status.code());
            tracing::warn!(generation, ?code, "server exited");
            let _ = events.send(SupervisorEvent::Exited { generation, code });
        }
        // also fires when the sender is dropped
        _ = &mut kill => {
            if let Err(err) = child.kill().await {
                tracing::warn!(generation, error = %err, "failed to kill server");
            }
        }
    }
}

/// The running supervisor task.
pub struct SupervisorHandle {
    requests: watch::Sender<u64>,
    events: broadcast::Sender<SupervisorEvent>,
    task: Option<JoinHandle<Result<(), SpawnError>>>,
}

impl SupervisorHandle {
    /// Ask for a (re)start. Never blocks.
    pub fn request_restart(&self) {
        self.requests.send_modify(|count| *count += 1);
    }

    /// A cloneable handle for asking restarts from other tasks.
    ///
    /// The supervisor keeps running while any requester is alive.
    pub fn requester(&self) -> RestartRequester {
        RestartRequester {
            requests: self.requests.clone(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.events.subscribe()
    }

    /// Wait for the supervisor task to stop, which only happens on a spawn
    /// failure or after [`shutdown`](Self::shutdown).
    pub async fn stopped(&mut self) -> Result<(), SpawnError> {
        match self.task.as_mut() {
            Some(task) => {
                let result = task.await;
                self.task = None;
                flatten(result)
            }
            None => std::future::pending().await,
        }
    }

    /// Stop accepting requests and terminate the current process.
    pub async fn shutdown(self) -> Result<(), SpawnError> {
        let Self { requests, task, .. } = self;
        drop(requests);
        match task {
            Some(task) => flatten(task.await),
            None => Ok(()),
        }
    }
}

#[derive(Clone)]
pub struct RestartRequester {
    requests: watch::Sender<u64>,
}

impl RestartRequester {
    pub fn request_restart(&self) {
        self.requests.send_modify(|count| *count += 1);
    }
}

fn flatten(result: Result<Result<(), SpawnError>, tokio::task::JoinError>) -> Result<(), SpawnError> {
    match result {
        Ok(inner) => inner,
        Err(err) => {
            tracing::error!(error = %err, "supervisor task failed");
            Ok(())
        }
    }
}
