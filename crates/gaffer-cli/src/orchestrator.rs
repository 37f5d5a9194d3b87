//! Wires pipelines, the supervisor, the bridge and the dev server into the
//! named commands.
//!
//! The project is resolved once in [`Orchestrator::new`]. One-shot builds
//! return an [`Outcome`]; `watch` and `run` return a handle as soon as every
//! pipeline has reported its first pass, and keep running in the background
//! until the handle is shut down.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use gaffer_bundler::{BuildStats, BundleCompiler, Compiler, ReportOptions};
use gaffer_config::{BuildTarget, LoadedConfig, Mode, ResolvedProject, Settings, TargetKind};
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};

use crate::bridge::NotificationBridge;
use crate::dev::{DevServer, DevServerState, HmrListener, ServiceHandle, SharedState};
use crate::error::{CliError, Result};
use crate::pipeline::{CompilerPipeline, FileWatcher, WatchOptions};
use crate::supervisor::{ProcessSupervisor, SupervisorConfig, SupervisorHandle};
use crate::ui;

/// Extra work done after every pass of a watched target.
type BuildHook = Arc<dyn Fn(&BuildStats) + Send + Sync>;

pub struct Orchestrator {
    project: ResolvedProject,
    settings: Settings,
    compiler: Arc<dyn Compiler>,
    report: ReportOptions,
}

impl Orchestrator {
    /// Resolve every target of `loaded` for `mode` under `root`.
    ///
    /// # Errors
    ///
    /// Returns the configuration error if any target fails to resolve.
    pub fn new(loaded: LoadedConfig, mode: Mode, root: impl AsRef<Path>) -> Result<Self> {
        let project = loaded.project.resolve(mode, root.as_ref())?;
        let report = ReportOptions::from_settings(&loaded.settings.report);
        let use_color = report.use_color && ui::colors_enabled();

        Ok(Self {
            project,
            settings: loaded.settings,
            compiler: Arc::new(BundleCompiler::new()),
            report: report.with_color(use_color),
        })
    }

    /// Replace the default compiler.
    pub fn with_compiler(mut self, compiler: Arc<dyn Compiler>) -> Self {
        self.compiler = compiler;
        self
    }

    pub fn project(&self) -> &ResolvedProject {
        &self.project
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Build targets configured under `names`, bin scripts expanded.
    pub fn targets(&self, names: &[&str]) -> Result<Vec<Arc<BuildTarget>>> {
        let mut targets = Vec::new();
        for name in names {
            targets.extend(self.project.get(name)?.targets.iter().cloned());
        }
        if targets.is_empty() {
            return Err(CliError::InvalidArgument(format!(
                "nothing to build for {}",
                names.join(", ")
            )));
        }
        Ok(targets)
    }

    fn pipeline(&self, target: Arc<BuildTarget>) -> CompilerPipeline {
        CompilerPipeline::new(target, Arc::clone(&self.compiler))
    }

    /// Build every named target once, concurrently.
    ///
    /// Every pass is reported. Compile errors are part of the outcome; `Err`
    /// means a pass could not run at all.
    pub async fn build(&self, names: &[&str]) -> Result<Outcome> {
        let targets = self.targets(names)?;
        let started = Instant::now();

        let handles: Vec<_> = targets
            .into_iter()
            .map(|target| {
                let pipeline = self.pipeline(target);
                tokio::spawn(async move { pipeline.build_once().await })
            })
            .collect();

        let mut stats = Vec::with_capacity(handles.len());
        let mut failure = None;
        for handle in handles {
            match handle.await? {
                Ok(pass) => {
                    ui::print_report(&pass, &self.report);
                    stats.push(pass);
                }
                Err(err) => {
                    if failure.is_none() {
                        failure = Some(err);
                    }
                }
            }
        }
        if let Some(err) = failure {
            return Err(err.into());
        }

        let outcome = Outcome {
            stats,
            duration: started.elapsed(),
        };
        outcome.summarize();
        Ok(outcome)
    }

    /// Watch the named targets. With `serve`, the dev server and the HMR
    /// listener run alongside.
    ///
    /// Returns once every target finished its first pass.
    pub async fn watch(&self, names: &[&str], serve: bool) -> Result<WatchHandle> {
        let targets = self.targets(names)?;

        let (state, http, hmr) = if serve {
            let out_dir = targets
                .iter()
                .find(|target| target.kind == TargetKind::Frontend)
                .map(|target| target.output_path.clone())
                .unwrap_or_else(|| self.project.root.clone());
            let state: SharedState = Arc::new(DevServerState::new(
                out_dir,
                targets.iter().map(|target| target.name.as_str()),
            ));
            let http = DevServer::new(&self.settings.dev_server, Arc::clone(&state)).start().await?;
            let hmr = match HmrListener::new(&self.settings.hmr, Arc::clone(&state)).start().await {
                Ok(hmr) => hmr,
                Err(err) => {
                    http.stop().await;
                    return Err(err);
                }
            };
            (Some(state), Some(http), Some(hmr))
        } else {
            (None, None, None)
        };

        let hook: Option<BuildHook> = state.map(|state| -> BuildHook {
            Arc::new(move |stats: &BuildStats| {
                state.record_build(stats);
            })
        });

        match self.spawn_watches(targets, hook).await {
            Ok(mut handle) => {
                handle.http = http;
                handle.hmr = hmr;
                Ok(handle)
            }
            Err(err) => {
                for service in [http, hmr].into_iter().flatten() {
                    service.stop().await;
                }
                Err(err)
            }
        }
    }

    /// Watch the backend and keep the server running on its latest build.
    ///
    /// Every successful pass stages its hash and asks for a restart; the hash
    /// is pushed once the new server is up. A failed pass pushes its hash to
    /// the current server.
    pub async fn run(&self) -> Result<RunHandle> {
        let targets = self.targets(&["backend"])?;

        let supervisor = ProcessSupervisor::new(SupervisorConfig::from_settings(
            &self.settings.supervisor,
            &self.project.root,
        ));
        let bridge = Arc::new(NotificationBridge::from_settings(&self.settings.hmr));
        let bridge_task = Arc::clone(&bridge).attach(supervisor.subscribe());
        let supervisor = supervisor.spawn();

        let requester = supervisor.requester();
        let hook_bridge = Arc::clone(&bridge);
        let hook: BuildHook = Arc::new(move |stats: &BuildStats| {
            if stats.is_success() {
                if !stats.hash.is_empty() {
                    hook_bridge.stage(stats.hash.clone());
                }
                requester.request_restart();
            } else if !stats.hash.is_empty() {
                let bridge = Arc::clone(&hook_bridge);
                let hash = stats.hash.clone();
                tokio::spawn(async move {
                    bridge.push(&hash).await;
                });
            }
        });

        let watch = match self.spawn_watches(targets, Some(hook)).await {
            Ok(watch) => watch,
            Err(err) => {
                if let Err(err) = supervisor.shutdown().await {
                    tracing::warn!(error = %err, "supervisor stopped with error");
                }
                bridge_task.abort();
                return Err(err);
            }
        };

        Ok(RunHandle {
            watch,
            supervisor,
            bridge,
            bridge_task,
        })
    }

    async fn spawn_watches(&self, targets: Vec<Arc<BuildTarget>>, hook: Option<BuildHook>) -> Result<WatchHandle> {
        let options = WatchOptions::from_settings(&self.settings.watch);
        let mut tasks = JoinSet::new();
        let mut first_passes = Vec::with_capacity(targets.len());

        for target in targets {
            let (watcher, changes) = FileWatcher::new(
                self.project.root.clone(),
                &target.watch_paths,
                self.settings.watch.ignore.clone(),
            )?;
            let name = target.name.clone();
            let pipeline = self.pipeline(target);
            let report = self.report.clone();
            let hook = hook.clone();
            let (first_tx, first_rx) = oneshot::channel();

            tracing::info!(target_name = %name, paths = ?watcher.watched(), "watching");
            let task_name = name.clone();
            tasks.spawn(async move {
                let _watcher = watcher;
                let mut first = Some(first_tx);
                let result = pipeline
                    .watch(changes, options, |stats| {
                        ui::print_report(stats, &report);
                        if let Some(hook) = &hook {
                            hook(stats);
                        }
                        if let Some(first) = first.take() {
                            let _ = first.send(());
                        }
                    })
                    .await;
                (task_name, result)
            });
            first_passes.push((name, first_rx));
        }

        let mut handle = WatchHandle {
            tasks,
            http: None,
            hmr: None,
        };

        for (name, first) in first_passes {
            if first.await.is_err() {
                // the pipeline ended before its first pass; surface why
                let err = match handle.wait().await {
                    Err(err) => err,
                    Ok(()) => CliError::Task(format!("watch of '{name}' ended before its first build")),
                };
                handle.shutdown().await;
                return Err(err);
            }
        }

        ui::success("Watching for changes");
        Ok(handle)
    }
}

/// Result of a one-shot build.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub stats: Vec<BuildStats>,
    pub duration: Duration,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        self.stats.iter().all(BuildStats::is_success)
    }

    /// Names of the targets that finished with errors.
    pub fn failed(&self) -> Vec<String> {
        self.stats
            .iter()
            .filter(|stats| stats.has_errors())
            .map(|stats| stats.target_name.clone())
            .collect()
    }

    fn summarize(&self) {
        let elapsed = ui::format_duration(self.duration);
        if self.is_success() {
            ui::success(&format!("Built {} target(s) in {elapsed}", self.stats.len()));
        } else {
            ui::error(&format!("Build failed for {} after {elapsed}", self.failed().join(", ")));
        }
    }
}

/// Running watch pipelines, and the dev server when serving.
pub struct WatchHandle {
    tasks: JoinSet<(String, Result<()>)>,
    http: Option<ServiceHandle>,
    hmr: Option<ServiceHandle>,
}

impl WatchHandle {
    pub fn server_addr(&self) -> Option<std::net::SocketAddr> {
        self.http.as_ref().map(ServiceHandle::local_addr)
    }

    pub fn hmr_addr(&self) -> Option<std::net::SocketAddr> {
        self.hmr.as_ref().map(ServiceHandle::local_addr)
    }

    /// Block until a pipeline or service fails, or every pipeline ended.
    pub async fn wait(&mut self) -> Result<()> {
        loop {
            tokio::select! {
                joined = self.tasks.join_next() => match joined {
                    None => return Ok(()),
                    Some(Ok((name, Ok(())))) => {
                        tracing::debug!(target_name = %name, "watch ended");
                    }
                    Some(Ok((name, Err(err)))) => {
                        tracing::error!(target_name = %name, error = %err, "watch failed");
                        return Err(err);
                    }
                    Some(Err(err)) => return Err(err.into()),
                },
                result = stopped(self.http.as_mut()) => return result,
                result = stopped(self.hmr.as_mut()) => return result,
            }
        }
    }

    /// Stop every pipeline and service. Dropping the pipelines stops their
    /// file watchers.
    pub async fn shutdown(mut self) {
        self.tasks.shutdown().await;
        if let Some(http) = self.http.take() {
            http.stop().await;
        }
        if let Some(hmr) = self.hmr.take() {
            hmr.stop().await;
        }
    }
}

async fn stopped(service: Option<&mut ServiceHandle>) -> Result<()> {
    match service {
        Some(service) => service.stopped().await,
        None => std::future::pending().await,
    }
}

/// `gaffer run` in the background.
pub struct RunHandle {
    watch: WatchHandle,
    supervisor: SupervisorHandle,
    bridge: Arc<NotificationBridge>,
    bridge_task: JoinHandle<()>,
}

impl RunHandle {
    pub fn bridge(&self) -> &Arc<NotificationBridge> {
        &self.bridge
    }

    pub fn supervisor(&self) -> &SupervisorHandle {
        &self.supervisor
    }

    /// Block until the watch fails or the server cannot be started.
    pub async fn wait(&mut self) -> Result<()> {
        tokio::select! {
            result = self.watch.wait() => result,
            result = self.supervisor.stopped() => result.map_err(CliError::from),
        }
    }

    /// Stop watching first so no more restarts are requested, then stop the
    /// server and close the channel.
    pub async fn shutdown(self) -> Result<()> {
        let Self {
            watch,
            supervisor,
            bridge,
            bridge_task,
        } = self;

        watch.shutdown().await;
        let result = supervisor.shutdown().await;
        bridge_task.abort();
        bridge.release().await;
        result.map_err(CliError::from)
    }
}
