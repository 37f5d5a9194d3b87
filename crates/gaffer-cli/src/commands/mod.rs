//! Command implementations for the gaffer CLI.
//!
//! - [`build`] - one-shot builds (`build`, `frontend`, `backend`, `bin`)
//! - [`watch`] - `watch` and `bin-watch`
//! - [`run`] - `run`
//!
//! Every command starts from a [`Context`]: the project root, the mode and
//! the loaded configuration.

pub mod build;
pub mod run;
pub mod watch;

use std::path::PathBuf;

use gaffer_config::{ConfigDiscovery, ConfigSource, LoadedConfig, Mode};

use crate::cli::{Cli, Command};
use crate::error::{Result, ResultExt};
use crate::orchestrator::Orchestrator;

/// Everything a command needs before it touches a target.
pub struct Context {
    pub root: PathBuf,
    pub mode: Mode,
    pub config: LoadedConfig,
}

impl Context {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let root = cli.cwd.canonicalize().with_path(&cli.cwd)?;
        let mode = cli.mode.map(Mode::from).unwrap_or_else(Mode::from_env);

        let discovery = ConfigDiscovery::new(&root);
        let config = match &cli.config {
            Some(path) => discovery.load_from(path)?,
            None => discovery.load()?,
        };

        match &config.source {
            ConfigSource::File(path) => tracing::debug!(path = %path.display(), "loaded config"),
            ConfigSource::Presets => tracing::debug!("using built-in presets"),
        }
        tracing::debug!(root = %root.display(), mode = %mode.as_str(), "context ready");

        Ok(Self { root, mode, config })
    }

    pub fn orchestrator(self) -> Result<Orchestrator> {
        Orchestrator::new(self.config, self.mode, &self.root)
    }
}

/// Run the parsed command to completion.
pub async fn execute(cli: Cli) -> Result<()> {
    let context = Context::from_cli(&cli)?;
    let names = cli.command.target_names();

    match cli.command {
        Command::Build | Command::Frontend | Command::Backend | Command::Bin => {
            build::execute(context, names).await
        }
        Command::Watch { no_server } => watch::execute(context, names, !no_server).await,
        Command::BinWatch => watch::execute(context, names, false).await,
        Command::Run => run::execute(context).await,
    }
}
