//! Command-line interface definition for gaffer.
//!
//! # Command Structure
//!
//! - `gaffer build` - frontend and backend, once
//! - `gaffer frontend` / `gaffer backend` / `gaffer bin` - one target group, once
//! - `gaffer watch` - frontend and backend, rebuilt on change, with the dev server
//! - `gaffer bin-watch` - bin scripts, rebuilt on change
//! - `gaffer run` - backend rebuilt on change, server restarted on every new build


use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use gaffer_config::Mode;

/// gaffer - build, watch and run a frontend/backend project
#[derive(Parser, Debug)]
#[command(name = "gaffer", version, about = "Build, watch and run a frontend/backend/bin project")]
pub struct Cli {
    /// Build mode
    ///
    /// Falls back to GAFFER_MODE, then NODE_ENV, then development.
    #[arg(short, long, global = true, value_enum)]
    pub mode: Option<ModeArg>,

    /// Project root
    #[arg(long, global = true, value_name = "DIR", default_value = ".")]
    pub cwd: PathBuf,

    /// Configuration file (defaults to gaffer.toml in the project root)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, ValueEnum)]
pub enum ModeArg {
    #[value(name = "development", alias = "dev")]
    Development,
    #[value(name = "production", alias = "prod")]
    Production,
}

impl From<ModeArg> for Mode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Development => Mode::Development,
            ModeArg::Production => Mode::Production,
        }
    }
}

/// Available gaffer subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Build the frontend and the backend once
    Build,

    /// Build the frontend once
    Frontend,

    /// Build the backend once
    Backend,

    /// Build every bin script once
    Bin,

    /// Rebuild the frontend and the backend on change
    ///
    /// Serves the frontend output with live reload events and listens for
    /// HMR hashes unless --no-server is given.
    Watch {
        /// Do not start the development server
        #[arg(long)]
        no_server: bool,
    },

    /// Rebuild every bin script on change
    BinWatch,

    /// Rebuild the backend on change and keep the server running on the
    /// latest build
    Run,
}

impl Command {
    /// Configured target names this command works on.
    pub fn target_names(&self) -> &'static [&'static str] {
        match self {
            Command::Build | Command::Watch { .. } => &["frontend", "backend"],
            Command::Frontend => &["frontend"],
            Command::Backend | Command::Run => &["backend"],
            Command::Bin | Command::BinWatch => &["bin"],
        }
    }
}
