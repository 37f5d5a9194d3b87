//! gaffer CLI - build, watch and run a multi-target project.
//!
//! The binary composes a handful of small components:
//!
//! - [`pipeline`] - one compiler pipeline per target with a debounced watch loop
//! - [`supervisor`] - the supervised server process of `gaffer run`
//! - [`bridge`] - the single HMR channel that forwards build hashes
//! - [`dev`] - the development server and its HMR listener
//! - [`orchestrator`] - wires the above into the named commands
//!
//! Logging goes through [`logger`], operator-facing output through [`ui`].
//!
//! # Example
//!
//! ```rust,no_run
//! use gaffer_cli::orchestrator::Orchestrator;
//! use gaffer_config::{ConfigDiscovery, Mode};
//!
//! # #[tokio::main]
//! # async fn main() -> gaffer_cli::Result<()> {
//! let loaded = ConfigDiscovery::new(".").load()?;
//! let orchestrator = Orchestrator::new(loaded, Mode::Development, ".")?;
//! let outcome = orchestrator.build(&["frontend", "backend"]).await?;
//! assert!(outcome.is_success());
//! # Ok(()) }
//! ```

pub mod bridge;
pub mod cli;
pub mod commands;
pub mod dev;
pub mod error;
pub mod logger;
pub mod orchestrator;
pub mod pipeline;
pub mod supervisor;
pub mod ui;

pub use error::{CliError, Result, ResultExt};
