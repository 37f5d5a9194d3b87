//! # gaffer-bundler
//!
//! The [`Compiler`] interface a build pipeline drives, the [`BuildStats`]
//! each pass produces, the default [`BundleCompiler`] and the
//! [`BuildReporter`] that renders stats for the terminal.
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use gaffer_bundler::{BuildReporter, BundleCompiler, Compiler, ReportOptions};
//! use gaffer_config::{presets, Mode};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let project = presets::builtin()?.resolve(Mode::Development, Path::new("."))?;
//! let compiler = BundleCompiler::new();
//!
//! let stats = compiler.compile(project.single("frontend")?).await?;
//! println!("{}", BuildReporter::format(&stats, &ReportOptions::default()));
//! # Ok(()) }
//! ```

pub mod bundle;
pub mod compiler;
pub mod report;
pub mod stats;

pub use bundle::BundleCompiler;
pub use compiler::{Compiler, CompilerError};
pub use report::{format_size, BuildReporter, Report, ReportOptions};
pub use stats::{AssetStats, BuildStats, Diagnostic, ModuleReason, ModuleStats};
