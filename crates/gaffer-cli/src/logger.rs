//! Logging infrastructure for the gaffer CLI.
//!
//! Structured logging on top of `tracing`. Verbosity comes from the global
//! flags, with `RUST_LOG` as the override when neither flag is given.
//!
//! # Example
//!
//! ```rust,no_run
//! use gaffer_cli::logger::init_logger;
//! use tracing::{debug, info};
//!
//! init_logger(false, false, false);
//!
//! info!("Starting build");
//! debug!(target_name = "frontend", "compiling");
//! ```

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const VERBOSE_FILTER: &str = "gaffer=debug,gaffer_config=debug,gaffer_bundler=debug,gaffer_cli=debug";
const QUIET_FILTER: &str = "gaffer=error,gaffer_config=error,gaffer_bundler=error,gaffer_cli=error";
const DEFAULT_FILTER: &str = "gaffer=info,gaffer_config=info,gaffer_bundler=info,gaffer_cli=info";

/// Initialize the tracing subscriber.
///
/// Call once at the start of the program, before any logging occurs.
///
/// # Verbosity Levels
///
/// 1. `--verbose`: DEBUG for gaffer crates
/// 2. `--quiet`: ERROR only
/// 3. `RUST_LOG`: custom filter
/// 4. Default: INFO for gaffer crates
pub fn init_logger(verbose: bool, quiet: bool, no_color: bool) {
    init_logger_with_filter(filter_for(verbose, quiet), no_color);
}

/// Initialize the logger with a custom filter.
pub fn init_logger_with_filter(filter: EnvFilter, no_color: bool) {
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .with_ansi(!no_color)
        .compact();

    // tests and embedders may have installed a subscriber already
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

fn filter_for(verbose: bool, quiet: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else if quiet {
        EnvFilter::new(QUIET_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }
}
