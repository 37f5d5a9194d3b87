//! Miette diagnostic conversion for CLI errors.

use gaffer_bundler::CompilerError;
use gaffer_config::ConfigError;
use miette::Report;

use crate::error::CliError;
use crate::supervisor::SpawnError;

/// Convert a `CliError` into a miette report with a hint where one helps.
pub fn cli_error_to_miette(err: CliError) -> Report {
    match err {
        CliError::Config(e) => config_error_to_miette(e),
        CliError::Compiler(e) => compiler_error_to_miette(e),
        CliError::Spawn(SpawnError::ScriptNotFound(path)) => miette::miette!(
            help = "Build the backend first, or point [settings.supervisor] script at the server bundle",
            "Server script not found: {}",
            path.display()
        ),
        CliError::BuildFailed { targets } => miette::miette!(
            help = "The report above lists every error",
            "Build failed for {}",
            targets.join(", ")
        ),
        other => miette::miette!("{}", other),
    }
}

fn config_error_to_miette(err: ConfigError) -> Report {
    match err {
        ConfigError::FileNotFound(path) => miette::miette!(
            help = "Create a gaffer.toml in the project root or pass --config <path>",
            "Config file not found: {}",
            path.display()
        ),
        ConfigError::UnknownTarget(name) => miette::miette!(
            help = format!("Define it under [targets.{name}] in gaffer.toml"),
            "Unknown target '{}'",
            name
        ),
        other => miette::miette!("Configuration error: {}", other),
    }
}

fn compiler_error_to_miette(err: CompilerError) -> Report {
    match err {
        CompilerError::EntryNotFound(path) => miette::miette!(
            help = "Check the 'entry' field of the target",
            "Entry module not found: {}",
            path.display()
        ),
        other => miette::miette!("Build error: {}", other),
    }
}
