//! One-shot builds.

use crate::commands::Context;
use crate::error::{CliError, Result};
use crate::ui;

/// Build `names` once and fail if any target reported errors.
pub async fn execute(context: Context, names: &[&str]) -> Result<()> {
    ui::info(&format!("Building {} ({})", names.join(", "), context.mode.as_str()));

    let orchestrator = context.orchestrator()?;
    let outcome = orchestrator.build(names).await?;

    if outcome.is_success() {
        Ok(())
    } else {
        Err(CliError::BuildFailed {
            targets: outcome.failed(),
        })
    }
}
