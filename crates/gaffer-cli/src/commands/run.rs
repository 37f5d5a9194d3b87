//! `gaffer run`: backend watch plus the supervised server.

use tokio::signal;

use crate::commands::Context;
use crate::error::Result;
use crate::ui;

pub async fn execute(context: Context) -> Result<()> {
    ui::info(&format!("Running backend ({})", context.mode.as_str()));

    let orchestrator = context.orchestrator()?;
    let mut handle = orchestrator.run().await?;

    let result = tokio::select! {
        _ = signal::ctrl_c() => {
            ui::info("Stopping server...");
            Ok(())
        }
        result = handle.wait() => result,
    };

    let stopped = handle.shutdown().await;
    result.and(stopped)
}
