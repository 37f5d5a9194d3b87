//! `gaffer watch` and `gaffer bin-watch`.

use tokio::signal;

use crate::commands::Context;
use crate::error::Result;
use crate::ui;

/// Watch `names` until Ctrl+C or a fatal error.
pub async fn execute(context: Context, names: &[&str], serve: bool) -> Result<()> {
    ui::info(&format!("Watching {} ({})", names.join(", "), context.mode.as_str()));

    let orchestrator = context.orchestrator()?;
    let mut handle = orchestrator.watch(names, serve).await?;

    let result = tokio::select! {
        _ = signal::ctrl_c() => {
            ui::info("Shutting down...");
            Ok(())
        }
        result = handle.wait() => result,
    };

    handle.shutdown().await;
    result
}
