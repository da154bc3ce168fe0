// ABOUTME: `sndbx clear` command
// ABOUTME: Removes leftover sandbox containers and networks by ownership label

use anyhow::{Context, Result};
use sndbx_cli::reporter::ConsoleReporter;
use sndbx_sandbox::{DockerEngine, Janitor};
use std::sync::Arc;
use tracing::warn;

pub async fn clear_command() -> Result<()> {
    let engine = DockerEngine::connect()
        .await
        .context("Failed to create sandbox client")?;

    let janitor = Janitor::new(Arc::new(engine), Arc::new(ConsoleReporter::new()));
    let report = janitor.clear().await.inspect_err(|leftover| {
        for failure in leftover.failures() {
            warn!(
                "Could not clear {} {}: {}",
                failure.step, failure.resource, failure.source
            );
        }
    })?;

    if report.removed.is_empty() {
        println!("✨ No sandboxes to clear");
    } else {
        println!("✅ Cleared {} sandbox resource(s)", report.removed.len());
    }

    Ok(())
}
