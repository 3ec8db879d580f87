//! Run migration steps

use anyhow::{Context, Result};
use ferry_core::Config;
use ferry_runtime::Runtime;
use tokio::sync::watch;

/// Run the configured steps
pub async fn run(config_path: &str, step: Option<&str>, stage: Option<&str>) -> Result<()> {
    tracing::info!("Loading configuration from {}", config_path);

    let config = Config::load(config_path).context("Failed to load configuration")?;
    config.validate().context("Configuration is invalid")?;

    tracing::info!("Project: {}", config.project.name);

    let runtime = Runtime::new(config).await.context("Failed to open stores")?;

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Received Ctrl+C, stopping after the current document");
            let _ = cancel_tx.send(true);
        }
    });

    tracing::info!("Starting migration (press Ctrl+C to stop)");
    let reports = runtime
        .run(step, stage, cancel_rx)
        .await
        .context("Migration failed")?;

    for report in &reports {
        println!(
            "{} [{}]: {} migrated ({} direct, {} transformed), {} skipped, {} records in {:.2?}",
            report.step,
            report.stage,
            report.documents_migrated,
            report.direct_copies,
            report.transformed,
            report.skipped_unresolved + report.skipped_processed,
            report.records_written,
            report.duration
        );
    }

    tracing::info!("Ferry finished");
    Ok(())
}
