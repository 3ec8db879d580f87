//! Validate configuration command

use anyhow::{Context, Result};
use ferry_core::Config;

/// Run the validate command
pub async fn run(config_path: &str) -> Result<()> {
    tracing::info!("Validating configuration: {}", config_path);

    let config = Config::load(config_path).context("Failed to load configuration")?;

    tracing::info!("✓ Project: {}", config.project.name);
    tracing::info!("✓ Version: {}", config.project.version);

    config.validate().context("Configuration is invalid")?;

    for step in &config.project.steps {
        tracing::info!(
            "✓ Step '{}' ({:?}): resumable={} reconcile_schema={} resolve_transforms={}",
            step.name,
            step.kind,
            step.is_resumable(),
            step.reconciles_schema(),
            step.resolves_transforms()
        );
    }

    tracing::info!("✓ Configuration is valid");
    println!("Configuration is valid");
    Ok(())
}
