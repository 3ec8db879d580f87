//! Show processed documents

use anyhow::{Context, Result};
use ferry_core::Config;
use ferry_runtime::Runtime;

/// Run the status command
pub async fn run(config_path: &str, step: Option<&str>, stage: Option<&str>) -> Result<()> {
    let config = Config::load(config_path).context("Failed to load configuration")?;
    let runtime = Runtime::new(config).await.context("Failed to open stores")?;

    tracing::info!(
        "Project status (progress backend: {})",
        runtime.progress().backend_type()
    );

    for (name, stage, documents) in runtime.status(step, stage).await? {
        println!("{} [{}]: {} processed", name, stage, documents.len());
        for document in documents {
            println!("  {}", document);
        }
    }
    Ok(())
}
