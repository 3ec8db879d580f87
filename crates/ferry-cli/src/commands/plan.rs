//! Plan command: per-document decisions without writing

use anyhow::{Context, Result};
use ferry_core::Config;
use ferry_runtime::{PlannedAction, Runtime};

/// Run the plan command
pub async fn run(config_path: &str, step: Option<&str>, json: bool) -> Result<()> {
    let config = Config::load(config_path).context("Failed to load configuration")?;
    config.validate().context("Configuration is invalid")?;

    let runtime = Runtime::new(config).await.context("Failed to open stores")?;
    let plans = runtime.plan(step).await.context("Planning failed")?;

    if json {
        let value: serde_json::Value = plans
            .iter()
            .map(|(name, documents)| {
                serde_json::json!({
                    "step": name,
                    "documents": documents,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    for (name, documents) in &plans {
        println!("Step: {}", name);
        for doc in documents {
            let destination = doc.destination.as_deref().unwrap_or("-");
            println!(
                "  {:<32} -> {:<32} {}",
                doc.source,
                destination,
                action_label(doc.action)
            );
        }
    }
    Ok(())
}

fn action_label(action: PlannedAction) -> &'static str {
    match action {
        PlannedAction::Unresolved => "skip (no destination)",
        PlannedAction::AlreadyProcessed => "skip (already processed)",
        PlannedAction::Direct => "direct copy",
        PlannedAction::Transform => "transform",
        PlannedAction::Reconcile => "reconcile schema, direct copy",
        PlannedAction::MissingDestination => "error (destination missing)",
    }
}
