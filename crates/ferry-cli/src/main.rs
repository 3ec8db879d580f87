//! Ferry CLI
//!
//! Scaffold, check, plan and run record migrations.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

/// Ferry - schema-aware bulk record migration
#[derive(Parser)]
#[command(name = "ferry")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file or project directory
    #[arg(short, long, default_value = "ferry.yaml", env = "FERRY_CONFIG")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new Ferry project with sample data
    Init {
        /// Directory to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: String,

        /// Project name (defaults to directory name)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Validate configuration without running
    Validate,

    /// Show what a run would do, per document
    Plan {
        /// Plan a specific step only
        #[arg(short, long)]
        step: Option<String>,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run migration steps
    Run {
        /// Run a specific step only
        #[arg(short, long)]
        step: Option<String>,

        /// Override the stage used to key progress
        #[arg(long)]
        stage: Option<String>,
    },

    /// Show processed documents
    Status {
        /// Show a specific step only
        #[arg(short, long)]
        step: Option<String>,

        /// Override the stage used to key progress
        #[arg(long)]
        stage: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if cli.log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    match cli.command {
        Commands::Init { path, name } => {
            commands::init::run(&path, name.as_deref()).await?;
        }
        Commands::Validate => {
            commands::validate::run(&cli.config).await?;
        }
        Commands::Plan { step, json } => {
            commands::plan::run(&cli.config, step.as_deref(), json).await?;
        }
        Commands::Run { step, stage } => {
            commands::run::run(&cli.config, step.as_deref(), stage.as_deref()).await?;
        }
        Commands::Status { step, stage } => {
            commands::status::run(&cli.config, step.as_deref(), stage.as_deref()).await?;
        }
    }

    Ok(())
}
