//! Migration runtime
//!
//! Opens the configured stores and progress backend, then runs (or plans)
//! the project's steps in declaration order.

use std::collections::BTreeSet;
use std::sync::Arc;

use ferry_core::config::{Config, ReportingMode, StepConfig};
use ferry_core::progress::{FileProgress, MemoryProgress, ProgressConfig, ProgressStore};
use ferry_core::stores::Store;
use tokio::sync::watch;
use tracing::{Instrument, info, info_span};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::executor::{PlannedDocument, StepExecutor, StepReport};
use crate::pg_progress::PgProgress;
use crate::reporter::{LogReporter, NoopReporter, ProgressReporter};
use crate::steps::Step;

/// Runtime for a loaded project
pub struct Runtime {
    config: Config,
    source: Arc<dyn Store>,
    destination: Arc<dyn Store>,
    progress: Arc<dyn ProgressStore>,
}

impl Runtime {
    /// Open stores and the progress backend described by `config`
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let base = config.base_path.clone();
        let source = config.project.source.open("source", &base)?;
        let destination = config.project.destination.open("destination", &base)?;
        let progress = open_progress(&config).await?;
        info!(
            project = %config.project.name,
            progress = progress.backend_type(),
            "Runtime ready"
        );
        Ok(Self::with_stores(config, source, destination, progress))
    }

    /// Build a runtime around already-open stores
    pub fn with_stores(
        config: Config,
        source: Arc<dyn Store>,
        destination: Arc<dyn Store>,
        progress: Arc<dyn ProgressStore>,
    ) -> Self {
        Self {
            config,
            source,
            destination,
            progress,
        }
    }

    /// Project configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Progress backend
    pub fn progress(&self) -> &Arc<dyn ProgressStore> {
        &self.progress
    }

    /// Step configurations to run: all of them, or the one named `only`
    pub fn step_configs(&self, only: Option<&str>) -> Result<Vec<&StepConfig>> {
        match only {
            None => Ok(self.config.project.steps.iter().collect()),
            Some(name) => self
                .config
                .step(name)
                .map(|s| vec![s])
                .ok_or_else(|| Error::StepNotFound {
                    name: name.to_string(),
                }),
        }
    }

    fn steps(&self, only: Option<&str>, stage: Option<&str>) -> Result<Vec<Step>> {
        self.step_configs(only)?
            .into_iter()
            .map(|config| {
                let step = Step::from_config(&self.config, config)?;
                Ok(match stage {
                    Some(stage) => step.with_stage(stage),
                    None => step,
                })
            })
            .collect()
    }

    fn executor(&self) -> StepExecutor {
        let mode = self.config.project.reporting;
        let reporter: Box<dyn ProgressReporter> = match mode {
            ReportingMode::Off => Box::new(NoopReporter),
            ReportingMode::Documents | ReportingMode::Records => Box::new(LogReporter::default()),
        };
        StepExecutor::new(
            self.source.clone(),
            self.destination.clone(),
            self.progress.clone(),
        )
        .with_reporter(reporter, mode)
    }

    /// Run steps in order, stopping at the first failure
    pub async fn run(
        &self,
        only: Option<&str>,
        stage: Option<&str>,
        cancel: watch::Receiver<bool>,
    ) -> Result<Vec<StepReport>> {
        let run_id = Uuid::new_v4();
        let steps = self.steps(only, stage)?;
        info!(%run_id, steps = steps.len(), "Starting migration");

        let mut executor = self.executor();
        let mut reports = Vec::with_capacity(steps.len());
        for step in &steps {
            let span = info_span!("step", %run_id, name = %step.name);
            let report = executor.run(step, &cancel).instrument(span).await?;
            reports.push(report);
        }

        info!(%run_id, "Migration complete");
        Ok(reports)
    }

    /// Plan steps without writing
    pub async fn plan(&self, only: Option<&str>) -> Result<Vec<(String, Vec<PlannedDocument>)>> {
        let executor = self.executor();
        let mut plans = Vec::new();
        for step in self.steps(only, None)? {
            let plan = executor.plan(&step).await?;
            plans.push((step.name, plan));
        }
        Ok(plans)
    }

    /// Processed documents per step
    pub async fn status(
        &self,
        only: Option<&str>,
        stage: Option<&str>,
    ) -> Result<Vec<(String, String, BTreeSet<String>)>> {
        let mut status = Vec::new();
        for config in self.step_configs(only)? {
            let stage = stage.unwrap_or(config.stage.as_str());
            let done = self.progress.processed_entities(&config.name, stage).await?;
            status.push((config.name.clone(), stage.to_string(), done));
        }
        Ok(status)
    }
}

async fn open_progress(config: &Config) -> Result<Arc<dyn ProgressStore>> {
    Ok(match &config.project.progress {
        ProgressConfig::Memory => Arc::new(MemoryProgress::new()),
        file @ ProgressConfig::File { .. } => {
            let path = file
                .file_path(&config.base_path)
                .ok_or_else(|| ferry_core::Error::ConfigInvalid {
                    message: "progress file path missing".to_string(),
                })?;
            Arc::new(FileProgress::open(path)?)
        }
        ProgressConfig::Postgres { url, schema } => Arc::new(PgProgress::connect(url, schema).await?),
    })
}
