//! Runnable step definitions
//!
//! A [`Step`] is a [`StepConfig`] with its mapping compiled and its document
//! list (if group-driven) loaded, ready to hand to the executor.

use ferry_core::config::{Config, StepConfig};
use ferry_core::mapping::Mapping;
use ferry_core::progress::DEFAULT_STAGE;
use ferry_core::stores::Store;
use tracing::info;

use crate::error::Result;

/// A step ready to run
#[derive(Debug)]
pub struct Step {
    /// Step name, keys progress
    pub name: String,
    /// Stage name, keys progress
    pub stage: String,
    /// Compiled mapping rules
    pub mapping: Mapping,
    /// Documents to migrate; `None` means every document the source lists
    pub documents: Option<Vec<String>>,
    /// Skip completed documents, clear destinations, record completion
    pub resumable: bool,
    /// Widen destination tables with source columns before copying
    pub reconcile_schema: bool,
    /// Choose between direct copy and a transform pipeline
    pub resolve_transforms: bool,
}

impl Step {
    /// A mapping-driven step over every source document
    pub fn new(name: impl Into<String>, mapping: Mapping) -> Self {
        Self {
            name: name.into(),
            stage: DEFAULT_STAGE.to_string(),
            mapping,
            documents: None,
            resumable: true,
            reconcile_schema: false,
            resolve_transforms: true,
        }
    }

    /// An attribute-table step over a fixed document list
    pub fn attributes(name: impl Into<String>, mapping: Mapping, documents: Vec<String>) -> Self {
        Self {
            documents: Some(documents),
            resumable: false,
            reconcile_schema: true,
            resolve_transforms: false,
            ..Self::new(name, mapping)
        }
    }

    /// Build a step from project configuration
    pub fn from_config(config: &Config, step: &StepConfig) -> Result<Self> {
        Ok(Self {
            name: step.name.clone(),
            stage: step.stage.clone(),
            mapping: config.load_mapping(step)?,
            documents: config.load_group(step)?,
            resumable: step.is_resumable(),
            reconcile_schema: step.reconciles_schema(),
            resolve_transforms: step.resolves_transforms(),
        })
    }

    /// Override the stage
    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = stage.into();
        self
    }

    /// Documents this step visits, in order
    pub async fn documents(&self, source: &dyn Store) -> Result<Vec<String>> {
        match &self.documents {
            Some(documents) => Ok(documents.clone()),
            None => Ok(source.list_documents().await?),
        }
    }

    /// Undo the step. Written destination data is left as-is.
    pub fn rollback(&self) -> Result<()> {
        info!(step = %self.name, "Rollback requested; destination left unchanged");
        Ok(())
    }
}
