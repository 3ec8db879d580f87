//! Configuration parsing and validation
//!
//! This module handles loading and validating Ferry project files.
//!
//! # Configuration Files
//!
//! - `ferry.yaml` - Project root configuration (stores, progress, steps)
//! - `maps/*.yaml` - Document and field mapping files referenced by steps
//! - `maps/*groups*.yaml` - Document group files referenced by steps
//!
//! # Example
//!
//! ```yaml
//! name: m1-to-m2
//! source:      { type: file, path: ./source }
//! destination: { type: file, path: ./destination }
//! progress:    { type: file, path: .ferry/progress.json }
//! steps:
//!   - name: data
//!     kind: map
//!     map_file: maps/map.yaml
//!   - name: customer_attributes
//!     kind: attributes
//!     map_file: maps/customer_attr_map.yaml
//!     groups_file: maps/customer_attr_groups.yaml
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::groups::DocumentGroups;
use crate::mapping::Mapping;
use crate::progress::{DEFAULT_STAGE, ProgressConfig};
use crate::stores::StoreConfig;

/// Root project configuration from `ferry.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name
    pub name: String,

    /// Project version
    #[serde(default = "default_version")]
    pub version: String,

    /// Store records are read from
    pub source: StoreConfig,

    /// Store records are written to
    pub destination: StoreConfig,

    /// Where completed documents are recorded
    #[serde(default)]
    pub progress: ProgressConfig,

    /// Progress reporting granularity
    #[serde(default)]
    pub reporting: ReportingMode,

    /// Steps, run in declaration order
    #[serde(default)]
    pub steps: Vec<StepConfig>,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

/// What the progress reporter counts
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReportingMode {
    /// One tick per document of a step
    #[default]
    Documents,
    /// One tick per record of each document
    Records,
    /// No progress reporting
    Off,
}

/// Preset behaviour of a step
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    /// Mapping-driven copy of every source document; resumable, transforms resolved
    #[default]
    Map,
    /// Copy of grouped attribute tables; schema reconciled, single pass, direct copy
    Attributes,
}

/// A migration step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    /// Step name (unique within the project, keys progress)
    pub name: String,

    /// Behaviour preset
    #[serde(default)]
    pub kind: StepKind,

    /// Stage name used to namespace progress
    #[serde(default = "default_stage")]
    pub stage: String,

    /// Mapping file (identity mapping when absent)
    #[serde(default)]
    pub map_file: Option<String>,

    /// Groups file listing the documents to migrate
    #[serde(default)]
    pub groups_file: Option<String>,

    /// Group within `groups_file`
    #[serde(default)]
    pub group: Option<String>,

    /// Override: consult and update progress, clear destination documents first
    #[serde(default)]
    pub resumable: Option<bool>,

    /// Override: merge source columns into the destination table before copying
    #[serde(default)]
    pub reconcile_schema: Option<bool>,

    /// Override: decide between direct copy and the transform pipeline
    #[serde(default)]
    pub resolve_transforms: Option<bool>,
}

fn default_stage() -> String {
    DEFAULT_STAGE.to_string()
}

/// Group used by attribute steps when none is named
pub const DEFAULT_GROUP: &str = "source_documents";

impl StepConfig {
    /// Create a step of the given kind with preset behaviour
    pub fn new(name: impl Into<String>, kind: StepKind) -> Self {
        Self {
            name: name.into(),
            kind,
            stage: default_stage(),
            map_file: None,
            groups_file: None,
            group: None,
            resumable: None,
            reconcile_schema: None,
            resolve_transforms: None,
        }
    }

    /// Whether the step skips completed documents and records completion
    pub fn is_resumable(&self) -> bool {
        self.resumable.unwrap_or(self.kind == StepKind::Map)
    }

    /// Whether the step reconciles destination schema before copying
    pub fn reconciles_schema(&self) -> bool {
        self.reconcile_schema
            .unwrap_or(self.kind == StepKind::Attributes)
    }

    /// Whether the step may build transform pipelines
    pub fn resolves_transforms(&self) -> bool {
        self.resolve_transforms.unwrap_or(self.kind == StepKind::Map)
    }

    /// Group to read documents from, if the step is group-driven
    pub fn group_name(&self) -> Option<&str> {
        match (&self.group, self.kind) {
            (Some(group), _) => Some(group),
            (None, StepKind::Attributes) => Some(DEFAULT_GROUP),
            (None, StepKind::Map) => None,
        }
    }
}

/// Main configuration container
#[derive(Debug, Clone)]
pub struct Config {
    /// Project configuration
    pub project: ProjectConfig,

    /// Base path of the project
    pub base_path: PathBuf,
}

impl Config {
    /// Load configuration from a directory
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the project directory or ferry.yaml file
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let config = Config::load("./my-migration")?;
    /// println!("Project: {}", config.project.name);
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let (config_path, base_path) = if path.is_dir() {
            (path.join("ferry.yaml"), path.to_path_buf())
        } else {
            (
                path.to_path_buf(),
                path.parent().unwrap_or(Path::new(".")).to_path_buf(),
            )
        };

        if !config_path.exists() {
            return Err(Error::ConfigNotFound {
                path: config_path.display().to_string(),
            });
        }

        let contents = std::fs::read_to_string(&config_path)?;
        let project: ProjectConfig = serde_yaml::from_str(&contents)?;

        Ok(Self { project, base_path })
    }

    /// Resolve a project-relative path
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.base_path.join(p)
        }
    }

    /// Look up a step by name
    pub fn step(&self, name: &str) -> Option<&StepConfig> {
        self.project.steps.iter().find(|s| s.name == name)
    }

    /// Load the mapping of a step
    pub fn load_mapping(&self, step: &StepConfig) -> Result<Mapping> {
        match &step.map_file {
            Some(file) => Mapping::load(self.resolve_path(file)),
            None => Ok(Mapping::identity()),
        }
    }

    /// Documents listed by the step's group, `None` for store-listed steps
    pub fn load_group(&self, step: &StepConfig) -> Result<Option<Vec<String>>> {
        let Some(group) = step.group_name() else {
            return Ok(None);
        };
        let file = step.groups_file.as_ref().ok_or_else(|| Error::ConfigInvalid {
            message: format!("step '{}' uses group '{}' but has no groups_file", step.name, group),
        })?;
        let groups = DocumentGroups::load(self.resolve_path(file))?;
        let documents = groups.group(group).ok_or_else(|| Error::ConfigInvalid {
            message: format!(
                "group '{}' not found in {} (available: {})",
                group,
                file,
                groups.names().collect::<Vec<_>>().join(", ")
            ),
        })?;
        Ok(Some(documents.to_vec()))
    }

    /// Check the project for problems that would only surface mid-run
    pub fn validate(&self) -> Result<()> {
        for (role, store) in [
            ("source", &self.project.source),
            ("destination", &self.project.destination),
        ] {
            if store.page_size() == 0 {
                return Err(Error::ConfigInvalid {
                    message: format!("{} page_size must be greater than zero", role),
                });
            }
        }

        let mut seen = HashSet::new();
        for step in &self.project.steps {
            if step.name.trim().is_empty() {
                return Err(Error::ConfigInvalid {
                    message: "step name must not be empty".to_string(),
                });
            }
            if !seen.insert(step.name.as_str()) {
                return Err(Error::ConfigInvalid {
                    message: format!("duplicate step name '{}'", step.name),
                });
            }
            self.load_mapping(step)?;
            self.load_group(step)?;
        }
        Ok(())
    }
}
