//! Progress tracking for resumable steps
//!
//! Progress is a durable set of fully migrated document names, keyed by
//! (step, stage). A document is only ever added after all of its pages have
//! been written; nothing is removed by the engine.
//!
//! Backends:
//!
//! - [`MemoryProgress`] - in-process, for tests and dry runs
//! - [`FileProgress`] - JSON file rewritten atomically on every addition
//! - PostgreSQL - `PgProgress` in `ferry-runtime`

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Error, Result};

/// Stage used when a step does not name one
pub const DEFAULT_STAGE: &str = "run";

/// Trait for progress persistence backends
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Documents already completed for (step, stage)
    async fn processed_entities(&self, step: &str, stage: &str) -> Result<BTreeSet<String>>;

    /// Record a completed document. Must be durable when this returns.
    async fn add_processed_entity(&self, step: &str, stage: &str, document: &str) -> Result<()>;

    /// Backend name for logging
    fn backend_type(&self) -> &'static str;
}

/// Progress backend configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressConfig {
    /// Keep progress in memory only (not resumable across processes)
    Memory,

    /// JSON file
    File {
        /// Path to the progress file
        #[serde(default = "default_progress_path")]
        path: String,
    },

    /// PostgreSQL table
    Postgres {
        /// Connection URL
        url: String,
        /// Schema holding the progress table
        #[serde(default = "default_pg_schema")]
        schema: String,
    },
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self::File {
            path: default_progress_path(),
        }
    }
}

fn default_progress_path() -> String {
    ".ferry/progress.json".to_string()
}

fn default_pg_schema() -> String {
    "ferry".to_string()
}

impl ProgressConfig {
    /// Path of the progress file for file-backed configurations
    pub fn file_path(&self, base_path: &Path) -> Option<PathBuf> {
        let path = match self {
            Self::File { path } => path.clone(),
            Self::Memory | Self::Postgres { .. } => return None,
        };
        let path = PathBuf::from(path);
        Some(if path.is_absolute() {
            path
        } else {
            base_path.join(path)
        })
    }
}

// ============================================================================
// Memory
// ============================================================================

/// In-memory progress store
#[derive(Debug, Default)]
pub struct MemoryProgress {
    entries: Mutex<BTreeMap<(String, String), BTreeSet<String>>>,
}

impl MemoryProgress {
    /// Create an empty progress store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProgressStore for MemoryProgress {
    async fn processed_entities(&self, step: &str, stage: &str) -> Result<BTreeSet<String>> {
        let entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        Ok(entries
            .get(&(step.to_string(), stage.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn add_processed_entity(&self, step: &str, stage: &str, document: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries
            .entry((step.to_string(), stage.to_string()))
            .or_default()
            .insert(document.to_string());
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}

// ============================================================================
// File
// ============================================================================

/// On-disk layout of the progress file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgressFile {
    /// step -> stage -> entry
    #[serde(default)]
    pub steps: BTreeMap<String, BTreeMap<String, StageProgress>>,
}

/// Completed documents of one (step, stage)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageProgress {
    /// Completed document names
    pub documents: BTreeSet<String>,

    /// Last time a document was added
    pub updated_at: DateTime<Utc>,
}

/// Progress store backed by a JSON file
#[derive(Debug)]
pub struct FileProgress {
    path: PathBuf,
    state: Mutex<ProgressFile>,
}

impl FileProgress {
    /// Open (or start) a progress file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_json::from_str(&contents).map_err(|e| Error::Progress {
                message: format!("corrupt progress file {}: {}", path.display(), e),
            })?
        } else {
            ProgressFile::default()
        };
        tracing::debug!("Opened progress file {}", path.display());
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Path of the progress file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of everything recorded
    pub fn snapshot(&self) -> ProgressFile {
        self.state.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn persist(&self, state: &ProgressFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(state)?;

        // Atomic write: write to temp file, then rename
        let temp_path = self.path.with_extension("tmp");
        let mut file = std::fs::File::create(&temp_path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        std::fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

#[async_trait]
impl ProgressStore for FileProgress {
    async fn processed_entities(&self, step: &str, stage: &str) -> Result<BTreeSet<String>> {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        Ok(state
            .steps
            .get(step)
            .and_then(|stages| stages.get(stage))
            .map(|entry| entry.documents.clone())
            .unwrap_or_default())
    }

    async fn add_processed_entity(&self, step: &str, stage: &str, document: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        let mut next = state.clone();
        let entry = next
            .steps
            .entry(step.to_string())
            .or_default()
            .entry(stage.to_string())
            .or_insert_with(|| StageProgress {
                documents: BTreeSet::new(),
                updated_at: Utc::now(),
            });
        entry.documents.insert(document.to_string());
        entry.updated_at = Utc::now();

        self.persist(&next).map_err(|e| Error::Progress {
            message: format!("failed to write {}: {}", self.path.display(), e),
        })?;
        *state = next;
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "file"
    }
}
