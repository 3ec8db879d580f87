//! Ferry Core Library
//!
//! This crate provides the building blocks of a Ferry migration:
//! - Configuration parsing and validation
//! - Documents, structures, and records
//! - Mapping rules (ignore, rename, field handlers)
//! - The per-document transform pipeline
//! - Store and progress traits with file and in-memory implementations
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Source    │────▶│  Transform  │────▶│ Destination │
//! │   Store     │     │  Pipeline   │     │    Store    │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                            ▲
//!                     ┌─────────────┐
//!                     │   Mapping   │
//!                     │   (YAML)    │
//!                     └─────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use ferry_core::Config;
//!
//! let config = Config::load("./ferry.yaml")?;
//! for step in &config.project.steps {
//!     println!("Step: {}", step.name);
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod document;
pub mod error;
pub mod groups;
pub mod mapping;
pub mod pipeline;
pub mod progress;
pub mod stores;
pub mod transforms;

pub use config::{Config, ProjectConfig, ReportingMode, StepConfig, StepKind};
pub use document::{Document, FieldDefinition, Record, Structure, TableDefinition};
pub use error::{Error, Result};
pub use mapping::{Direction, Mapping};
pub use pipeline::TransformPipeline;
pub use progress::{FileProgress, MemoryProgress, ProgressConfig, ProgressStore};
pub use stores::{FileStore, MemoryStore, Store, StoreConfig};
