//! Ferry Runtime
//!
//! This crate executes Ferry migration steps.
//!
//! # Features
//!
//! - Paginated, resumable step execution
//! - Direct copy vs. transform pipeline decision per document
//! - Destination schema reconciliation for attribute tables
//! - PostgreSQL progress backend
//!
//! # Usage
//!
//! ```rust,ignore
//! use ferry_runtime::Runtime;
//!
//! let runtime = Runtime::new(config).await?;
//! let (_cancel_tx, cancel_rx) = tokio::sync::watch::channel(false);
//! let reports = runtime.run(None, None, cancel_rx).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod decision;
pub mod engine;
pub mod error;
pub mod executor;
pub mod pg_progress;
pub mod reconcile;
pub mod reporter;
pub mod steps;

pub use decision::{CopyMode, can_direct_copy};
pub use engine::Runtime;
pub use error::{Error, Result};
pub use executor::{PlannedAction, PlannedDocument, StepExecutor, StepReport};
pub use steps::Step;
