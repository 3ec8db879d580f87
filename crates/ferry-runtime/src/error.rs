//! Runtime error types

use thiserror::Error;

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while running steps
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration, store, mapping, transform or progress failure
    #[error(transparent)]
    Core(#[from] ferry_core::Error),

    /// Cancellation was requested; the step stopped at a document boundary
    #[error("step '{step}' cancelled")]
    Cancelled {
        /// Step that was running
        step: String,
    },

    /// A step named on the command line does not exist
    #[error("step '{name}' is not defined")]
    StepNotFound {
        /// Requested step name
        name: String,
    },

    /// PostgreSQL progress backend failure
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
