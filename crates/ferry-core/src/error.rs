//! Error types for ferry-core

use thiserror::Error;

/// Result type alias for ferry-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in ferry-core
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file could not be found
    #[error("configuration file not found: {path}")]
    ConfigNotFound {
        /// Path that was searched
        path: String,
    },

    /// Failed to parse YAML configuration
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// Invalid configuration value
    #[error("invalid configuration: {message}")]
    ConfigInvalid {
        /// Description of what's invalid
        message: String,
    },

    /// Mapping file contains an unusable rule
    #[error("invalid mapping rule '{rule}': {message}")]
    Mapping {
        /// The offending rule as written in the mapping file
        rule: String,
        /// Description of the error
        message: String,
    },

    /// A store read, write or DDL call failed
    #[error("store '{store}' error: {message}")]
    Store {
        /// Name of the store (source or destination)
        store: String,
        /// Description of the error
        message: String,
    },

    /// Requested document does not exist in the store
    #[error("document '{document}' not found in store '{store}'")]
    DocumentNotFound {
        /// Name of the store
        store: String,
        /// Document name
        document: String,
    },

    /// A transform pipeline failed to convert a record
    #[error("transform error in '{document}': {message}")]
    Transform {
        /// Source document being transformed
        document: String,
        /// Description of the error
        message: String,
    },

    /// Progress persistence failed
    #[error("progress store error: {message}")]
    Progress {
        /// Description of the error
        message: String,
    },

    /// Template rendering error
    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a store error
    pub fn store(store: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Store {
            store: store.into(),
            message: message.into(),
        }
    }

    /// Create a transform error
    pub fn transform(document: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transform {
            document: document.into(),
            message: message.into(),
        }
    }
}
