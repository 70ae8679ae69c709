//! Error types and result aliases shared across Strato components.

use std::fmt;

/// The result type used throughout Strato.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in shared Strato operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An invalid identifier was provided.
    #[error("invalid identifier: {message}")]
    InvalidId {
        /// Description of what made the ID invalid.
        message: String,
    },

    /// A configuration value was missing or malformed.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// The requested entity was not found.
    #[error("not found: {entity} with id {id}")]
    NotFound {
        /// The type of entity that was not found.
        entity: &'static str,
        /// The identifier that was looked up.
        id: String,
    },
}

impl Error {
    /// Creates a new configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new not-found error.
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}
