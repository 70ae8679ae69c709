//! Error types for the reconciliation domain.

use strato_core::DeploymentId;

use crate::deployment::DeploymentState;

/// The result type used throughout strato-supervisor.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in reconciliation operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No provisioner is registered for the requested version.
    ///
    /// This is a configuration error: work is refused outright rather than
    /// silently skipped.
    #[error("no provisioner registered for version '{version}'")]
    UnknownProvisionerVersion {
        /// The version string that had no registered provisioner.
        version: String,
    },

    /// A provisioning backend call failed.
    #[error("provisioner error: {message}")]
    Provision {
        /// Description of the backend failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The event log did not contain exactly one anchor event for a
    /// duration metric.
    ///
    /// Zero candidates means the history is missing; more than one means
    /// the producer wrote duplicates. Either way the metric would be wrong,
    /// so nothing is recorded.
    #[error("expected exactly 1 anchor event with new state {anchor} for deployment {deployment_id}, but found {found}")]
    AnchorEventHistory {
        /// The deployment whose history was queried.
        deployment_id: DeploymentId,
        /// The start-marker state that was searched for.
        anchor: DeploymentState,
        /// How many candidate events were found.
        found: usize,
    },

    /// A storage operation failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An event publication failed.
    #[error("event publication error: {message}")]
    EventPublication {
        /// Description of the publication failure.
        message: String,
    },

    /// An error from strato-core.
    #[error("core error: {0}")]
    Core(#[from] strato_core::Error),
}

impl Error {
    /// Creates a new storage error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new storage error with a source.
    #[must_use]
    pub fn storage_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new provisioner error.
    #[must_use]
    pub fn provision(message: impl Into<String>) -> Self {
        Self::Provision {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new event publication error.
    #[must_use]
    pub fn event_publication(message: impl Into<String>) -> Self {
        Self::EventPublication {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_provisioner_version_display() {
        let err = Error::UnknownProvisionerVersion {
            version: "v3".into(),
        };
        assert!(err.to_string().contains("v3"));
        assert!(err.to_string().contains("no provisioner registered"));
    }

    #[test]
    fn anchor_event_history_display() {
        let err = Error::AnchorEventHistory {
            deployment_id: DeploymentId::generate(),
            anchor: DeploymentState::Reconciling,
            found: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains("RECONCILING"));
        assert!(msg.contains("found 2"));
    }

    #[test]
    fn storage_error_with_source() {
        use std::error::Error as StdError;

        let source = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "connection reset");
        let err = Error::storage_with_source("failed to update deployment", source);
        assert!(err.to_string().contains("storage error"));
        assert!(StdError::source(&err).is_some());
    }
}
