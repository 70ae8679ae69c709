//! Backups as blocking dependents of deployment deletion.
//!
//! A backup that is still running references the deployment's namespace
//! on the cluster, so deleting the deployment out from under it would
//! corrupt the backup. The deletion handler holds the deployment in
//! `DeletionRequested` until no running backups remain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use strato_core::{BackupId, DeploymentId};

/// Backup lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackupState {
    /// Requested but not yet started.
    Requested,
    /// Actively writing data.
    InProgress,
    /// Completed successfully.
    Succeeded,
    /// Failed.
    Failed,
}

impl BackupState {
    /// The states in which a backup blocks deletion of its deployment.
    #[must_use]
    pub const fn running_states() -> &'static [Self] {
        &[Self::Requested, Self::InProgress]
    }

    /// Returns true if this backup still blocks deployment deletion.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(self, Self::Requested | Self::InProgress)
    }
}

impl std::fmt::Display for BackupState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Requested => write!(f, "REQUESTED"),
            Self::InProgress => write!(f, "IN_PROGRESS"),
            Self::Succeeded => write!(f, "SUCCEEDED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// A backup of a deployment's data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backup {
    /// Unique backup identifier.
    pub id: BackupId,
    /// The deployment this backup references.
    pub deployment_id: DeploymentId,
    /// Current backup state.
    pub state: BackupState,
    /// When the backup was requested.
    pub requested_at: DateTime<Utc>,
}

impl Backup {
    /// Creates a new backup record in the given state.
    #[must_use]
    pub fn new(deployment_id: DeploymentId, state: BackupState) -> Self {
        Self {
            id: BackupId::generate(),
            deployment_id,
            state,
            requested_at: Utc::now(),
        }
    }
}

/// Filter for backup queries.
#[derive(Debug, Clone)]
pub struct BackupFilter {
    /// Only backups referencing this deployment.
    pub deployment_id: DeploymentId,
    /// Only backups in one of these states. Empty matches any state.
    pub states: Vec<BackupState>,
}

impl BackupFilter {
    /// Filter for backups that block deletion of the given deployment.
    #[must_use]
    pub fn running_for(deployment_id: DeploymentId) -> Self {
        Self {
            deployment_id,
            states: BackupState::running_states().to_vec(),
        }
    }
}
