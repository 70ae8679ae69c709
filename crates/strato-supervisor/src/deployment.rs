//! Deployment records and the lifecycle state machine.
//!
//! A deployment is a single workload instance bound to a compute cluster.
//! It is created externally in a `*Requested` state, picked up by the
//! supervisor's discovery query, and driven through intermediate states
//! under a per-deployment lock until it reaches a terminal state.
//!
//! ## Locking
//!
//! The lock fields live on the record itself: a deployment is locked iff
//! `lock_acquired_by` is set, and work may only be performed by the worker
//! named there. Coordination happens entirely through atomic conditional
//! writes of these fields in the store; there is no in-process mutual
//! exclusion and no inter-worker messaging.
//!
//! ## Retry semantics
//!
//! Transition handlers never advance state on a backend failure. The only
//! durable side effect of a failed step is "state unchanged", so the next
//! polling cycle retries from the same state. There is no separate retry
//! scheduler; cadence is governed by the polling interval.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use strato_core::{ClusterId, DeploymentId, WorkloadId};

/// Deployment lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentState {
    /// Created externally, waiting for the supervisor to provision it.
    CreationRequested,
    /// Provisioned, waiting for the backend readiness probe.
    Reconciling,
    /// Provisioned and ready.
    Stable,
    /// Provisioning side effects could not be recorded; permanent failure.
    CreationFailed,
    /// Deletion requested, waiting for the supervisor to tear it down.
    DeletionRequested,
    /// Torn down and removed from the store.
    Deleted,
    /// Teardown could not be recorded; permanent failure.
    DeletionFailed,
}

impl DeploymentState {
    /// Returns true if the supervisor has work to do in this state.
    ///
    /// The discovery query only surfaces deployments in these states;
    /// everything else is terminal from the supervisor's point of view.
    #[must_use]
    pub const fn pending_work(&self) -> bool {
        matches!(
            self,
            Self::CreationRequested | Self::Reconciling | Self::DeletionRequested
        )
    }

    /// Returns true if this is a terminal state for the supervisor.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !self.pending_work()
    }

    /// Maps a `*Requested` state to its permanent-failure peer.
    ///
    /// Used when a referenced entity (cluster or workload definition) is
    /// missing: retrying cannot fix a dangling reference, so the deployment
    /// is driven to a failure state instead of being retried forever.
    /// States without a failure peer map to themselves.
    #[must_use]
    pub const fn failed(&self) -> Self {
        match self {
            Self::CreationRequested => Self::CreationFailed,
            Self::DeletionRequested => Self::DeletionFailed,
            _ => *self,
        }
    }
}

impl std::fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CreationRequested => write!(f, "CREATION_REQUESTED"),
            Self::Reconciling => write!(f, "RECONCILING"),
            Self::Stable => write!(f, "STABLE"),
            Self::CreationFailed => write!(f, "CREATION_FAILED"),
            Self::DeletionRequested => write!(f, "DELETION_REQUESTED"),
            Self::Deleted => write!(f, "DELETED"),
            Self::DeletionFailed => write!(f, "DELETION_FAILED"),
        }
    }
}

/// A workload instance bound to a compute cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    /// Unique deployment identifier.
    pub id: DeploymentId,
    /// The cluster this deployment runs on.
    pub cluster_id: ClusterId,
    /// The workload definition this deployment instantiates.
    pub workload_id: WorkloadId,
    /// Current lifecycle state.
    pub state: DeploymentState,
    /// Identity of the worker currently holding the lock, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_acquired_by: Option<String>,
    /// When the lock was acquired. Unset when unlocked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_acquired_at: Option<DateTime<Utc>>,
    /// When the deployment record was created.
    pub created_at: DateTime<Utc>,
    /// When the record was removed from the store. The row stays readable
    /// after removal so the terminal `Deleted` state can still be persisted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Deployment {
    /// Creates a new deployment in the `CreationRequested` state.
    #[must_use]
    pub fn new(cluster_id: ClusterId, workload_id: WorkloadId) -> Self {
        Self {
            id: DeploymentId::generate(),
            cluster_id,
            workload_id,
            state: DeploymentState::CreationRequested,
            lock_acquired_by: None,
            lock_acquired_at: None,
            created_at: Utc::now(),
            deleted_at: None,
        }
    }

    /// Returns true if a worker currently holds this deployment's lock.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.lock_acquired_by.is_some()
    }

    /// Returns true if the supervisor has work to do on this deployment.
    #[must_use]
    pub const fn pending_work(&self) -> bool {
        self.state.pending_work()
    }
}
