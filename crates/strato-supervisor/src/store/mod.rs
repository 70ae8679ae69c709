//! Pluggable storage for reconciliation state.
//!
//! The [`Store`] trait defines the persistence collaborator the supervisor
//! drives. It is the sole coordination point between worker processes:
//! there is no inter-process messaging, only the atomic conditional lock
//! writes and the re-fetch/compare discipline layered on top of plain
//! record updates.
//!
//! ## Design Principles
//!
//! - **Atomic lock writes**: lock acquisition is a conditional write that
//!   succeeds for exactly one racing owner
//! - **No optimistic-lock token**: record updates are full replacements;
//!   the supervisor's double re-fetch protocol supplies the
//!   "abort if state changed underneath us" semantics
//! - **Testability**: in-memory implementation for tests, a relational
//!   store in production

pub mod memory;

use async_trait::async_trait;

use strato_core::{ClusterId, DeploymentId, WorkloadId};

use crate::backup::{Backup, BackupFilter};
use crate::cluster::{Cluster, WorkloadDefinition};
use crate::deployment::Deployment;
use crate::error::Result;
use crate::event::{StateChangeEvent, StateChangeEventFilter};

/// Storage abstraction for reconciliation state.
///
/// Implementations must provide:
/// - Atomic conditional lock acquire/release keyed by deployment id and
///   owner identity (the store's atomicity is the lock guarantee; the
///   supervisor adds no in-process mutual exclusion)
/// - Point reads of deployments and their related entities
/// - The discovery view of unlocked deployments flagged pending work
/// - Append and most-recent-first query of state change events
///
/// ## Thread Safety
///
/// All methods are `Send + Sync` to support concurrent supervision of
/// distinct deployments.
#[async_trait]
pub trait Store: Send + Sync {
    // --- Deployment operations ---

    /// Gets a deployment by ID.
    ///
    /// Returns `None` if the deployment does not exist. Removed rows stay
    /// readable (with `deleted_at` set) so a terminal state can still be
    /// persisted after row removal.
    async fn get_deployment(&self, id: &DeploymentId) -> Result<Option<Deployment>>;

    /// Gets all unlocked deployments flagged as pending work.
    ///
    /// Locked deployments are filtered out by the query itself, not
    /// polled-and-skipped by the caller.
    async fn get_unlocked_deployments_pending_work(&self) -> Result<Vec<Deployment>>;

    /// Updates a deployment's full record, including its state.
    ///
    /// This is a plain replacement with no built-in optimistic-lock token;
    /// callers are expected to follow the re-fetch-and-compare protocol.
    async fn update_deployment(&self, deployment: &Deployment) -> Result<()>;

    /// Removes a deployment's row.
    ///
    /// The row is marked removed rather than physically dropped so the
    /// terminal `Deleted` state can still be written afterwards.
    async fn delete_deployment(&self, id: &DeploymentId) -> Result<()>;

    // --- Locking (atomic conditional writes) ---

    /// Atomically sets the lock fields to `owner_id` iff the deployment is
    /// currently unlocked.
    ///
    /// Returns `false` without side effects when another owner holds the
    /// lock. Multiple workers may race this call; exactly one wins.
    async fn try_lock_deployment(&self, id: &DeploymentId, owner_id: &str) -> Result<bool>;

    /// Clears the lock fields if `owner_id` matches the current holder, or
    /// unconditionally if `force` is set.
    ///
    /// `force` is for administrative recovery of locks held by crashed
    /// workers; the supervisor itself never forces. Returns whether the
    /// lock was cleared.
    async fn unlock_deployment(&self, id: &DeploymentId, owner_id: &str, force: bool)
        -> Result<bool>;

    // --- Related entities (read-only snapshots) ---

    /// Gets a cluster by ID.
    async fn get_cluster(&self, id: &ClusterId) -> Result<Option<Cluster>>;

    /// Gets a workload definition by ID.
    async fn get_workload(&self, id: &WorkloadId) -> Result<Option<WorkloadDefinition>>;

    /// Gets backups matching the filter.
    ///
    /// The deletion handler uses this to find running backups that block
    /// teardown.
    async fn get_backups(&self, filter: &BackupFilter) -> Result<Vec<Backup>>;

    // --- State change events ---

    /// Appends an immutable state change event.
    async fn append_state_change_event(&self, event: StateChangeEvent) -> Result<()>;

    /// Gets state change events matching the filter, most recent first.
    async fn get_state_change_events(
        &self,
        filter: &StateChangeEventFilter,
    ) -> Result<Vec<StateChangeEvent>>;
}
