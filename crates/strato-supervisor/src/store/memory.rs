//! In-memory store implementation for testing.
//!
//! This module provides [`InMemoryStore`], a simple in-memory
//! implementation of the [`Store`] trait suitable for testing and
//! development.
//!
//! ## Limitations
//!
//! - **NOT suitable for production**: No durability, no cross-process
//!   coordination
//! - **Single-process only**: The lock CAS is enforced under an in-process
//!   `RwLock`, which models but does not replace a linearizable store

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::Utc;

use strato_core::{ClusterId, DeploymentId, WorkloadId};

use super::Store;
use crate::backup::{Backup, BackupFilter};
use crate::cluster::{Cluster, WorkloadDefinition};
use crate::deployment::Deployment;
use crate::error::{Error, Result};
use crate::event::{StateChangeEvent, StateChangeEventFilter};

/// In-memory store for testing.
///
/// Provides a thread-safe implementation of the [`Store`] trait using
/// `RwLock` for synchronization. Lock acquisition performs its
/// compare-and-set under the write lock, so racing `try_lock_deployment`
/// calls resolve to exactly one winner.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    deployments: RwLock<HashMap<DeploymentId, Deployment>>,
    clusters: RwLock<HashMap<ClusterId, Cluster>>,
    workloads: RwLock<HashMap<WorkloadId, WorkloadDefinition>>,
    backups: RwLock<Vec<Backup>>,
    events: RwLock<Vec<StateChangeEvent>>,
}

/// Converts a lock poison error to a storage error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("lock poisoned")
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a deployment record.
    ///
    /// Test seeding helper; production records arrive through the API
    /// surface that owns deployment creation.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn save_deployment(&self, deployment: &Deployment) -> Result<()> {
        let mut deployments = self.deployments.write().map_err(poison_err)?;
        deployments.insert(deployment.id, deployment.clone());
        Ok(())
    }

    /// Inserts or replaces a cluster record.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn save_cluster(&self, cluster: &Cluster) -> Result<()> {
        let mut clusters = self.clusters.write().map_err(poison_err)?;
        clusters.insert(cluster.id, cluster.clone());
        Ok(())
    }

    /// Inserts or replaces a workload definition record.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn save_workload(&self, workload: &WorkloadDefinition) -> Result<()> {
        let mut workloads = self.workloads.write().map_err(poison_err)?;
        workloads.insert(workload.id, workload.clone());
        Ok(())
    }

    /// Appends a backup record.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn save_backup(&self, backup: &Backup) -> Result<()> {
        let mut backups = self.backups.write().map_err(poison_err)?;
        backups.retain(|b| b.id != backup.id);
        backups.push(backup.clone());
        Ok(())
    }

    /// Returns the number of state change events currently stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn event_count(&self) -> Result<usize> {
        let events = self.events.read().map_err(poison_err)?;
        Ok(events.len())
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get_deployment(&self, id: &DeploymentId) -> Result<Option<Deployment>> {
        let result = {
            let deployments = self.deployments.read().map_err(poison_err)?;
            deployments.get(id).cloned()
        };
        Ok(result)
    }

    async fn get_unlocked_deployments_pending_work(&self) -> Result<Vec<Deployment>> {
        let mut pending = {
            let deployments = self.deployments.read().map_err(poison_err)?;
            deployments
                .values()
                .filter(|d| !d.is_locked() && d.pending_work() && d.deleted_at.is_none())
                .cloned()
                .collect::<Vec<_>>()
        };
        // Deterministic sweep order for tests and log readability.
        pending.sort_by_key(|d| d.id);
        Ok(pending)
    }

    async fn update_deployment(&self, deployment: &Deployment) -> Result<()> {
        let mut deployments = self.deployments.write().map_err(poison_err)?;
        deployments.insert(deployment.id, deployment.clone());
        Ok(())
    }

    async fn delete_deployment(&self, id: &DeploymentId) -> Result<()> {
        let mut deployments = self.deployments.write().map_err(poison_err)?;
        let Some(deployment) = deployments.get_mut(id) else {
            return Err(Error::storage(format!("deployment {id} not found")));
        };
        deployment.deleted_at = Some(Utc::now());
        Ok(())
    }

    async fn try_lock_deployment(&self, id: &DeploymentId, owner_id: &str) -> Result<bool> {
        let mut deployments = self.deployments.write().map_err(poison_err)?;
        let Some(deployment) = deployments.get_mut(id) else {
            return Ok(false);
        };

        if deployment.lock_acquired_by.is_some() {
            return Ok(false);
        }

        deployment.lock_acquired_by = Some(owner_id.to_string());
        deployment.lock_acquired_at = Some(Utc::now());
        Ok(true)
    }

    async fn unlock_deployment(
        &self,
        id: &DeploymentId,
        owner_id: &str,
        force: bool,
    ) -> Result<bool> {
        let mut deployments = self.deployments.write().map_err(poison_err)?;
        let Some(deployment) = deployments.get_mut(id) else {
            return Ok(false);
        };

        let owned = deployment.lock_acquired_by.as_deref() == Some(owner_id);
        if !owned && !force {
            return Ok(false);
        }

        deployment.lock_acquired_by = None;
        deployment.lock_acquired_at = None;
        Ok(true)
    }

    async fn get_cluster(&self, id: &ClusterId) -> Result<Option<Cluster>> {
        let result = {
            let clusters = self.clusters.read().map_err(poison_err)?;
            clusters.get(id).cloned()
        };
        Ok(result)
    }

    async fn get_workload(&self, id: &WorkloadId) -> Result<Option<WorkloadDefinition>> {
        let result = {
            let workloads = self.workloads.read().map_err(poison_err)?;
            workloads.get(id).cloned()
        };
        Ok(result)
    }

    async fn get_backups(&self, filter: &BackupFilter) -> Result<Vec<Backup>> {
        let result = {
            let backups = self.backups.read().map_err(poison_err)?;
            backups
                .iter()
                .filter(|b| b.deployment_id == filter.deployment_id)
                .filter(|b| filter.states.is_empty() || filter.states.contains(&b.state))
                .cloned()
                .collect()
        };
        Ok(result)
    }

    async fn append_state_change_event(&self, event: StateChangeEvent) -> Result<()> {
        let mut events = self.events.write().map_err(poison_err)?;
        events.push(event);
        Ok(())
    }

    async fn get_state_change_events(
        &self,
        filter: &StateChangeEventFilter,
    ) -> Result<Vec<StateChangeEvent>> {
        let mut matching = {
            let events = self.events.read().map_err(poison_err)?;
            events
                .iter()
                .filter(|e| filter.resource_id.is_none_or(|id| e.resource_id == id))
                .filter(|e| filter.resource_kind.is_none_or(|k| e.resource_kind == k))
                .filter(|e| filter.new_states.is_empty() || filter.new_states.contains(&e.new_state))
                .cloned()
                .collect::<Vec<_>>()
        };

        // Most recent first; ULID event IDs break timestamp ties.
        matching.sort_by(|a, b| {
            b.occurred_at
                .cmp(&a.occurred_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        let start = filter.paging.page.saturating_mul(filter.paging.per_page);
        Ok(matching
            .into_iter()
            .skip(start)
            .take(filter.paging.per_page)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::BackupState;
    use crate::deployment::DeploymentState;
    use crate::event::{Paging, ResourceKind};

    fn seeded_deployment(store: &InMemoryStore) -> Result<Deployment> {
        let deployment = Deployment::new(ClusterId::generate(), WorkloadId::generate());
        store.save_deployment(&deployment)?;
        Ok(deployment)
    }

    #[tokio::test]
    async fn save_and_get_deployment() -> Result<()> {
        let store = InMemoryStore::new();
        let deployment = seeded_deployment(&store)?;

        let fetched = store.get_deployment(&deployment.id).await?;
        assert!(fetched.is_some_and(|d| d.id == deployment.id));

        assert!(store
            .get_deployment(&DeploymentId::generate())
            .await?
            .is_none());
        Ok(())
    }

    #[tokio::test]
    async fn lock_admits_exactly_one_owner() -> Result<()> {
        let store = InMemoryStore::new();
        let deployment = seeded_deployment(&store)?;

        assert!(store.try_lock_deployment(&deployment.id, "worker-1").await?);
        // A second owner is refused; so is a repeat acquisition by the holder.
        assert!(!store.try_lock_deployment(&deployment.id, "worker-2").await?);
        assert!(!store.try_lock_deployment(&deployment.id, "worker-1").await?);

        let locked = store.get_deployment(&deployment.id).await?.unwrap();
        assert_eq!(locked.lock_acquired_by.as_deref(), Some("worker-1"));
        assert!(locked.lock_acquired_at.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn unlock_requires_matching_owner_unless_forced() -> Result<()> {
        let store = InMemoryStore::new();
        let deployment = seeded_deployment(&store)?;

        assert!(store.try_lock_deployment(&deployment.id, "worker-1").await?);

        // Wrong owner, no force: refused.
        assert!(!store
            .unlock_deployment(&deployment.id, "worker-2", false)
            .await?);
        let still_locked = store.get_deployment(&deployment.id).await?.unwrap();
        assert!(still_locked.is_locked());

        // Wrong owner, forced: administrative recovery clears the lock.
        assert!(store
            .unlock_deployment(&deployment.id, "worker-2", true)
            .await?);
        let unlocked = store.get_deployment(&deployment.id).await?.unwrap();
        assert!(!unlocked.is_locked());
        assert!(unlocked.lock_acquired_at.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn pending_work_query_filters_locked_and_terminal() -> Result<()> {
        let store = InMemoryStore::new();

        let pending = seeded_deployment(&store)?;

        let mut locked = Deployment::new(ClusterId::generate(), WorkloadId::generate());
        locked.lock_acquired_by = Some("worker-9".into());
        locked.lock_acquired_at = Some(Utc::now());
        store.save_deployment(&locked)?;

        let mut stable = Deployment::new(ClusterId::generate(), WorkloadId::generate());
        stable.state = DeploymentState::Stable;
        store.save_deployment(&stable)?;

        let discovered = store.get_unlocked_deployments_pending_work().await?;
        assert_eq!(discovered.len(), 1);
        assert_eq!(discovered[0].id, pending.id);
        Ok(())
    }

    #[tokio::test]
    async fn delete_marks_row_removed_but_readable() -> Result<()> {
        let store = InMemoryStore::new();
        let deployment = seeded_deployment(&store)?;

        store.delete_deployment(&deployment.id).await?;

        let removed = store.get_deployment(&deployment.id).await?.unwrap();
        assert!(removed.deleted_at.is_some());

        // Removed rows no longer show up as pending work.
        assert!(store.get_unlocked_deployments_pending_work().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn delete_missing_deployment_is_an_error() {
        let store = InMemoryStore::new();
        let result = store.delete_deployment(&DeploymentId::generate()).await;
        assert!(matches!(result, Err(Error::Storage { .. })));
    }

    #[tokio::test]
    async fn backups_filter_by_deployment_and_state() -> Result<()> {
        let store = InMemoryStore::new();
        let deployment = seeded_deployment(&store)?;

        store.save_backup(&Backup::new(deployment.id, BackupState::InProgress))?;
        store.save_backup(&Backup::new(deployment.id, BackupState::Succeeded))?;
        store.save_backup(&Backup::new(DeploymentId::generate(), BackupState::Requested))?;

        let running = store
            .get_backups(&BackupFilter::running_for(deployment.id))
            .await?;
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].state, BackupState::InProgress);
        Ok(())
    }

    #[tokio::test]
    async fn events_query_is_most_recent_first_and_paged() -> Result<()> {
        let store = InMemoryStore::new();
        let deployment_id = DeploymentId::generate();

        store
            .append_state_change_event(StateChangeEvent::new(
                deployment_id,
                DeploymentState::CreationRequested,
                DeploymentState::Reconciling,
            ))
            .await?;
        store
            .append_state_change_event(StateChangeEvent::new(
                deployment_id,
                DeploymentState::Reconciling,
                DeploymentState::Stable,
            ))
            .await?;

        let all = store
            .get_state_change_events(&StateChangeEventFilter {
                resource_id: Some(deployment_id),
                resource_kind: Some(ResourceKind::Deployment),
                new_states: vec![],
                paging: Paging::default(),
            })
            .await?;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].new_state, DeploymentState::Stable);
        assert_eq!(all[1].new_state, DeploymentState::Reconciling);

        let first_page = store
            .get_state_change_events(&StateChangeEventFilter {
                resource_id: Some(deployment_id),
                resource_kind: None,
                new_states: vec![DeploymentState::Reconciling],
                paging: Paging::first(1),
            })
            .await?;
        assert_eq!(first_page.len(), 1);
        assert_eq!(first_page[0].new_state, DeploymentState::Reconciling);
        Ok(())
    }
}
