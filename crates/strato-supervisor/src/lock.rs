//! Per-deployment exclusive lease.
//!
//! The lock serializes access to one deployment across worker instances.
//! It is backed entirely by the store's atomic conditional writes: many
//! workers may race [`DeploymentLock::try_lock`] for the same deployment
//! and exactly one wins. Losing the race is not an error; the loser skips
//! the deployment for this polling cycle.
//!
//! The lease is not time-boxed. A worker that crashes while holding a
//! lock leaves it held until an operator clears it with a forced unlock
//! (`Store::unlock_deployment` with `force = true`); the supervisor never
//! forces. Release is explicit on every normal exit path of a supervise
//! call rather than hidden in a destructor, because release is an async
//! store write whose failure should be logged, not swallowed by a drop.

use strato_core::DeploymentId;

use crate::store::Store;

/// An exclusive lease on one deployment, held by one worker instance.
pub struct DeploymentLock<'a> {
    deployment_id: DeploymentId,
    owner_id: &'a str,
    store: &'a dyn Store,
}

impl<'a> DeploymentLock<'a> {
    /// Creates a lock handle for the given deployment and owner.
    ///
    /// Creating the handle does not acquire anything; call
    /// [`try_lock`](Self::try_lock).
    #[must_use]
    pub fn new(deployment_id: DeploymentId, owner_id: &'a str, store: &'a dyn Store) -> Self {
        Self {
            deployment_id,
            owner_id,
            store,
        }
    }

    /// Attempts to acquire the lock.
    ///
    /// Returns `false` both on contention (another worker already holds
    /// the lock) and on storage failure; either way the caller skips the
    /// deployment this cycle. Storage failures are logged at warn level.
    pub async fn try_lock(&self) -> bool {
        match self
            .store
            .try_lock_deployment(&self.deployment_id, self.owner_id)
            .await
        {
            Ok(acquired) => {
                if acquired {
                    tracing::debug!(
                        deployment = %self.deployment_id,
                        owner = self.owner_id,
                        "Acquired deployment lock"
                    );
                }
                acquired
            }
            Err(error) => {
                tracing::warn!(
                    deployment = %self.deployment_id,
                    %error,
                    "Failed to attempt deployment lock acquisition"
                );
                false
            }
        }
    }

    /// Releases the lock.
    ///
    /// Failures are logged at error level and not propagated: the caller
    /// has already finished its work, and a stuck lock is recovered
    /// administratively.
    pub async fn unlock(&self) {
        match self
            .store
            .unlock_deployment(&self.deployment_id, self.owner_id, false)
            .await
        {
            Ok(true) => {
                tracing::debug!(
                    deployment = %self.deployment_id,
                    owner = self.owner_id,
                    "Released deployment lock"
                );
            }
            Ok(false) => {
                tracing::error!(
                    deployment = %self.deployment_id,
                    owner = self.owner_id,
                    "Deployment lock was not held by this owner at release"
                );
            }
            Err(error) => {
                tracing::error!(
                    deployment = %self.deployment_id,
                    %error,
                    "Failed to release deployment lock"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deployment::Deployment;
    use crate::error::Result;
    use crate::store::memory::InMemoryStore;
    use strato_core::{ClusterId, WorkloadId};

    #[tokio::test]
    async fn second_owner_loses_the_race() -> Result<()> {
        let store = InMemoryStore::new();
        let deployment = Deployment::new(ClusterId::generate(), WorkloadId::generate());
        store.save_deployment(&deployment)?;

        let first = DeploymentLock::new(deployment.id, "worker-1", &store);
        let second = DeploymentLock::new(deployment.id, "worker-2", &store);

        assert!(first.try_lock().await);
        assert!(!second.try_lock().await);

        first.unlock().await;
        assert!(second.try_lock().await);
        Ok(())
    }

    #[tokio::test]
    async fn unlock_by_non_holder_leaves_lock_intact() -> Result<()> {
        let store = InMemoryStore::new();
        let deployment = Deployment::new(ClusterId::generate(), WorkloadId::generate());
        store.save_deployment(&deployment)?;

        let holder = DeploymentLock::new(deployment.id, "worker-1", &store);
        let interloper = DeploymentLock::new(deployment.id, "worker-2", &store);

        assert!(holder.try_lock().await);
        interloper.unlock().await;

        let current = store.get_deployment(&deployment.id).await?.unwrap();
        assert_eq!(current.lock_acquired_by.as_deref(), Some("worker-1"));
        Ok(())
    }

    #[tokio::test]
    async fn missing_deployment_cannot_be_locked() {
        let store = InMemoryStore::new();
        let lock = DeploymentLock::new(DeploymentId::generate(), "worker-1", &store);
        assert!(!lock.try_lock().await);
    }
}
