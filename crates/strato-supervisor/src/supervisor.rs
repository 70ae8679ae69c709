//! The reconciliation supervisor.
//!
//! The supervisor finds deployments pending work and effects the required
//! changes. Each polling cycle it queries the store for unlocked
//! deployments flagged pending work and supervises each one
//! independently: lock, re-fetch and guard, transition, persist, record
//! outcome, unlock.
//!
//! ## Optimistic concurrency protocol
//!
//! Record updates carry no transactional token. Instead the supervisor
//! re-fetches and compares state twice per cycle:
//!
//! 1. After acquiring the lock, against the state seen by the discovery
//!    query. The discovery snapshot predates the lock, so another worker
//!    may have advanced the deployment in between.
//! 2. Immediately before persisting, against the state the transition
//!    handler was given. The handler is a slow backend call, and an
//!    out-of-band mutation (e.g. an administrative edit) may land while
//!    it runs despite the lock discipline.
//!
//! Either mismatch aborts the cycle without writing. A reimplementation
//! on a store with real transactions may collapse this to a single
//! conditional update, provided the abort-if-changed semantics hold.
//!
//! ## Error posture
//!
//! Nothing inside the loop is fatal. Backend failures leave state
//! unchanged so the next cycle retries; lock contention and stale reads
//! are silent skips; a deployment whose referenced cluster or workload
//! definition has vanished is driven to its permanent failure state.

use std::sync::Arc;

use async_trait::async_trait;

use crate::backup::BackupFilter;
use crate::cluster::{Cluster, WorkloadDefinition};
use crate::deployment::{Deployment, DeploymentState};
use crate::error::Result;
use crate::event::EventSink;
use crate::lock::DeploymentLock;
use crate::metrics::{MetricsSink, SupervisorMetrics};
use crate::outcome::OutcomeRecorder;
use crate::provision::{Provisioner, ProvisionerRegistry};
use crate::scheduler::Doer;
use crate::store::Store;

/// Finds deployments pending work and effects the required changes.
///
/// Multiple supervisor processes may run concurrently against the same
/// store with no coordination beyond the per-deployment lock fields.
pub struct DeploymentSupervisor {
    store: Arc<dyn Store>,
    provisioners: ProvisionerRegistry,
    recorder: OutcomeRecorder,
    instance_id: String,
    metrics: SupervisorMetrics,
}

impl DeploymentSupervisor {
    /// Creates a new deployment supervisor.
    ///
    /// All collaborators are injected; the supervisor holds no globals,
    /// so tests can substitute fake sinks and stores.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        provisioners: ProvisionerRegistry,
        event_sink: Arc<dyn EventSink>,
        metrics_sink: Arc<dyn MetricsSink>,
        instance_id: impl Into<String>,
    ) -> Self {
        let recorder = OutcomeRecorder::new(store.clone(), metrics_sink, event_sink);
        Self {
            store,
            provisioners,
            recorder,
            instance_id: instance_id.into(),
            metrics: SupervisorMetrics::new(),
        }
    }

    /// Performs graceful shutdown tasks for the supervisor.
    pub fn shutdown(&self) {
        tracing::debug!(instance = %self.instance_id, "Shutting down deployment supervisor");
    }

    /// Schedules the required work on the given deployment.
    ///
    /// `deployment` is the snapshot returned by the discovery query; the
    /// authoritative record is re-fetched under the lock.
    #[tracing::instrument(
        skip(self, deployment),
        fields(
            deployment = %deployment.id,
            workload = %deployment.workload_id,
            instance = %self.instance_id,
        )
    )]
    pub async fn supervise(&self, deployment: &Deployment) {
        let original_state = deployment.state;

        let lock = DeploymentLock::new(deployment.id, &self.instance_id, self.store.as_ref());
        if !lock.try_lock().await {
            return;
        }

        // Everything between lock and unlock lives in supervise_locked so
        // every early return still releases the lock.
        self.supervise_locked(deployment, original_state).await;

        lock.unlock().await;
    }

    async fn supervise_locked(&self, discovered: &Deployment, original_state: DeploymentState) {
        // Before working on the deployment, ensure it was not advanced to
        // a new state by another worker after the discovery query ran.
        let deployment = match self.store.get_deployment(&discovered.id).await {
            Ok(Some(deployment)) => deployment,
            Ok(None) => {
                tracing::warn!("Deployment disappeared before work could begin");
                return;
            }
            Err(error) => {
                tracing::error!(%error, "Failed to get refreshed deployment");
                return;
            }
        };
        if deployment.state != original_state {
            tracing::warn!(
                old_state = %original_state,
                new_state = %deployment.state,
                "Another worker has already worked on this deployment; skipping"
            );
            return;
        }

        tracing::debug!(state = %deployment.state, "Supervising deployment");

        let new_state = self.transition(&deployment).await;

        // Re-fetch immediately before persisting: the transition handler
        // is a slow backend call, and the state may have been mutated
        // out-of-band while it ran.
        let mut current = match self.store.get_deployment(&deployment.id).await {
            Ok(Some(current)) => current,
            Ok(None) => {
                tracing::warn!(
                    state = %new_state,
                    "Deployment disappeared; not persisting state"
                );
                return;
            }
            Err(error) => {
                tracing::warn!(%error, state = %new_state, "Failed to re-fetch deployment; not persisting state");
                return;
            }
        };
        if current.state != deployment.state {
            tracing::warn!(
                expected_state = %deployment.state,
                actual_state = %current.state,
                "Deployment state changed during transition; discarding result"
            );
            return;
        }

        if current.state == new_state {
            return;
        }

        let old_state = current.state;
        current.state = new_state;
        if let Err(error) = self.store.update_deployment(&current).await {
            tracing::error!(%error, state = %new_state, "Failed to set deployment state");
            return;
        }

        self.metrics.record_transition(old_state, new_state);
        self.recorder.record(&current, old_state).await;

        tracing::debug!(
            old_state = %old_state,
            new_state = %new_state,
            "Transitioned deployment"
        );
    }

    /// Computes the deployment's next state by dispatching to the handler
    /// for its current state.
    ///
    /// Returning the current state means "no progress; retry next cycle".
    async fn transition(&self, deployment: &Deployment) -> DeploymentState {
        let cluster = match self.store.get_cluster(&deployment.cluster_id).await {
            Ok(Some(cluster)) => cluster,
            Ok(None) => {
                // A dangling reference cannot heal; fail rather than retry
                // forever.
                tracing::error!(cluster = %deployment.cluster_id, "Failed to find cluster");
                return deployment.state.failed();
            }
            Err(error) => {
                tracing::warn!(cluster = %deployment.cluster_id, %error, "Failed to query cluster");
                return deployment.state;
            }
        };

        let workload = match self.store.get_workload(&deployment.workload_id).await {
            Ok(Some(workload)) => workload,
            Ok(None) => {
                tracing::error!(workload = %deployment.workload_id, "Failed to find workload definition");
                return deployment.state.failed();
            }
            Err(error) => {
                tracing::warn!(workload = %deployment.workload_id, %error, "Failed to query workload definition");
                return deployment.state;
            }
        };

        let provisioner = match self.provisioners.get(&workload.provisioner_version) {
            Ok(provisioner) => provisioner,
            Err(error) => {
                tracing::error!(
                    version = %workload.provisioner_version,
                    %error,
                    "Refusing to work on deployment with unregistered provisioner version"
                );
                self.metrics
                    .record_unknown_provisioner_version(&workload.provisioner_version);
                return deployment.state;
            }
        };

        match deployment.state {
            DeploymentState::CreationRequested => {
                self.create_deployment(deployment, &cluster, &workload, provisioner.as_ref())
                    .await
            }
            DeploymentState::Reconciling => {
                self.check_reconciling_deployment(deployment, &cluster, &workload, provisioner.as_ref())
                    .await
            }
            DeploymentState::DeletionRequested => {
                self.delete_deployment(deployment, &cluster, &workload, provisioner.as_ref())
                    .await
            }
            state => {
                tracing::warn!(%state, "Found deployment pending work in unexpected state");
                state
            }
        }
    }

    async fn create_deployment(
        &self,
        deployment: &Deployment,
        cluster: &Cluster,
        workload: &WorkloadDefinition,
        provisioner: &dyn Provisioner,
    ) -> DeploymentState {
        if let Err(error) = provisioner
            .prepare_shared_utilities(cluster, workload, deployment)
            .await
        {
            tracing::error!(%error, "Failed to prepare shared cluster utilities");
            return DeploymentState::CreationRequested;
        }

        if let Err(error) = provisioner.create(cluster, workload, deployment).await {
            tracing::error!(%error, "Failed to provision deployment");
            return DeploymentState::CreationRequested;
        }

        if let Err(error) = self.store.update_deployment(deployment).await {
            tracing::error!(%error, "Failed to record updated deployment after provisioning");
            return DeploymentState::CreationFailed;
        }

        tracing::info!("Finished creating deployment");
        DeploymentState::Reconciling
    }

    async fn check_reconciling_deployment(
        &self,
        deployment: &Deployment,
        cluster: &Cluster,
        workload: &WorkloadDefinition,
        provisioner: &dyn Provisioner,
    ) -> DeploymentState {
        let ready = match provisioner.is_ready(cluster, workload, deployment).await {
            Ok(ready) => ready,
            Err(error) => {
                tracing::error!(%error, "Failed to probe deployment readiness");
                return DeploymentState::Reconciling;
            }
        };
        if !ready {
            tracing::info!("Deployment is still reconciling");
            return DeploymentState::Reconciling;
        }

        if let Err(error) = provisioner
            .cleanup_stale_artifacts(cluster, workload, deployment)
            .await
        {
            tracing::error!(%error, "Failed to clean up stale provisioning artifacts");
            return DeploymentState::Reconciling;
        }

        tracing::info!("Deployment finished reconciling");
        DeploymentState::Stable
    }

    async fn delete_deployment(
        &self,
        deployment: &Deployment,
        cluster: &Cluster,
        workload: &WorkloadDefinition,
        provisioner: &dyn Provisioner,
    ) -> DeploymentState {
        let filter = BackupFilter::running_for(deployment.id);
        let backups = match self.store.get_backups(&filter).await {
            Ok(backups) => backups,
            Err(error) => {
                tracing::error!(%error, "Failed to get backups running against deployment");
                return deployment.state;
            }
        };
        if !backups.is_empty() {
            tracing::warn!(
                running = backups.len(),
                "Cannot delete deployment while backups are running against it"
            );
            return deployment.state;
        }

        if let Err(error) = provisioner.delete(cluster, workload, deployment).await {
            tracing::error!(%error, "Failed to delete deployment");
            return DeploymentState::DeletionRequested;
        }

        if let Err(error) = self.store.delete_deployment(&deployment.id).await {
            tracing::error!(%error, "Failed to record deleted deployment after teardown");
            return DeploymentState::DeletionFailed;
        }

        tracing::info!("Finished deleting deployment");
        DeploymentState::Deleted
    }
}

#[async_trait]
impl Doer for DeploymentSupervisor {
    /// Looks for work on any pending deployments and supervises each one.
    ///
    /// A discovery query failure is logged and swallowed; errors on one
    /// deployment never abort processing of the others.
    async fn do_work(&self) -> Result<()> {
        let deployments = match self.store.get_unlocked_deployments_pending_work().await {
            Ok(deployments) => deployments,
            Err(error) => {
                tracing::warn!(%error, "Failed to query for deployments pending work");
                return Ok(());
            }
        };

        for deployment in &deployments {
            self.supervise(deployment).await;
        }

        Ok(())
    }
}
