//! End-to-end lifecycle tests for the deployment supervisor.
//!
//! These tests drive full supervise cycles against the in-memory store
//! with scripted provisioning backends, covering the complete
//! create → reconcile → stable and delete paths including derived
//! duration metrics and state change events.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use strato_supervisor::event::InMemoryEventSink;
use strato_supervisor::metrics::RecordingMetricsSink;
use strato_supervisor::prelude::*;

/// Scripted provisioner: readiness and failure toggles shared with the
/// test body.
#[derive(Default)]
struct ScriptedProvisioner {
    ready: AtomicBool,
    fail_create: AtomicBool,
    create_calls: AtomicUsize,
    delete_calls: AtomicUsize,
}

#[async_trait]
impl Provisioner for ScriptedProvisioner {
    async fn prepare_shared_utilities(
        &self,
        _cluster: &Cluster,
        _workload: &WorkloadDefinition,
        _deployment: &Deployment,
    ) -> Result<()> {
        Ok(())
    }

    async fn create(
        &self,
        _cluster: &Cluster,
        _workload: &WorkloadDefinition,
        _deployment: &Deployment,
    ) -> Result<()> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(Error::provision("create failed"));
        }
        Ok(())
    }

    async fn delete(
        &self,
        _cluster: &Cluster,
        _workload: &WorkloadDefinition,
        _deployment: &Deployment,
    ) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn is_ready(
        &self,
        _cluster: &Cluster,
        _workload: &WorkloadDefinition,
        _deployment: &Deployment,
    ) -> Result<bool> {
        Ok(self.ready.load(Ordering::SeqCst))
    }

    async fn cleanup_stale_artifacts(
        &self,
        _cluster: &Cluster,
        _workload: &WorkloadDefinition,
        _deployment: &Deployment,
    ) -> Result<()> {
        Ok(())
    }
}

struct Harness {
    store: Arc<InMemoryStore>,
    provisioner: Arc<ScriptedProvisioner>,
    metrics: Arc<RecordingMetricsSink>,
    events: Arc<InMemoryEventSink>,
    supervisor: DeploymentSupervisor,
}

fn harness() -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let provisioner = Arc::new(ScriptedProvisioner::default());
    let metrics = Arc::new(RecordingMetricsSink::new());
    let events = Arc::new(InMemoryEventSink::new());

    let supervisor = DeploymentSupervisor::new(
        store.clone(),
        ProvisionerRegistry::new().with("v1", provisioner.clone()),
        events.clone(),
        metrics.clone(),
        "worker-1",
    );

    Harness {
        store,
        provisioner,
        metrics,
        events,
        supervisor,
    }
}

fn seed_deployment(store: &InMemoryStore) -> Result<Deployment> {
    let cluster = Cluster::new("cluster-a");
    let workload = WorkloadDefinition::new("chat-backend", "v1");
    store.save_cluster(&cluster)?;
    store.save_workload(&workload)?;

    let deployment = Deployment::new(cluster.id, workload.id);
    store.save_deployment(&deployment)?;
    Ok(deployment)
}

async fn current(store: &InMemoryStore, deployment: &Deployment) -> Deployment {
    store
        .get_deployment(&deployment.id)
        .await
        .unwrap()
        .expect("deployment exists")
}

#[tokio::test]
async fn create_reconcile_stable_end_to_end() -> Result<()> {
    let h = harness();
    let deployment = seed_deployment(&h.store)?;

    // Cycle 1: provisioning succeeds, deployment starts reconciling.
    h.supervisor.do_work().await?;
    let after_create = current(&h.store, &deployment).await;
    assert_eq!(after_create.state, DeploymentState::Reconciling);
    assert!(!after_create.is_locked());
    assert_eq!(h.store.event_count()?, 1);

    // Cycle 2: backend not ready yet; no transition, no new event.
    h.supervisor.do_work().await?;
    assert_eq!(
        current(&h.store, &deployment).await.state,
        DeploymentState::Reconciling
    );
    assert_eq!(h.store.event_count()?, 1);
    assert!(h.metrics.observations().is_empty());

    // Cycle 3: ready; deployment stabilizes with exactly one histogram
    // observation and one new state change event.
    h.provisioner.ready.store(true, Ordering::SeqCst);
    h.supervisor.do_work().await?;

    let stable = current(&h.store, &deployment).await;
    assert_eq!(stable.state, DeploymentState::Stable);
    assert_eq!(h.store.event_count()?, 2);

    let observations = h.metrics.observations();
    assert_eq!(observations.len(), 1);
    assert_eq!(
        observations[0].histogram,
        strato_supervisor::metrics::names::DEPLOYMENT_RECONCILING_DURATION_SECONDS
    );
    assert_eq!(observations[0].cluster_id, deployment.cluster_id.to_string());
    // The anchor event was written moments ago in this test.
    assert!(observations[0].seconds < 5.0);

    let published = h.events.published()?;
    assert_eq!(published.len(), 2);
    assert_eq!(published[0].new_state, DeploymentState::Reconciling);
    assert_eq!(published[1].new_state, DeploymentState::Stable);

    // Stable deployments are terminal: nothing further to discover.
    h.supervisor.do_work().await?;
    assert_eq!(h.store.event_count()?, 2);
    Ok(())
}

#[tokio::test]
async fn deletion_end_to_end_with_duration_metric() -> Result<()> {
    let h = harness();
    h.provisioner.ready.store(true, Ordering::SeqCst);
    let deployment = seed_deployment(&h.store)?;

    // Drive to stable, then request deletion the way an external API
    // would: state write plus its state change event.
    h.supervisor.do_work().await?;
    h.supervisor.do_work().await?;
    let mut stable = current(&h.store, &deployment).await;
    assert_eq!(stable.state, DeploymentState::Stable);

    stable.state = DeploymentState::DeletionRequested;
    h.store.update_deployment(&stable).await?;
    let mut request_event = StateChangeEvent::new(
        deployment.id,
        DeploymentState::Stable,
        DeploymentState::DeletionRequested,
    );
    request_event.occurred_at = Utc::now() - chrono::Duration::seconds(20);
    h.store.append_state_change_event(request_event).await?;

    h.supervisor.do_work().await?;

    let deleted = current(&h.store, &deployment).await;
    assert_eq!(deleted.state, DeploymentState::Deleted);
    assert!(deleted.deleted_at.is_some());
    assert_eq!(h.provisioner.delete_calls.load(Ordering::SeqCst), 1);

    let deletion_observations: Vec<_> = h
        .metrics
        .observations()
        .into_iter()
        .filter(|o| {
            o.histogram == strato_supervisor::metrics::names::DEPLOYMENT_DELETION_DURATION_SECONDS
        })
        .collect();
    assert_eq!(deletion_observations.len(), 1);
    assert!(deletion_observations[0].seconds >= 20.0);
    assert!(deletion_observations[0].seconds < 25.0);

    // Deleted deployments never show up as pending work again.
    h.supervisor.do_work().await?;
    assert_eq!(h.provisioner.delete_calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn deletion_waits_for_running_backups() -> Result<()> {
    let h = harness();
    let cluster = Cluster::new("cluster-a");
    let workload = WorkloadDefinition::new("chat-backend", "v1");
    h.store.save_cluster(&cluster)?;
    h.store.save_workload(&workload)?;

    let mut deployment = Deployment::new(cluster.id, workload.id);
    deployment.state = DeploymentState::DeletionRequested;
    h.store.save_deployment(&deployment)?;

    let mut backup = Backup::new(deployment.id, BackupState::Requested);
    h.store.save_backup(&backup)?;

    h.supervisor.do_work().await?;
    assert_eq!(
        current(&h.store, &deployment).await.state,
        DeploymentState::DeletionRequested
    );
    assert_eq!(h.provisioner.delete_calls.load(Ordering::SeqCst), 0);

    backup.state = BackupState::Failed;
    h.store.save_backup(&backup)?;

    h.supervisor.do_work().await?;
    assert_eq!(
        current(&h.store, &deployment).await.state,
        DeploymentState::Deleted
    );
    assert_eq!(h.provisioner.delete_calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn always_failing_backend_never_makes_progress() -> Result<()> {
    let h = harness();
    h.provisioner.fail_create.store(true, Ordering::SeqCst);
    let deployment = seed_deployment(&h.store)?;

    for cycle in 1..=5 {
        h.supervisor.do_work().await?;
        assert_eq!(
            current(&h.store, &deployment).await.state,
            DeploymentState::CreationRequested
        );
        assert_eq!(h.provisioner.create_calls.load(Ordering::SeqCst), cycle);
    }
    assert_eq!(h.store.event_count()?, 0);
    Ok(())
}

#[tokio::test]
async fn racing_try_lock_calls_admit_exactly_one_owner() -> Result<()> {
    let store = Arc::new(InMemoryStore::new());
    let deployment = Deployment::new(
        strato_core::ClusterId::generate(),
        strato_core::WorkloadId::generate(),
    );
    store.save_deployment(&deployment)?;

    let mut tasks = Vec::new();
    for worker in 0..8 {
        let store = store.clone();
        let id = deployment.id;
        tasks.push(tokio::spawn(async move {
            store
                .try_lock_deployment(&id, &format!("worker-{worker}"))
                .await
        }));
    }

    let mut winners = 0;
    for task in tasks {
        if task.await.expect("lock task panicked")? {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
    Ok(())
}

#[tokio::test]
async fn two_workers_supervise_each_deployment_once() -> Result<()> {
    let store = Arc::new(InMemoryStore::new());
    let provisioner = Arc::new(ScriptedProvisioner::default());
    let events = Arc::new(InMemoryEventSink::new());
    let metrics = Arc::new(RecordingMetricsSink::new());

    let make_supervisor = |instance: &str| {
        DeploymentSupervisor::new(
            store.clone(),
            ProvisionerRegistry::new().with("v1", provisioner.clone()),
            events.clone(),
            metrics.clone(),
            instance,
        )
    };
    let first_worker = make_supervisor("worker-1");
    let second_worker = make_supervisor("worker-2");

    let deployment = seed_deployment(&store)?;

    // Both workers discover the same deployment, then race the lock.
    let (a, b) = tokio::join!(first_worker.do_work(), second_worker.do_work());
    a?;
    b?;

    let final_state = store
        .get_deployment(&deployment.id)
        .await?
        .expect("deployment exists")
        .state;
    assert_eq!(final_state, DeploymentState::Reconciling);
    // Exactly one worker performed the provisioning call.
    assert_eq!(provisioner.create_calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.event_count()?, 1);
    Ok(())
}
