//! # strato-supervisor
//!
//! Lifecycle reconciliation for cluster-bound workload deployments.
//!
//! This crate implements the reconciliation domain of the Strato control
//! plane, providing:
//!
//! - **Work discovery**: Polling for unlocked deployments flagged pending
//!   work
//! - **Distributed locking**: A per-deployment exclusive lease backed by
//!   atomic conditional writes in the store
//! - **State machine**: Transition handlers that drive a deployment
//!   through provisioning, readiness, and deletion
//! - **Outcome recording**: Durable state persistence with derived timing
//!   metrics and state change events, once per transition
//!
//! ## Guarantees
//!
//! - **At most one active worker per deployment**: enforced by the
//!   store's lock atomicity, not by in-process mutual exclusion; any
//!   number of worker processes may race discovery
//! - **Idempotent under re-polling**: a failed handler leaves state
//!   unchanged, so the next polling cycle retries from the same state
//! - **Stale writes are discarded**: state is re-fetched and compared
//!   before and after every transition computation
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use strato_supervisor::event::InMemoryEventSink;
//! use strato_supervisor::metrics::FacadeMetricsSink;
//! use strato_supervisor::provision::ProvisionerRegistry;
//! use strato_supervisor::scheduler::{Scheduler, SchedulerConfig};
//! use strato_supervisor::store::memory::InMemoryStore;
//! use strato_supervisor::supervisor::DeploymentSupervisor;
//!
//! # async fn run() -> strato_supervisor::error::Result<()> {
//! let store = Arc::new(InMemoryStore::new());
//! let supervisor = Arc::new(DeploymentSupervisor::new(
//!     store,
//!     ProvisionerRegistry::new(),
//!     Arc::new(InMemoryEventSink::new()),
//!     Arc::new(FacadeMetricsSink::new()),
//!     "worker-1",
//! ));
//!
//! let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//! let scheduler = Scheduler::new(supervisor, SchedulerConfig::from_env()?);
//! scheduler.run(shutdown_rx).await;
//! # drop(shutdown_tx);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod backup;
pub mod cluster;
pub mod deployment;
pub mod error;
pub mod event;
pub mod lock;
pub mod metrics;
pub mod outcome;
pub mod provision;
pub mod scheduler;
pub mod store;
pub mod supervisor;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::backup::{Backup, BackupFilter, BackupState};
    pub use crate::cluster::{Cluster, WorkloadDefinition};
    pub use crate::deployment::{Deployment, DeploymentState};
    pub use crate::error::{Error, Result};
    pub use crate::event::{
        EventSink, Paging, ResourceKind, StateChangeEvent, StateChangeEventFilter,
    };
    pub use crate::lock::DeploymentLock;
    pub use crate::metrics::{FacadeMetricsSink, MetricsSink, SupervisorMetrics};
    pub use crate::outcome::{CompletedTransition, OutcomeRecorder};
    pub use crate::provision::{Provisioner, ProvisionerRegistry};
    pub use crate::scheduler::{Doer, Scheduler, SchedulerConfig};
    pub use crate::store::{memory::InMemoryStore, Store};
    pub use crate::supervisor::DeploymentSupervisor;
}
