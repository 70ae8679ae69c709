//! Read-only inputs to transition handlers.
//!
//! Clusters and workload definitions are owned and mutated outside the
//! reconciliation core. The supervisor treats them as immutable snapshots
//! for the duration of one supervise call: they are fetched once per
//! transition and passed by reference into the provisioning backend.

use serde::{Deserialize, Serialize};

use strato_core::{ClusterId, WorkloadId};

/// A compute cluster that deployments are bound to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    /// Unique cluster identifier.
    pub id: ClusterId,
    /// Human-readable cluster name.
    pub name: String,
}

impl Cluster {
    /// Creates a new cluster snapshot.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ClusterId::generate(),
            name: name.into(),
        }
    }
}

/// A logical workload definition that deployments instantiate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadDefinition {
    /// Unique workload identifier.
    pub id: WorkloadId,
    /// Human-readable workload name.
    pub name: String,
    /// Provisioner capability version for this workload.
    ///
    /// Selects which registered provisioning backend handles deployments
    /// of this workload. An unregistered version is a configuration error.
    pub provisioner_version: String,
}

impl WorkloadDefinition {
    /// Creates a new workload definition snapshot.
    #[must_use]
    pub fn new(name: impl Into<String>, provisioner_version: impl Into<String>) -> Self {
        Self {
            id: WorkloadId::generate(),
            name: name.into(),
            provisioner_version: provisioner_version.into(),
        }
    }
}
