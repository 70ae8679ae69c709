//! Provisioning backend capabilities and version dispatch.
//!
//! A [`Provisioner`] is the external collaborator that actually creates,
//! probes, and tears down deployments on a cluster. Each workload
//! definition names a provisioner version; the [`ProvisionerRegistry`]
//! maps version identifiers to implementations.
//!
//! Unknown versions fail closed: lookup returns
//! [`Error::UnknownProvisionerVersion`] instead of a no-op backend, so a
//! misconfigured registry surfaces loudly rather than silently skipping
//! work.
//!
//! All capability calls take the deployment together with its owning
//! cluster and workload definition, and report success or failure only;
//! no partial-progress state flows back into the reconciliation core.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::cluster::{Cluster, WorkloadDefinition};
use crate::deployment::Deployment;
use crate::error::{Error, Result};

/// The capability set a provisioning backend must implement.
///
/// Implementations must be safe to re-invoke: a handler may be retried on
/// every polling cycle after a partial failure, and must not assume it is
/// the first attempt.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Prepares shared cluster utilities the deployment depends on.
    ///
    /// Runs before [`create`](Self::create) on every creation attempt.
    async fn prepare_shared_utilities(
        &self,
        cluster: &Cluster,
        workload: &WorkloadDefinition,
        deployment: &Deployment,
    ) -> Result<()>;

    /// Creates the deployment's resources on the cluster.
    async fn create(
        &self,
        cluster: &Cluster,
        workload: &WorkloadDefinition,
        deployment: &Deployment,
    ) -> Result<()>;

    /// Deletes the deployment's resources from the cluster.
    async fn delete(
        &self,
        cluster: &Cluster,
        workload: &WorkloadDefinition,
        deployment: &Deployment,
    ) -> Result<()>;

    /// Probes whether the deployment's resources are ready.
    async fn is_ready(
        &self,
        cluster: &Cluster,
        workload: &WorkloadDefinition,
        deployment: &Deployment,
    ) -> Result<bool>;

    /// Removes artifacts superseded during provisioning (e.g. stale
    /// credentials), once the deployment is ready.
    async fn cleanup_stale_artifacts(
        &self,
        cluster: &Cluster,
        workload: &WorkloadDefinition,
        deployment: &Deployment,
    ) -> Result<()>;
}

/// Maps provisioner version identifiers to backend implementations.
#[derive(Clone, Default)]
pub struct ProvisionerRegistry {
    provisioners: HashMap<String, Arc<dyn Provisioner>>,
}

impl ProvisionerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provisioner for a version, replacing any previous
    /// registration for that version.
    pub fn register(&mut self, version: impl Into<String>, provisioner: Arc<dyn Provisioner>) {
        self.provisioners.insert(version.into(), provisioner);
    }

    /// Builder-style registration.
    #[must_use]
    pub fn with(mut self, version: impl Into<String>, provisioner: Arc<dyn Provisioner>) -> Self {
        self.register(version, provisioner);
        self
    }

    /// Looks up the provisioner for a version.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownProvisionerVersion`] when no backend is
    /// registered for the version.
    pub fn get(&self, version: &str) -> Result<Arc<dyn Provisioner>> {
        self.provisioners
            .get(version)
            .cloned()
            .ok_or_else(|| Error::UnknownProvisionerVersion {
                version: version.to_string(),
            })
    }
}

impl std::fmt::Debug for ProvisionerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut versions: Vec<&str> = self.provisioners.keys().map(String::as_str).collect();
        versions.sort_unstable();
        f.debug_struct("ProvisionerRegistry")
            .field("versions", &versions)
            .finish()
    }
}
