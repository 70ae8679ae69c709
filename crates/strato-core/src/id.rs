//! Strongly-typed identifiers for Strato entities.
//!
//! All identifiers in Strato are:
//! - **Strongly typed**: a `DeploymentId` cannot be passed where a
//!   `ClusterId` is expected
//! - **Lexicographically sortable**: ULIDs encode creation time and sort
//!   naturally
//! - **Globally unique**: no coordination required for generation, which
//!   matters when multiple worker processes mint identifiers concurrently
//!
//! # Example
//!
//! ```rust
//! use strato_core::id::{ClusterId, DeploymentId};
//!
//! let deployment = DeploymentId::generate();
//! let cluster = ClusterId::generate();
//!
//! // IDs are different types - this won't compile:
//! // let wrong: ClusterId = deployment;
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

use crate::error::{Error, Result};

/// A unique identifier for a deployment.
///
/// A deployment is a single workload instance bound to a compute cluster;
/// it is the unit the reconciliation supervisor locks and transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeploymentId(Ulid);

impl DeploymentId {
    /// Generates a new unique deployment ID.
    ///
    /// Uses ULID generation which is:
    /// - Lexicographically sortable by creation time
    /// - Globally unique without coordination
    /// - URL-safe and case-insensitive
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new())
    }

    /// Creates a deployment ID from a raw ULID.
    #[must_use]
    pub const fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    /// Returns the underlying ULID.
    #[must_use]
    pub const fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl fmt::Display for DeploymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DeploymentId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ulid::from_string(s)
            .map(Self)
            .map_err(|e| Error::InvalidId {
                message: format!("invalid deployment ID '{s}': {e}"),
            })
    }
}

/// A unique identifier for a compute cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterId(Ulid);

impl ClusterId {
    /// Generates a new unique cluster ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new())
    }

    /// Creates a cluster ID from a raw ULID.
    #[must_use]
    pub const fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    /// Returns the underlying ULID.
    #[must_use]
    pub const fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ClusterId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ulid::from_string(s)
            .map(Self)
            .map_err(|e| Error::InvalidId {
                message: format!("invalid cluster ID '{s}': {e}"),
            })
    }
}

/// A unique identifier for a workload definition.
///
/// Workload definitions describe what should run; deployments are their
/// per-cluster instantiations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkloadId(Ulid);

impl WorkloadId {
    /// Generates a new unique workload ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new())
    }

    /// Creates a workload ID from a raw ULID.
    #[must_use]
    pub const fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    /// Returns the underlying ULID.
    #[must_use]
    pub const fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl fmt::Display for WorkloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for WorkloadId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ulid::from_string(s)
            .map(Self)
            .map_err(|e| Error::InvalidId {
                message: format!("invalid workload ID '{s}': {e}"),
            })
    }
}

/// A unique identifier for a deployment backup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackupId(Ulid);

impl BackupId {
    /// Generates a new unique backup ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new())
    }

    /// Creates a backup ID from a raw ULID.
    #[must_use]
    pub const fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    /// Returns the underlying ULID.
    #[must_use]
    pub const fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl fmt::Display for BackupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BackupId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ulid::from_string(s)
            .map(Self)
            .map_err(|e| Error::InvalidId {
                message: format!("invalid backup ID '{s}': {e}"),
            })
    }
}

/// A unique identifier for a state change event.
///
/// Event IDs double as ordering keys: because ULIDs are lexicographically
/// sortable by creation time, the newest event for a resource can be
/// selected without a separate sequence column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Ulid);

impl EventId {
    /// Generates a new unique event ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new())
    }

    /// Creates an event ID from a raw ULID.
    #[must_use]
    pub const fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    /// Returns the underlying ULID.
    #[must_use]
    pub const fn as_ulid(&self) -> Ulid {
        self.0
    }

    /// Returns the creation timestamp encoded in the ID.
    #[must_use]
    pub fn created_at(&self) -> chrono::DateTime<chrono::Utc> {
        let ms = self.0.timestamp_ms();
        i64::try_from(ms)
            .ok()
            .and_then(chrono::DateTime::from_timestamp_millis)
            .unwrap_or_else(chrono::Utc::now)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EventId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ulid::from_string(s)
            .map(Self)
            .map_err(|e| Error::InvalidId {
                message: format!("invalid event ID '{s}': {e}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deployment_id_roundtrip() -> Result<()> {
        let id = DeploymentId::generate();
        let parsed: DeploymentId = id.to_string().parse()?;
        assert_eq!(id, parsed);
        Ok(())
    }

    #[test]
    fn invalid_id_is_rejected() {
        let result: Result<ClusterId> = "not-a-ulid".parse();
        assert!(matches!(result, Err(Error::InvalidId { .. })));
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = WorkloadId::generate();
        let b = WorkloadId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn event_ids_sort_by_creation_time() {
        let older = EventId::generate();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let newer = EventId::generate();
        assert!(older < newer);
    }

    #[test]
    fn event_id_encodes_timestamp() {
        let id = EventId::generate();
        let created = id.created_at();
        let now = chrono::Utc::now();
        assert!((now - created).num_seconds() < 5);
    }
}
