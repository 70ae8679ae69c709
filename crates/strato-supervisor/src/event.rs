//! State change events and the outbound event sink.
//!
//! Every successful transition appends one immutable [`StateChangeEvent`]
//! to the store. The event log serves two purposes:
//!
//! - **Audit**: the full transition history of a deployment is queryable
//! - **Metric anchors**: the outcome recorder looks up the most recent
//!   event whose new-state matches a start marker to measure how long a
//!   deployment spent between two named states
//!
//! Events are queried most-recent-first. Event IDs are ULIDs, so ties on
//! the timestamp are broken by the ID's lexicographic order.
//!
//! The [`EventSink`] trait is the delivery boundary: the supervisor hands
//! each completed transition to the sink and does not care whether it ends
//! up in a webhook queue, a message bus, or a test vector. Delivery
//! failures are logged by the caller and never roll back the transition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use strato_core::{DeploymentId, EventId};

use crate::deployment::{Deployment, DeploymentState};
use crate::error::Result;

/// The kind of resource an event row describes.
///
/// The event log is shared across resource kinds; the kind column keeps
/// rows self-describing. The supervisor in this crate only writes
/// [`ResourceKind::Deployment`] rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceKind {
    /// A compute cluster.
    Cluster,
    /// A workload deployment.
    Deployment,
    /// A deployment backup.
    Backup,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cluster => write!(f, "CLUSTER"),
            Self::Deployment => write!(f, "DEPLOYMENT"),
            Self::Backup => write!(f, "BACKUP"),
        }
    }
}

/// An immutable record of one completed state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateChangeEvent {
    /// Unique event identifier; doubles as an ordering tiebreaker.
    pub id: EventId,
    /// The kind of resource this event describes.
    pub resource_kind: ResourceKind,
    /// The deployment this event describes.
    pub resource_id: DeploymentId,
    /// State before the transition.
    pub old_state: DeploymentState,
    /// State after the transition.
    pub new_state: DeploymentState,
    /// When the transition was recorded.
    pub occurred_at: DateTime<Utc>,
}

impl StateChangeEvent {
    /// Creates a new event for a completed deployment transition,
    /// timestamped now.
    #[must_use]
    pub fn new(
        resource_id: DeploymentId,
        old_state: DeploymentState,
        new_state: DeploymentState,
    ) -> Self {
        Self {
            id: EventId::generate(),
            resource_kind: ResourceKind::Deployment,
            resource_id,
            old_state,
            new_state,
            occurred_at: Utc::now(),
        }
    }

    /// Returns the elapsed wall-clock seconds since this event occurred.
    #[must_use]
    pub fn elapsed_seconds(&self) -> f64 {
        elapsed_seconds(self.occurred_at)
    }
}

/// Returns the elapsed wall-clock seconds since the given instant.
#[must_use]
#[allow(clippy::cast_precision_loss)] // Durations are far below 2^52 ms
pub fn elapsed_seconds(since: DateTime<Utc>) -> f64 {
    let millis = (Utc::now() - since).num_milliseconds();
    millis.max(0) as f64 / 1000.0
}

/// Page selection for event queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    /// Zero-based page index.
    pub page: usize,
    /// Events per page. `usize::MAX` effectively disables paging.
    pub per_page: usize,
}

impl Paging {
    /// The first page with the given size.
    #[must_use]
    pub const fn first(per_page: usize) -> Self {
        Self { page: 0, per_page }
    }
}

impl Default for Paging {
    fn default() -> Self {
        Self {
            page: 0,
            per_page: usize::MAX,
        }
    }
}

/// Filter for state change event queries. Results are most-recent-first.
#[derive(Debug, Clone, Default)]
pub struct StateChangeEventFilter {
    /// Only events for this deployment.
    pub resource_id: Option<DeploymentId>,
    /// Only events for this resource kind.
    pub resource_kind: Option<ResourceKind>,
    /// Only events whose new-state is in this set. Empty matches any.
    pub new_states: Vec<DeploymentState>,
    /// Page selection.
    pub paging: Paging,
}

/// A sink for completed state transitions.
///
/// Implementations deliver "deployment state changed" notifications to
/// interested parties. The transport is out of scope here; the supervisor
/// only requires that a failed publish surfaces as an error it can log.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Publishes a state change notification for the given deployment.
    async fn publish_state_change(
        &self,
        deployment: &Deployment,
        old_state: DeploymentState,
        new_state: DeploymentState,
    ) -> Result<()>;
}

/// A state change captured by [`InMemoryEventSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedStateChange {
    /// The deployment the notification was about.
    pub deployment_id: DeploymentId,
    /// State before the transition.
    pub old_state: DeploymentState,
    /// State after the transition.
    pub new_state: DeploymentState,
}

/// In-memory event sink for testing.
#[derive(Debug, Default)]
pub struct InMemoryEventSink {
    published: Mutex<Vec<PublishedStateChange>>,
}

impl InMemoryEventSink {
    /// Creates a new empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all captured state changes in publication order.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn published(&self) -> Result<Vec<PublishedStateChange>> {
        let published = self
            .published
            .lock()
            .map_err(|_| crate::error::Error::event_publication("sink lock poisoned"))?;
        Ok(published.clone())
    }
}

#[async_trait]
impl EventSink for InMemoryEventSink {
    async fn publish_state_change(
        &self,
        deployment: &Deployment,
        old_state: DeploymentState,
        new_state: DeploymentState,
    ) -> Result<()> {
        let mut published = self
            .published
            .lock()
            .map_err(|_| crate::error::Error::event_publication("sink lock poisoned"))?;
        published.push(PublishedStateChange {
            deployment_id: deployment.id,
            old_state,
            new_state,
        });
        Ok(())
    }
}
