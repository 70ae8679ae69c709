//! Outcome recording for completed transitions.
//!
//! After a transition has been durably persisted, the outcome recorder
//! derives a duration metric from the state change event log and emits
//! one new event for the transition. Both paths are strictly
//! post-commit: a recording failure is logged and the observation is
//! lost, never retried. Re-deriving a duration on a later pass would
//! measure the wrong interval.
//!
//! ## Anchor events
//!
//! Duration metrics measure the wall-clock time between two named states.
//! The start timestamp comes from the most recent event whose new-state
//! matches the transition's start marker: entry into `Reconciling` for
//! the reconcile duration, entry into `DeletionRequested` for the
//! deletion duration. Exactly one candidate must exist; zero means the
//! history is missing and more than one means the producer wrote
//! duplicates, and either way no metric is recorded.

use std::sync::Arc;

use crate::deployment::{Deployment, DeploymentState};
use crate::error::{Error, Result};
use crate::event::{EventSink, Paging, ResourceKind, StateChangeEvent, StateChangeEventFilter};
use crate::metrics::{names, MetricsSink};
use crate::store::Store;

/// A transition into a metric-worthy state.
///
/// The set is closed: every other completed transition is explicitly not
/// applicable ([`classify`](Self::classify) returns `None`) and carries
/// no duration metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletedTransition {
    /// The deployment became `Stable`; measured from its entry into
    /// `Reconciling`.
    ReconcileFinished,
    /// The deployment was removed; measured from its entry into
    /// `DeletionRequested`.
    DeletionFinished,
}

impl CompletedTransition {
    /// Classifies a newly persisted state.
    ///
    /// Returns `None` for states that carry no duration metric.
    #[must_use]
    pub const fn classify(new_state: DeploymentState) -> Option<Self> {
        match new_state {
            DeploymentState::Stable => Some(Self::ReconcileFinished),
            DeploymentState::Deleted => Some(Self::DeletionFinished),
            _ => None,
        }
    }

    /// The start-marker state whose most recent entry event anchors the
    /// duration.
    #[must_use]
    pub const fn anchor_state(self) -> DeploymentState {
        match self {
            Self::ReconcileFinished => DeploymentState::Reconciling,
            Self::DeletionFinished => DeploymentState::DeletionRequested,
        }
    }

    /// The histogram the duration is recorded on.
    #[must_use]
    pub const fn histogram(self) -> &'static str {
        match self {
            Self::ReconcileFinished => names::DEPLOYMENT_RECONCILING_DURATION_SECONDS,
            Self::DeletionFinished => names::DEPLOYMENT_DELETION_DURATION_SECONDS,
        }
    }
}

/// Records metrics and events for durably completed transitions.
pub struct OutcomeRecorder {
    store: Arc<dyn Store>,
    metrics: Arc<dyn MetricsSink>,
    events: Arc<dyn EventSink>,
}

impl OutcomeRecorder {
    /// Creates a new outcome recorder over the given collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        metrics: Arc<dyn MetricsSink>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            store,
            metrics,
            events,
        }
    }

    /// Records the outcome of a completed transition.
    ///
    /// Failures on either path are logged and do not roll back the
    /// already-committed transition.
    pub async fn record(&self, deployment: &Deployment, old_state: DeploymentState) {
        if let Err(error) = self.observe_transition_duration(deployment).await {
            tracing::error!(
                deployment = %deployment.id,
                %error,
                "Failed to record deployment transition metrics"
            );
        }

        if let Err(error) = self.emit_state_change(deployment, old_state).await {
            tracing::error!(
                deployment = %deployment.id,
                %error,
                "Failed to record deployment state change event"
            );
        }
    }

    /// Derives and observes the duration metric for a metric-worthy
    /// transition. A no-op for all other transitions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AnchorEventHistory`] when the event log does not
    /// contain exactly one anchor candidate; nothing is recorded then.
    pub async fn observe_transition_duration(&self, deployment: &Deployment) -> Result<()> {
        let Some(transition) = CompletedTransition::classify(deployment.state) else {
            return Ok(());
        };
        let anchor_state = transition.anchor_state();

        // Page size 2 so a duplicated anchor is distinguishable from a
        // unique one.
        let candidates = self
            .store
            .get_state_change_events(&StateChangeEventFilter {
                resource_id: Some(deployment.id),
                resource_kind: Some(ResourceKind::Deployment),
                new_states: vec![anchor_state],
                paging: Paging::first(2),
            })
            .await?;

        let [anchor] = candidates.as_slice() else {
            return Err(Error::AnchorEventHistory {
                deployment_id: deployment.id,
                anchor: anchor_state,
                found: candidates.len(),
            });
        };

        let elapsed = anchor.elapsed_seconds();
        self.metrics.observe_duration(
            transition.histogram(),
            &deployment.cluster_id.to_string(),
            elapsed,
        );
        tracing::debug!(
            deployment = %deployment.id,
            state = %deployment.state,
            seconds = elapsed,
            "Observed deployment transition duration"
        );
        Ok(())
    }

    /// Appends the transition's state change event and publishes the
    /// notification.
    ///
    /// # Errors
    ///
    /// Returns an error if the append or the publication fails. The
    /// notification is skipped when the append fails, so the log never
    /// lags behind what was announced.
    pub async fn emit_state_change(
        &self,
        deployment: &Deployment,
        old_state: DeploymentState,
    ) -> Result<()> {
        let event = StateChangeEvent::new(deployment.id, old_state, deployment.state);
        self.store.append_state_change_event(event).await?;
        self.events
            .publish_state_change(deployment, old_state, deployment.state)
            .await
    }
}
