//! Observability metrics for the reconciliation supervisor.
//!
//! Metrics are exposed via the `metrics` crate facade. To export to
//! Prometheus, install a recorder at process startup:
//!
//! ```rust,ignore
//! use metrics_exporter_prometheus::PrometheusBuilder;
//!
//! PrometheusBuilder::new()
//!     .with_http_listener(([0, 0, 0, 0], 9090))
//!     .install()
//!     .expect("failed to install Prometheus recorder");
//! ```
//!
//! ## Metrics Exported
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `strato_deployment_transitions_total` | Counter | `from_state`, `to_state` | Completed deployment state transitions |
//! | `strato_deployment_reconciling_duration_seconds` | Histogram | `cluster` | Time from provisioning to stable |
//! | `strato_deployment_deletion_duration_seconds` | Histogram | `cluster` | Time from deletion request to removal |
//! | `strato_supervisor_cycle_duration_seconds` | Histogram | - | Wall time of one polling cycle |
//! | `strato_unknown_provisioner_versions_total` | Counter | `version` | Work refused due to unregistered versions |
//!
//! The duration histograms are derived by the outcome recorder from the
//! state change event log, not sampled in-process, so they survive worker
//! restarts mid-transition. The recorder observes them through the
//! [`MetricsSink`] trait rather than the facade directly, which lets
//! tests substitute a recording sink and assert on the observed values.

use std::sync::Mutex;
use std::time::Duration;

use metrics::{counter, histogram};

use crate::deployment::DeploymentState;

/// Metric names as constants for consistency.
pub mod names {
    /// Counter: Completed deployment state transitions.
    pub const DEPLOYMENT_TRANSITIONS_TOTAL: &str = "strato_deployment_transitions_total";
    /// Histogram: Seconds from provisioning to stable.
    pub const DEPLOYMENT_RECONCILING_DURATION_SECONDS: &str =
        "strato_deployment_reconciling_duration_seconds";
    /// Histogram: Seconds from deletion request to removal.
    pub const DEPLOYMENT_DELETION_DURATION_SECONDS: &str =
        "strato_deployment_deletion_duration_seconds";
    /// Histogram: Wall time of one polling cycle.
    pub const SUPERVISOR_CYCLE_DURATION_SECONDS: &str = "strato_supervisor_cycle_duration_seconds";
    /// Counter: Work refused because no provisioner was registered.
    pub const UNKNOWN_PROVISIONER_VERSIONS_TOTAL: &str =
        "strato_unknown_provisioner_versions_total";
}

/// Label keys used across metrics.
pub mod labels {
    /// Owning cluster identity (duration aggregation key).
    pub const CLUSTER: &str = "cluster";
    /// Previous deployment state (for transitions).
    pub const FROM_STATE: &str = "from_state";
    /// Target deployment state (for transitions).
    pub const TO_STATE: &str = "to_state";
    /// Provisioner version string.
    pub const VERSION: &str = "version";
}

/// High-level interface for recording supervisor metrics.
///
/// Cheap to clone and share across supervision tasks.
#[derive(Debug, Clone, Default)]
pub struct SupervisorMetrics;

impl SupervisorMetrics {
    /// Creates a new metrics recorder.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Records a completed deployment state transition.
    pub fn record_transition(&self, from_state: DeploymentState, to_state: DeploymentState) {
        counter!(
            names::DEPLOYMENT_TRANSITIONS_TOTAL,
            labels::FROM_STATE => from_state.to_string(),
            labels::TO_STATE => to_state.to_string(),
        )
        .increment(1);
    }

    /// Records the wall time of one polling cycle.
    pub fn observe_cycle_duration(&self, duration: Duration) {
        histogram!(names::SUPERVISOR_CYCLE_DURATION_SECONDS).record(duration.as_secs_f64());
    }

    /// Records a refusal to work due to an unregistered provisioner version.
    pub fn record_unknown_provisioner_version(&self, version: &str) {
        counter!(
            names::UNKNOWN_PROVISIONER_VERSIONS_TOTAL,
            labels::VERSION => version.to_string(),
        )
        .increment(1);
    }
}

/// A labeled histogram observation API for derived duration metrics.
///
/// The outcome recorder observes through this trait so tests can inject
/// [`RecordingMetricsSink`] and assert on exact values; production wires
/// in [`FacadeMetricsSink`].
pub trait MetricsSink: Send + Sync {
    /// Records one observation on the named histogram, labeled by the
    /// owning cluster.
    fn observe_duration(&self, histogram: &'static str, cluster_id: &str, seconds: f64);
}

/// Production sink that records through the `metrics` crate facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct FacadeMetricsSink;

impl FacadeMetricsSink {
    /// Creates a new facade-backed sink.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl MetricsSink for FacadeMetricsSink {
    fn observe_duration(&self, histogram: &'static str, cluster_id: &str, seconds: f64) {
        histogram!(
            histogram,
            labels::CLUSTER => cluster_id.to_string(),
        )
        .record(seconds);
    }
}

/// A single observation captured by [`RecordingMetricsSink`].
#[derive(Debug, Clone, PartialEq)]
pub struct DurationObservation {
    /// The histogram the observation was recorded on.
    pub histogram: &'static str,
    /// The owning cluster label value.
    pub cluster_id: String,
    /// The observed value in seconds.
    pub seconds: f64,
}

/// Test sink that captures observations for assertions.
#[derive(Debug, Default)]
pub struct RecordingMetricsSink {
    observations: Mutex<Vec<DurationObservation>>,
}

impl RecordingMetricsSink {
    /// Creates a new empty recording sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all captured observations in recording order.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned; acceptable in tests.
    #[must_use]
    pub fn observations(&self) -> Vec<DurationObservation> {
        self.observations
            .lock()
            .expect("recording sink lock poisoned")
            .clone()
    }
}

impl MetricsSink for RecordingMetricsSink {
    fn observe_duration(&self, histogram: &'static str, cluster_id: &str, seconds: f64) {
        if let Ok(mut observations) = self.observations.lock() {
            observations.push(DurationObservation {
                histogram,
                cluster_id: cluster_id.to_string(),
                seconds,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supervisor_metrics_can_record_without_a_recorder() {
        // These calls must not panic even without a metrics recorder installed.
        let metrics = SupervisorMetrics::new();
        metrics.record_transition(DeploymentState::CreationRequested, DeploymentState::Reconciling);
        metrics.observe_cycle_duration(Duration::from_millis(25));
        metrics.record_unknown_provisioner_version("v9");
    }

    #[test]
    fn facade_sink_can_observe_without_a_recorder() {
        let sink = FacadeMetricsSink::new();
        sink.observe_duration(
            names::DEPLOYMENT_RECONCILING_DURATION_SECONDS,
            "cluster-1",
            42.0,
        );
    }

    #[test]
    fn recording_sink_captures_observations() {
        let sink = RecordingMetricsSink::new();
        sink.observe_duration(
            names::DEPLOYMENT_DELETION_DURATION_SECONDS,
            "cluster-1",
            12.5,
        );

        let observations = sink.observations();
        assert_eq!(observations.len(), 1);
        assert_eq!(
            observations[0].histogram,
            names::DEPLOYMENT_DELETION_DURATION_SECONDS
        );
        assert_eq!(observations[0].cluster_id, "cluster-1");
        assert!((observations[0].seconds - 12.5).abs() < f64::EPSILON);
    }
}
