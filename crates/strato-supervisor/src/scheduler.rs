//! Fixed-interval driving of supervisor work.
//!
//! Each worker process runs one [`Scheduler`] per supervisor. The
//! scheduler ticks on a fixed poll interval and invokes the supervisor's
//! work function; the interval is the system's only retry cadence.
//! Failed transitions are retried simply because the next tick discovers
//! the unchanged state again.
//!
//! There is no inter-worker coordination here. Many processes tick
//! independently against the same store and the per-deployment locks
//! arbitrate.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use strato_core::Error as CoreError;

use crate::error::Result;
use crate::metrics::SupervisorMetrics;

const ENV_POLL_INTERVAL_SECS: &str = "STRATO_SUPERVISOR_POLL_INTERVAL_SECS";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

/// A unit of periodic work driven by the scheduler.
#[async_trait]
pub trait Doer: Send + Sync {
    /// Performs one cycle of work.
    async fn do_work(&self) -> Result<()>;
}

/// Runtime configuration for the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// How often the supervisor polls for pending work.
    pub poll_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
        }
    }
}

impl SchedulerConfig {
    /// Loads scheduler config from the process environment with strict
    /// validation.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when
    /// `STRATO_SUPERVISOR_POLL_INTERVAL_SECS` is present but not a
    /// positive integer.
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Loads scheduler config with a custom environment source.
    ///
    /// This entry point is test-friendly and accepts a key lookup
    /// function.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the poll interval value is not
    /// a positive integer.
    pub fn from_env_with<F>(get_env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let Some(raw) = get_env(ENV_POLL_INTERVAL_SECS) else {
            return Ok(Self::default());
        };

        let secs: u64 = raw.parse().map_err(|_| {
            CoreError::configuration(format!(
                "{ENV_POLL_INTERVAL_SECS} value '{raw}' is not a positive integer"
            ))
        })?;
        if secs == 0 {
            return Err(CoreError::configuration(format!(
                "{ENV_POLL_INTERVAL_SECS} must be positive"
            ))
            .into());
        }

        Ok(Self {
            poll_interval: Duration::from_secs(secs),
        })
    }
}

/// Ticks a [`Doer`] on a fixed interval until shutdown is signalled.
pub struct Scheduler {
    doer: Arc<dyn Doer>,
    config: SchedulerConfig,
    metrics: SupervisorMetrics,
}

impl Scheduler {
    /// Creates a new scheduler over the given doer.
    #[must_use]
    pub fn new(doer: Arc<dyn Doer>, config: SchedulerConfig) -> Self {
        Self {
            doer,
            config,
            metrics: SupervisorMetrics::new(),
        }
    }

    /// Runs the tick loop until `shutdown` flips to `true` or its sender
    /// is dropped.
    ///
    /// Work errors are logged and never stop the loop. A tick that
    /// overruns the interval delays the next tick rather than bursting to
    /// catch up.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let started = Instant::now();
                    if let Err(error) = self.doer.do_work().await {
                        tracing::warn!(%error, "Scheduled work cycle failed");
                    }
                    self.metrics.observe_cycle_duration(started.elapsed());
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::debug!("Scheduler stopped");
    }
}
