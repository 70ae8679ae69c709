//! Observability infrastructure for Strato.
//!
//! Structured logging with consistent spans. This module provides
//! initialization helpers and span constructors so every worker process
//! logs the same fields for the same operations.

use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

/// Initializes the logging subsystem.
///
/// Call once at worker startup. Safe to call multiple times; subsequent
/// calls are no-ops.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Controls log levels (e.g., `info`, `strato_supervisor=debug`)
///
/// # Example
///
/// ```rust
/// use strato_core::observability::{init_logging, LogFormat};
///
/// init_logging(LogFormat::Pretty);
/// ```
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json())
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().pretty())
                    .init();
            }
        }
    });
}

/// Creates a span for supervision operations with standard fields.
///
/// # Example
///
/// ```rust
/// use strato_core::observability::supervise_span;
///
/// let span = supervise_span("transition", "dep_abc", "worker-1");
/// let _guard = span.enter();
/// // ... supervise the deployment
/// ```
#[must_use]
pub fn supervise_span(operation: &str, deployment_id: &str, instance_id: &str) -> Span {
    tracing::info_span!(
        "supervise",
        op = operation,
        deployment = deployment_id,
        instance = instance_id,
    )
}
