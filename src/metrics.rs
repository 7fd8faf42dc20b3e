// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the nodedns controller.
//!
//! All metrics share the `nodedns` prefix and are exposed by [`serve`] on
//! `/metrics`, next to `/healthz` and `/readyz` probes.
//!
//! # Example
//!
//! ```rust,no_run
//! use nodedns::metrics::{record_reconciliation, gather_metrics};
//!
//! record_reconciliation("success", std::time::Duration::from_millis(120));
//! let text = gather_metrics().unwrap();
//! ```

use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{error, info};

use crate::constants::METRICS_SERVER_PATH;

// ============================================================================
// Metric Name Constants
// ============================================================================

/// Namespace prefix for all metrics
const METRICS_NAMESPACE: &str = "nodedns";

// ============================================================================
// Global Metrics Registry
// ============================================================================

/// Global Prometheus metrics registry
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Set once the first full reconciliation has succeeded
static READY: AtomicBool = AtomicBool::new(false);

fn register<T: prometheus::core::Collector + Clone + 'static>(collector: T) -> T {
    METRICS_REGISTRY
        .register(Box::new(collector.clone()))
        .expect("metric registered twice");
    collector
}

// ============================================================================
// Reconciliation Metrics
// ============================================================================

/// Total number of full reconciliation passes by outcome
///
/// Labels:
/// - `status`: `success` or `error`
pub static RECONCILIATION_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_reconciliations_total"),
        "Total number of full reconciliation passes by status",
    );
    register(CounterVec::new(opts, &["status"]).expect("valid metric definition"))
});

/// Duration of full reconciliation passes in seconds
pub static RECONCILIATION_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_reconciliation_duration_seconds"),
        "Duration of full reconciliation passes in seconds",
    )
    .buckets(vec![0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]);
    register(HistogramVec::new(opts, &["status"]).expect("valid metric definition"))
});

/// Number of hostnames in the most recently built desired state
pub static DESIRED_HOSTS: LazyLock<GaugeVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_desired_hosts"),
        "Number of hostnames requested by annotated pods",
    );
    register(GaugeVec::new(opts, &["namespace"]).expect("valid metric definition"))
});

// ============================================================================
// DNS Record Metrics
// ============================================================================

/// Total number of DNS record changes applied to the provider
///
/// Labels:
/// - `action`: `create` or `delete`
/// - `record_type`: `A` or `AAAA`
pub static RECORD_CHANGES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_record_changes_total"),
        "Total number of DNS record changes applied by action and record type",
    );
    register(CounterVec::new(opts, &["action", "record_type"]).expect("valid metric definition"))
});

// ============================================================================
// Error and Watch Metrics
// ============================================================================

/// Total number of errors by reason code
///
/// Labels:
/// - `reason`: reason code, e.g. `ZoneNotFound`, `ProviderRequestFailed`
pub static ERRORS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_errors_total"),
        "Total number of errors by reason",
    );
    register(CounterVec::new(opts, &["reason"]).expect("valid metric definition"))
});

/// Total number of pod watch events handled
///
/// Labels:
/// - `kind`: `added`, `modified`, `deleted` or `bookmark`
pub static WATCH_EVENTS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_watch_events_total"),
        "Total number of pod watch events handled by kind",
    );
    register(CounterVec::new(opts, &["kind"]).expect("valid metric definition"))
});

/// Total number of pod watch restarts
///
/// Labels:
/// - `reason`: `closed`, `error`, `expired` or `open_failed`
pub static WATCH_RESTARTS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_watch_restarts_total"),
        "Total number of pod watch restarts by reason",
    );
    register(CounterVec::new(opts, &["reason"]).expect("valid metric definition"))
});

// ============================================================================
// Helper Functions
// ============================================================================

/// Record a full reconciliation pass
///
/// # Arguments
/// * `status` - `success` or `error`
/// * `duration` - Duration of the pass
pub fn record_reconciliation(status: &str, duration: Duration) {
    RECONCILIATION_TOTAL.with_label_values(&[status]).inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&[status])
        .observe(duration.as_secs_f64());
}

/// Record the size of the desired state for a namespace
#[allow(clippy::cast_precision_loss)]
pub fn record_desired_hosts(namespace: &str, count: usize) {
    DESIRED_HOSTS
        .with_label_values(&[namespace])
        .set(count as f64);
}

/// Record a DNS record change applied to the provider
///
/// # Arguments
/// * `action` - `create` or `delete`
/// * `record_type` - `A` or `AAAA`
pub fn record_change(action: &str, record_type: &str) {
    RECORD_CHANGES_TOTAL
        .with_label_values(&[action, record_type])
        .inc();
}

/// Record an error by reason code
pub fn record_error(reason: &str) {
    ERRORS_TOTAL.with_label_values(&[reason]).inc();
}

/// Record a handled watch event
pub fn record_watch_event(kind: &str) {
    WATCH_EVENTS_TOTAL.with_label_values(&[kind]).inc();
}

/// Record a watch restart
pub fn record_watch_restart(reason: &str) {
    WATCH_RESTARTS_TOTAL.with_label_values(&[reason]).inc();
}

/// Mark the controller ready (baseline reconciliation done)
pub fn mark_ready() {
    READY.store(true, Ordering::Relaxed);
}

/// Whether the controller has completed its baseline reconciliation
#[must_use]
pub fn is_ready() -> bool {
    READY.load(Ordering::Relaxed)
}

/// Gather and encode all metrics in Prometheus text format
///
/// # Errors
/// Returns error if encoding fails
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}

// ============================================================================
// HTTP Server
// ============================================================================

async fn metrics_handler() -> impl IntoResponse {
    match gather_metrics() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            error!("Failed to export metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to export metrics".to_string(),
            )
        }
    }
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn ready_handler() -> impl IntoResponse {
    if is_ready() {
        (StatusCode::OK, "Ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Not ready")
    }
}

/// Router exposing metrics and probe endpoints
pub fn router() -> Router {
    Router::new()
        .route(METRICS_SERVER_PATH, get(metrics_handler))
        .route("/healthz", get(health_handler))
        .route("/readyz", get(ready_handler))
}

/// Serve metrics and probes on `addr` until the process exits
///
/// # Errors
/// Returns an error if the listener cannot be bound or the server fails
pub async fn serve(addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    axum::serve(listener, router())
        .await
        .map_err(|e| anyhow::anyhow!("Metrics server error: {e}"))
}
