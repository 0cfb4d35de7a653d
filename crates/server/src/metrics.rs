//! Prometheus metrics
//!
//! Installs the global recorder and renders it at `/metrics`.

use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Turn latency buckets (seconds)
const TURN_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

/// Install the Prometheus recorder.
///
/// Safe to call more than once; later calls return the existing handle.
pub fn init_metrics() -> Option<PrometheusHandle> {
    if let Some(handle) = HANDLE.get() {
        return Some(handle.clone());
    }

    let builder = match PrometheusBuilder::new().set_buckets_for_metric(
        Matcher::Full("ragchat_turn_duration_seconds".to_string()),
        TURN_BUCKETS,
    ) {
        Ok(builder) => builder,
        Err(e) => {
            tracing::warn!(error = %e, "Invalid metric buckets, metrics disabled");
            return None;
        }
    };

    match builder.install_recorder() {
        Ok(handle) => {
            describe_metrics();
            Some(HANDLE.get_or_init(|| handle).clone())
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install metrics recorder");
            None
        }
    }
}

fn describe_metrics() {
    metrics::describe_counter!("ragchat_turns_total", "Chat turns processed");
    metrics::describe_histogram!(
        "ragchat_turn_duration_seconds",
        metrics::Unit::Seconds,
        "End-to-end turn latency"
    );
    metrics::describe_counter!(
        "ragchat_fallbacks_total",
        "Pipeline stages that fell back to deterministic output"
    );
    metrics::describe_counter!(
        "ragchat_sessions_evicted_total",
        "Session contexts evicted after inactivity"
    );
    metrics::describe_counter!("ragchat_store_failures_total", "Failed chat store operations");
}

/// GET /metrics
pub async fn metrics_handler() -> impl IntoResponse {
    match HANDLE.get() {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            "metrics disabled\n".to_string(),
        ),
    }
}
