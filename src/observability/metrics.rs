//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): completed calls by transport and outcome
//! - `proxy_request_duration_seconds` (histogram): time from submit to result
//! - `proxy_pending_operations` (gauge): entries in the pending registry
//! - `proxy_rejected_total` (counter): calls refused before dispatch, by reason
//!
//! Recording is a no-op until [`init_metrics`] installs a recorder.

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus recorder and serve `/metrics` on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    let builder = PrometheusBuilder::new().with_http_listener(addr);

    match builder.install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install Prometheus recorder"),
    }
}

/// Record a call that produced a result.
///
/// `outcome` is `success` for a target response and `error` for an
/// error-shaped result.
pub fn record_request(transport: &str, outcome: &'static str, start: Instant) {
    metrics::counter!(
        "proxy_requests_total",
        "transport" => transport.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    metrics::histogram!("proxy_request_duration_seconds", "transport" => transport.to_string())
        .record(start.elapsed().as_secs_f64());
}

/// Record a call refused or abandoned without a result.
pub fn record_rejected(reason: &'static str) {
    metrics::counter!("proxy_rejected_total", "reason" => reason).increment(1);
}

pub fn record_pending(count: usize) {
    metrics::gauge!("proxy_pending_operations").set(count as f64);
}
