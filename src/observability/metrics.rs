//! Metrics collection and exposition.
//!
//! # Metrics
//! - `safe_status_transitions_total` (counter): applied transitions by target status
//! - `safe_rpc_retries_total` (counter): retried chain calls by operation
//! - `safe_signatures_rejected_total` (counter): excluded signatures by reason
//! - `safe_executions_total` (counter): execution attempts by outcome
//! - `safe_notifications_total` (counter): published notifications by outcome
//! - `safe_subscription_active` (gauge): 1 while the log subscription is open
//! - `safe_poll_tick_seconds` (histogram): polling reconciler tick duration

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

/// Install the Prometheus exporter with an HTTP listener on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_transition(to: &'static str) {
    metrics::counter!("safe_status_transitions_total", "to" => to).increment(1);
}

pub fn record_rpc_retry(op: &'static str) {
    metrics::counter!("safe_rpc_retries_total", "op" => op).increment(1);
}

pub fn record_signature_rejected(reason: &'static str) {
    metrics::counter!("safe_signatures_rejected_total", "reason" => reason).increment(1);
}

pub fn record_execution(outcome: &'static str) {
    metrics::counter!("safe_executions_total", "outcome" => outcome).increment(1);
}

pub fn record_notification(outcome: &'static str) {
    metrics::counter!("safe_notifications_total", "outcome" => outcome).increment(1);
}

pub fn record_subscription_active(active: bool) {
    metrics::gauge!("safe_subscription_active").set(if active { 1.0 } else { 0.0 });
}

pub fn record_poll_tick(elapsed: Duration) {
    metrics::histogram!("safe_poll_tick_seconds").record(elapsed.as_secs_f64());
}
