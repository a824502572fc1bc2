/// Metrics and telemetry for the agent directory
///
/// Provides Prometheus-compatible metrics for monitoring:
/// - Moderation actions by outcome
/// - Bulk action item outcomes
/// - Audit log writes
/// - HTTP request counts

use crate::error::{DirectoryError, DirectoryResult};
use lazy_static::lazy_static;
use prometheus::{register_int_counter_vec, Encoder, IntCounterVec, TextEncoder};

lazy_static! {
    /// Moderation actions by action, resource type and outcome
    pub static ref MODERATION_ACTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "moderation_actions_total",
        "Total number of moderation actions",
        &["action", "resource_type", "outcome"]
    )
    .unwrap();

    /// Items processed by bulk actions
    pub static ref BULK_ITEMS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "moderation_bulk_items_total",
        "Total number of items processed by bulk moderation actions",
        &["action", "outcome"]
    )
    .unwrap();

    /// Audit log writes; success is counted after the transaction commits
    pub static ref AUDIT_WRITES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "audit_writes_total",
        "Audit log writes by outcome, counted once the action commits or fails",
        &["status"]
    )
    .unwrap();

    /// HTTP requests by route and status class
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "status"]
    )
    .unwrap();
}

/// Render all metrics in Prometheus text format
pub fn render_metrics() -> DirectoryResult<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| DirectoryError::Internal(format!("Failed to encode metrics: {}", e)))?;
    String::from_utf8(buffer)
        .map_err(|e| DirectoryError::Internal(format!("Metrics are not UTF-8: {}", e)))
}

/// Record the outcome of a single moderation action
pub fn record_moderation_action(action: &str, resource_type: &str, outcome: &str) {
    MODERATION_ACTIONS_TOTAL
        .with_label_values(&[action, resource_type, outcome])
        .inc();
}

/// Record a bulk item outcome (succeeded / failed / cancelled)
pub fn record_bulk_item(action: &str, outcome: &str) {
    BULK_ITEMS_TOTAL.with_label_values(&[action, outcome]).inc();
}

/// Record an audit append
pub fn record_audit_write(success: bool) {
    AUDIT_WRITES_TOTAL
        .with_label_values(&[if success { "success" } else { "failure" }])
        .inc();
}

/// Record an HTTP response
pub fn record_http_request(method: &str, status: u16) {
    let class = match status {
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    };
    HTTP_REQUESTS_TOTAL.with_label_values(&[method, class]).inc();
}
