//! Metrics for collaborator calls.

use metrics::counter;

/// Metric name constants for consistency.
pub mod names {
    /// Collaborator requests by service and outcome.
    pub const REQUESTS_TOTAL: &str = "shorts_media_requests_total";

    /// Retry attempts by operation.
    pub const RETRIES_TOTAL: &str = "shorts_media_retries_total";
}

/// Record a finished collaborator request.
pub fn record_request(service: &'static str, success: bool) {
    counter!(
        names::REQUESTS_TOTAL,
        "service" => service,
        "outcome" => if success { "success" } else { "error" }
    )
    .increment(1);
}

/// Record a retry attempt.
pub fn record_retry(operation: &str) {
    counter!(
        names::RETRIES_TOTAL,
        "operation" => operation.to_string()
    )
    .increment(1);
}
