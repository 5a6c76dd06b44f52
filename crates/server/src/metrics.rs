//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the helpdesk server:
//! - HTTP request metrics (latency, counts)
//! - Sync, chat and solution/summary request outcomes
//! - Stored record counts (collected dynamically)

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "helpdesk_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 60.0, 300.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("helpdesk_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "helpdesk_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Sync and Chat Metrics
// =============================================================================

/// Sync requests by window and result.
pub static SYNC_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("helpdesk_sync_requests_total", "Sync requests received"),
        &["window", "result"], // window: "7d", "30d", "custom"
    )
    .unwrap()
});

/// Chat requests by result.
pub static CHAT_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("helpdesk_chat_requests_total", "Chat requests received"),
        &["result"], // "answered", "error", "rejected"
    )
    .unwrap()
});

/// Solution and summary requests that needed the LLM, by kind and result.
pub static INSIGHT_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "helpdesk_insight_requests_total",
            "LLM-backed solution and summary requests",
        ),
        &["kind", "result"], // kind: "solution", "suggestions", "summaries", "regenerate"
    )
    .unwrap()
});

// =============================================================================
// Store Metrics (collected dynamically)
// =============================================================================

/// Rows per stored table.
pub static STORED_RECORDS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("helpdesk_stored_records", "Records in the local store"),
        &["table"],
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // Sync and chat
    registry.register(Box::new(SYNC_REQUESTS.clone())).unwrap();
    registry.register(Box::new(CHAT_REQUESTS.clone())).unwrap();
    registry
        .register(Box::new(INSIGHT_REQUESTS.clone()))
        .unwrap();

    // Store
    registry.register(Box::new(STORED_RECORDS.clone())).unwrap();

    // Core metrics (fetch, retries, sync duration, LLM usage)
    for metric in helpdesk_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so the store gauges reflect current row counts.
pub fn collect_dynamic_metrics(state: &crate::state::AppState) {
    if let Ok(stats) = state.store().stats() {
        STORED_RECORDS.with_label_values(&["tickets"]).set(stats.tickets);
        STORED_RECORDS
            .with_label_values(&["open_tickets"])
            .set(stats.open_tickets);
        STORED_RECORDS.with_label_values(&["notes"]).set(stats.notes);
        STORED_RECORDS
            .with_label_values(&["time_entries"])
            .set(stats.time_entries);
    }
}

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    static NUMERIC: Lazy<regex_lite::Regex> =
        Lazy::new(|| regex_lite::Regex::new(r"/\d+(/|$)").unwrap());
    static TICKET_NUMBER: Lazy<regex_lite::Regex> =
        Lazy::new(|| regex_lite::Regex::new(r"^/solutions/ticket/[^/]+").unwrap());
    let path = TICKET_NUMBER.replace(path, "/solutions/ticket/{ticket_number}");
    NUMERIC.replace_all(&path, "/{id}$1").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_numeric() {
        assert_eq!(normalize_path("/tickets/12345"), "/tickets/{id}");
    }

    #[test]
    fn test_normalize_path_ticket_number() {
        assert_eq!(
            normalize_path("/solutions/ticket/T20241027.0005"),
            "/solutions/ticket/{ticket_number}"
        );
        assert_eq!(
            normalize_path("/summaries/regenerate/42"),
            "/summaries/regenerate/{id}"
        );
    }

    #[test]
    fn test_normalize_path_no_ids() {
        assert_eq!(normalize_path("/sync/last-7-days"), "/sync/last-7-days");
        assert_eq!(normalize_path("/health"), "/health");
    }

    #[test]
    fn test_encode_metrics_returns_prometheus_format() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();

        let output = encode_metrics();
        assert!(output.contains("helpdesk_http_requests_total"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_registry_contains_core_metrics() {
        // Prometheus only outputs metrics that have been accessed
        SYNC_REQUESTS.with_label_values(&["7d", "success"]).inc();
        CHAT_REQUESTS.with_label_values(&["answered"]).inc();
        INSIGHT_REQUESTS
            .with_label_values(&["solution", "success"])
            .inc_by(0);
        STORED_RECORDS.with_label_values(&["tickets"]).set(0);
        helpdesk_core::metrics::TICKET_PAGES_FETCHED.inc_by(0);
        helpdesk_core::metrics::CHILD_REQUESTS
            .with_label_values(&["notes", "ok"])
            .inc_by(0);

        let output = encode_metrics();

        assert!(output.contains("helpdesk_sync_requests_total"));
        assert!(output.contains("helpdesk_chat_requests_total"));
        assert!(output.contains("helpdesk_insight_requests_total"));
        assert!(output.contains("helpdesk_stored_records"));
        assert!(output.contains("helpdesk_ticket_pages_fetched_total"));
        assert!(output.contains("helpdesk_child_requests_total"));
    }
}
