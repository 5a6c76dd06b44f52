//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Sync fetches (pages, tickets, child requests, rate limiting)
//! - Sync runs (duration by result)
//! - LLM requests

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Fetch Metrics
// =============================================================================

/// Ticket pages returned by the ticketing API.
pub static TICKET_PAGES_FETCHED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "helpdesk_ticket_pages_fetched_total",
        "Total ticket pages fetched from the ticketing API",
    )
    .unwrap()
});

/// Tickets returned by the ticketing API.
pub static TICKETS_FETCHED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "helpdesk_tickets_fetched_total",
        "Total tickets fetched from the ticketing API",
    )
    .unwrap()
});

/// Child collection requests by entity and outcome.
pub static CHILD_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "helpdesk_child_requests_total",
            "Notes and time entry fetches per ticket",
        ),
        &["entity", "outcome"], // entity: "notes", "time_entries"; outcome: "ok", "rate_limited", "failed"
    )
    .unwrap()
});

/// Sleeps taken after an HTTP 429.
pub static RATE_LIMIT_RETRIES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "helpdesk_rate_limit_retries_total",
            "Retries scheduled after a rate limit response",
        ),
        &["entity"],
    )
    .unwrap()
});

/// Tickets emitted with at least one child collection defaulted to empty.
pub static DEGRADED_TICKETS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "helpdesk_degraded_tickets_total",
        "Tickets whose notes or time entries could not be fetched",
    )
    .unwrap()
});

/// Per-ticket detail fetches currently holding a permit.
pub static DETAIL_FETCHES_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "helpdesk_detail_fetches_in_flight",
        "Per-ticket detail fetches currently running",
    )
    .unwrap()
});

// =============================================================================
// Sync Metrics
// =============================================================================

/// Sync run duration in seconds.
pub static SYNC_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("helpdesk_sync_duration_seconds", "Duration of sync runs")
            .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0]),
        &["result"], // "success", "failed"
    )
    .unwrap()
});

// =============================================================================
// LLM Metrics
// =============================================================================

/// LLM completion requests by provider and result.
pub static LLM_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("helpdesk_llm_requests_total", "Total LLM completion requests"),
        &["provider", "result"], // result: "success", "error"
    )
    .unwrap()
});

/// LLM token usage by provider and type.
pub static LLM_TOKENS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("helpdesk_llm_tokens_total", "Total LLM tokens used"),
        &["provider", "type"], // type: "input", "output"
    )
    .unwrap()
});

/// All core metrics, for registration with the server's registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Fetch
        Box::new(TICKET_PAGES_FETCHED.clone()),
        Box::new(TICKETS_FETCHED.clone()),
        Box::new(CHILD_REQUESTS.clone()),
        Box::new(RATE_LIMIT_RETRIES.clone()),
        Box::new(DEGRADED_TICKETS.clone()),
        Box::new(DETAIL_FETCHES_IN_FLIGHT.clone()),
        // Sync
        Box::new(SYNC_DURATION.clone()),
        // LLM
        Box::new(LLM_REQUESTS.clone()),
        Box::new(LLM_TOKENS.clone()),
    ]
}
