//! Sync lifecycle integration tests.
//!
//! These tests run whole fetches against the mock ticketing API:
//! - Cursor pagination across full and short pages
//! - Concurrency bound on per-ticket detail fetches
//! - Degradation of failed, rate-limited and panicking detail fetches
//! - Persistence of the result through the SQLite store

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::time::Instant;

use helpdesk_core::{
    config::SyncConfig,
    sync::{DateRange, FetchRequest, SyncService, TicketFetcher},
    testing::{fixtures, MockTicketApi},
    ticket::{SqliteTicketStore, TicketStore},
};

fn may_2024() -> DateRange {
    DateRange::parse("2024-05-01", "2024-05-31").expect("valid range")
}

/// API with `count` tickets, each with one note and one time entry.
fn api_with_tickets(count: i64) -> Arc<MockTicketApi> {
    let api = Arc::new(MockTicketApi::new());
    api.add_tickets((1..=count).map(fixtures::ticket));
    for id in 1..=count {
        api.add_notes(id, vec![fixtures::note(id * 10, id)]);
        api.add_time_entries(id, vec![fixtures::time_entry(id * 10, id, 0.5)]);
    }
    api
}

#[tokio::test(start_paused = true)]
async fn test_three_pages_with_default_limits() {
    let api = api_with_tickets(1120);
    api.set_latency(Duration::from_millis(50));
    let config = SyncConfig::default();
    let fetcher = TicketFetcher::new(api.clone(), &config);

    let outcome = fetcher
        .fetch(&FetchRequest::new(may_2024(), &config))
        .await
        .expect("fetch succeeds");

    assert_eq!(outcome.tickets.len(), 1120);
    assert_eq!(outcome.pages, 3);
    assert_eq!(outcome.final_cursor, 1120);
    assert_eq!(outcome.degraded, 0);

    // 500, 500, then a short page of 120 ends the run without a fourth query
    let queries = api.page_queries();
    let cursors: Vec<i64> = queries.iter().map(|q| q.after_id).collect();
    assert_eq!(cursors, vec![0, 500, 1000]);
    assert!(queries.iter().all(|q| q.max_records == 500));

    let stats = fetcher.stats().snapshot();
    assert_eq!(stats.completed, 1120);
    assert_eq!(stats.active, 0);
    assert_eq!(stats.peak_active, 5, "the limit is reached, never exceeded");
    assert!(api.peak_in_flight() <= 5);
    assert_eq!(api.child_calls(), 2240);
}

#[tokio::test(start_paused = true)]
async fn test_cursor_strictly_increases() {
    let api = api_with_tickets(23);
    let config = SyncConfig::default();
    let fetcher = TicketFetcher::new(api.clone(), &config);

    let outcome = fetcher
        .fetch(&FetchRequest::new(may_2024(), &config).with_page_size(4))
        .await
        .expect("fetch succeeds");

    let cursors: Vec<i64> = api.page_queries().iter().map(|q| q.after_id).collect();
    assert!(cursors.windows(2).all(|w| w[0] < w[1]), "cursors {:?}", cursors);
    assert_eq!(cursors.len(), 6);
    assert_eq!(outcome.final_cursor, 23);

    let ids: Vec<i64> = outcome.tickets.iter().map(|t| t.id()).collect();
    assert_eq!(ids, (1..=23).collect::<Vec<_>>());
}

#[tokio::test(start_paused = true)]
async fn test_failed_time_entries_leave_other_tickets_intact() {
    let api = api_with_tickets(10);
    api.fail_time_entries(3);
    api.fail_time_entries(7);
    let config = SyncConfig::default();
    let fetcher = TicketFetcher::new(api.clone(), &config);

    let outcome = fetcher
        .fetch(&FetchRequest::new(may_2024(), &config))
        .await
        .expect("fetch succeeds");

    assert_eq!(outcome.tickets.len(), 10);
    let with_entries = outcome
        .tickets
        .iter()
        .filter(|t| !t.time_entries.is_empty())
        .count();
    assert_eq!(with_entries, 8);

    for id in [3, 7] {
        let ticket = &outcome.tickets[(id - 1) as usize];
        assert!(ticket.time_entries.is_empty());
        assert_eq!(ticket.notes.len(), 1, "notes of ticket {} kept", id);
        assert!(ticket.degraded);
    }
    assert_eq!(outcome.degraded, 2);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_every_attempt_returns_empty() {
    let api = api_with_tickets(3);
    api.rate_limit_notes(2, u32::MAX);
    let config = SyncConfig::default();
    let fetcher = TicketFetcher::new(api.clone(), &config);
    let start = Instant::now();

    let outcome = fetcher
        .fetch(&FetchRequest::new(may_2024(), &config))
        .await
        .expect("rate limiting never fails the run");

    let second = &outcome.tickets[1];
    assert!(second.notes.is_empty());
    assert_eq!(second.time_entries.len(), 1);
    assert!(second.degraded);
    // 3 attempts for ticket 2's notes, one each for everything else
    assert_eq!(api.child_calls(), 8);
    // 300ms politeness + 1.5s + 3s + 6s backoff + 200ms between requests
    assert_eq!(start.elapsed(), Duration::from_millis(11_000));
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_recovers_after_backoff() {
    let api = api_with_tickets(1);
    api.rate_limit_time_entries(1, 2);
    let config = SyncConfig::default();
    let fetcher = TicketFetcher::new(api.clone(), &config);
    let start = Instant::now();

    let outcome = fetcher
        .fetch(&FetchRequest::new(may_2024(), &config))
        .await
        .expect("fetch succeeds");

    assert_eq!(outcome.tickets[0].time_entries.len(), 1);
    assert!(!outcome.tickets[0].degraded);
    // 300ms politeness + 200ms between requests + 1.5s + 3s backoff
    assert_eq!(start.elapsed(), Duration::from_millis(5000));
}

#[tokio::test(start_paused = true)]
async fn test_sync_persists_panicking_ticket_without_children() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let store = Arc::new(
        SqliteTicketStore::new(&temp_dir.path().join("sync.db"))
            .expect("Failed to create ticket store"),
    );
    let api = api_with_tickets(5);
    api.panic_on(4);
    let config = SyncConfig::default();
    let service = SyncService::new(TicketFetcher::new(api.clone(), &config), store.clone());

    let report = service
        .run(&FetchRequest::new(may_2024(), &config))
        .await
        .expect("sync succeeds");

    assert_eq!(report.status, "success");
    assert_eq!(report.statistics.tickets_processed, 5);
    assert_eq!(report.statistics.tickets_inserted, 5);
    assert_eq!(report.statistics.notes_inserted, 4);
    assert_eq!(report.statistics.time_entries_inserted, 4);
    assert_eq!(report.statistics.degraded_tickets, 1);
    assert!(report.statistics.errors.is_empty());

    assert!(store.get_ticket(4).unwrap().is_some());
    assert!(store.notes_for(4).unwrap().is_empty());
    assert_eq!(store.notes_for(5).unwrap().len(), 1);

    let stats = store.stats().unwrap();
    assert_eq!(stats.tickets, 5);
    assert_eq!(stats.notes, 4);
}

#[tokio::test(start_paused = true)]
async fn test_resync_overwrites_rows() {
    let store = Arc::new(SqliteTicketStore::in_memory().unwrap());
    let config = SyncConfig::default();

    let api = api_with_tickets(3);
    SyncService::new(TicketFetcher::new(api, &config), store.clone())
        .run(&FetchRequest::new(may_2024(), &config))
        .await
        .unwrap();

    let api = Arc::new(MockTicketApi::new());
    let mut closed = fixtures::ticket(2);
    closed.status = Some(5);
    api.add_tickets(vec![fixtures::ticket(1), closed, fixtures::ticket(3)]);
    SyncService::new(TicketFetcher::new(api, &config), store.clone())
        .run(&FetchRequest::new(may_2024(), &config))
        .await
        .unwrap();

    let stats = store.stats().unwrap();
    assert_eq!(stats.tickets, 3);
    assert_eq!(stats.open_tickets, 2);
    // Children from the first run remain; the second run had none to write
    assert_eq!(stats.notes, 3);
}
