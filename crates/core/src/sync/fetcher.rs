//! Bounded concurrent fetch of tickets with their details.
//!
//! Tickets are paged by an id cursor. Each page's tickets are enriched
//! concurrently, never more than the request's concurrency at once, and a
//! fixed pause separates full pages.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use futures::FutureExt;
use tokio::sync::Semaphore;
use tracing::{error, info};

use super::detail::{DetailFetcher, FetchStats};
use super::types::{EnrichedTicket, FetchOutcome, FetchRequest, SyncError};
use crate::config::SyncConfig;
use crate::metrics;
use crate::upstream::{TicketApi, TicketPageQuery};

/// Pages through tickets in a date range and enriches each one.
pub struct TicketFetcher {
    api: Arc<dyn TicketApi>,
    detail: DetailFetcher,
    config: SyncConfig,
    batch_pause: Duration,
}

impl TicketFetcher {
    pub fn new(api: Arc<dyn TicketApi>, config: &SyncConfig) -> Self {
        Self {
            detail: DetailFetcher::new(Arc::clone(&api), config),
            api,
            config: config.clone(),
            batch_pause: Duration::from_millis(config.batch_pause_ms),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Detail fetch counters, cumulative over every run of this fetcher.
    pub fn stats(&self) -> Arc<FetchStats> {
        self.detail.stats()
    }

    /// Fetch every ticket matching `request`, in page order.
    ///
    /// A failed page aborts the run. Failed child fetches never do: those
    /// tickets come back with empty collections and `degraded` set.
    pub async fn fetch(&self, request: &FetchRequest) -> Result<FetchOutcome, SyncError> {
        request.validate(&self.config)?;

        let range = request.range.view();
        info!(
            start = %range.start,
            end = %range.end,
            company_id = ?request.company_id,
            page_size = request.page_size,
            concurrency = request.concurrency,
            "Fetching tickets"
        );

        let permits = Arc::new(Semaphore::new(request.concurrency));
        let mut outcome = FetchOutcome::default();
        let mut cursor: i64 = 0;

        loop {
            let query = TicketPageQuery {
                start: request.range.start,
                end: request.range.end,
                after_id: cursor,
                company_id: request.company_id,
                max_records: request.page_size,
            };

            let page = self
                .api
                .query_tickets(&query)
                .await
                .map_err(|source| {
                    error!(after_id = cursor, error = %source, "Ticket page fetch failed");
                    SyncError::PageFetch {
                        after_id: cursor,
                        source,
                    }
                })?;

            if page.is_empty() {
                break;
            }

            let page_len = page.len();
            let page_max = page.iter().map(|t| t.id).max().unwrap_or(cursor);
            if page_max <= cursor {
                error!(cursor, page_max, "Ticket ids did not advance past the cursor");
                return Err(SyncError::CursorStalled { cursor, page_max });
            }

            outcome.pages += 1;
            metrics::TICKET_PAGES_FETCHED.inc();
            metrics::TICKETS_FETCHED.inc_by(page_len as u64);
            info!(
                page = outcome.pages,
                tickets = page_len,
                after_id = cursor,
                "Fetched ticket page, fetching notes and time entries"
            );

            // Polled in place: dropping the fetch drops every pending detail
            // fetch with it.
            let fetches = page.iter().cloned().map(|ticket| {
                AssertUnwindSafe(self.detail.enrich(ticket, Arc::clone(&permits))).catch_unwind()
            });

            let results = join_all(fetches).await;
            for (ticket, joined) in page.into_iter().zip(results) {
                let enriched = match joined {
                    Ok(enriched) => enriched,
                    Err(_) => {
                        error!(ticket_id = ticket.id, "Detail fetch panicked");
                        self.detail.finish(EnrichedTicket::bare(ticket))
                    }
                };
                if enriched.degraded {
                    outcome.degraded += 1;
                }
                outcome.tickets.push(enriched);
            }

            cursor = page_max;
            info!(
                page = outcome.pages,
                total = outcome.tickets.len(),
                cursor,
                "Processed ticket page"
            );

            if page_len < request.page_size as usize {
                break;
            }

            if !self.batch_pause.is_zero() {
                info!(
                    pause_ms = self.batch_pause.as_millis() as u64,
                    "Pausing before next page"
                );
                tokio::time::sleep(self.batch_pause).await;
            }
        }

        outcome.final_cursor = cursor;
        info!(
            tickets = outcome.tickets.len(),
            pages = outcome.pages,
            degraded = outcome.degraded,
            "Finished fetching tickets"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::DateRange;
    use crate::testing::{fixtures, MockTicketApi};
    use tokio::time::Instant;

    fn quiet_config() -> SyncConfig {
        SyncConfig {
            politeness_delay_ms: 0,
            sub_request_delay_ms: 0,
            batch_pause_ms: 0,
            ..SyncConfig::default()
        }
    }

    fn request(config: &SyncConfig, page_size: u32) -> FetchRequest {
        let range = DateRange::parse("2024-05-01", "2024-05-31").unwrap();
        FetchRequest::new(range, config).with_page_size(page_size)
    }

    #[tokio::test]
    async fn test_no_tickets() {
        let api = Arc::new(MockTicketApi::new());
        let config = quiet_config();
        let fetcher = TicketFetcher::new(api.clone(), &config);

        let outcome = fetcher.fetch(&request(&config, 10)).await.unwrap();

        assert!(outcome.tickets.is_empty());
        assert_eq!(outcome.pages, 0);
        assert_eq!(outcome.final_cursor, 0);
        assert_eq!(api.page_queries().len(), 1);
    }

    #[tokio::test]
    async fn test_short_page_ends_without_extra_query() {
        let api = Arc::new(MockTicketApi::new());
        api.add_tickets((1..=3).map(fixtures::ticket));
        let config = quiet_config();
        let fetcher = TicketFetcher::new(api.clone(), &config);

        let outcome = fetcher.fetch(&request(&config, 10)).await.unwrap();

        assert_eq!(outcome.tickets.len(), 3);
        assert_eq!(outcome.pages, 1);
        assert_eq!(outcome.final_cursor, 3);
        assert_eq!(api.page_queries().len(), 1);
    }

    #[tokio::test]
    async fn test_exact_multiple_needs_trailing_empty_page() {
        let api = Arc::new(MockTicketApi::new());
        api.add_tickets((1..=4).map(fixtures::ticket));
        let config = quiet_config();
        let fetcher = TicketFetcher::new(api.clone(), &config);

        let outcome = fetcher.fetch(&request(&config, 2)).await.unwrap();

        assert_eq!(outcome.tickets.len(), 4);
        assert_eq!(outcome.pages, 2);
        let cursors: Vec<i64> = api.page_queries().iter().map(|q| q.after_id).collect();
        assert_eq!(cursors, vec![0, 2, 4]);
    }

    #[tokio::test]
    async fn test_results_keep_page_order() {
        let api = Arc::new(MockTicketApi::new());
        api.add_tickets((1..=7).map(fixtures::ticket));
        let config = quiet_config();
        let fetcher = TicketFetcher::new(api.clone(), &config);

        let outcome = fetcher
            .fetch(&request(&config, 3).with_concurrency(3))
            .await
            .unwrap();

        let ids: Vec<i64> = outcome.tickets.iter().map(|t| t.id()).collect();
        assert_eq!(ids, (1..=7).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_request_filters_are_forwarded() {
        let api = Arc::new(MockTicketApi::new());
        let config = quiet_config();
        let fetcher = TicketFetcher::new(api.clone(), &config);

        let req = request(&config, 25).with_company(Some(42));
        fetcher.fetch(&req).await.unwrap();

        let queries = api.page_queries();
        assert_eq!(queries[0].company_id, Some(42));
        assert_eq!(queries[0].max_records, 25);
        assert_eq!(queries[0].start, req.range.start);
        assert_eq!(queries[0].end, req.range.end);
    }

    #[tokio::test]
    async fn test_page_error_aborts() {
        let api = Arc::new(MockTicketApi::new());
        api.add_tickets((1..=4).map(fixtures::ticket));
        api.fail_page_after(2);
        let config = quiet_config();
        let fetcher = TicketFetcher::new(api.clone(), &config);

        let err = fetcher.fetch(&request(&config, 2)).await.unwrap_err();
        assert!(matches!(err, SyncError::PageFetch { after_id: 2, .. }));
    }

    #[tokio::test]
    async fn test_stalled_cursor_aborts() {
        let api = Arc::new(MockTicketApi::new());
        api.script_pages(vec![
            vec![fixtures::ticket(1), fixtures::ticket(2)],
            vec![fixtures::ticket(1), fixtures::ticket(2)],
        ]);
        let config = quiet_config();
        let fetcher = TicketFetcher::new(api.clone(), &config);

        let err = fetcher.fetch(&request(&config, 2)).await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::CursorStalled {
                cursor: 2,
                page_max: 2
            }
        ));
    }

    #[tokio::test]
    async fn test_invalid_request_is_rejected_before_fetching() {
        let api = Arc::new(MockTicketApi::new());
        let config = quiet_config();
        let fetcher = TicketFetcher::new(api.clone(), &config);

        let err = fetcher
            .fetch(&request(&config, 10).with_concurrency(0))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidRequest(_)));
        assert!(api.page_queries().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_between_full_pages_only() {
        let api = Arc::new(MockTicketApi::new());
        api.add_tickets((1..=5).map(fixtures::ticket));
        let config = SyncConfig {
            batch_pause_ms: 2000,
            ..quiet_config()
        };
        let fetcher = TicketFetcher::new(api.clone(), &config);
        let start = Instant::now();

        let outcome = fetcher.fetch(&request(&config, 2)).await.unwrap();

        assert_eq!(outcome.tickets.len(), 5);
        // [1,2] pause [3,4] pause [5] done
        assert_eq!(start.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_panicking_ticket_is_emitted_bare() {
        let api = Arc::new(MockTicketApi::new());
        api.add_tickets((1..=3).map(fixtures::ticket));
        api.add_notes(1, vec![fixtures::note(10, 1)]);
        api.add_notes(2, vec![fixtures::note(20, 2)]);
        api.panic_on(2);
        let config = quiet_config();
        let fetcher = TicketFetcher::new(api.clone(), &config);

        let outcome = fetcher.fetch(&request(&config, 10)).await.unwrap();

        assert_eq!(outcome.tickets.len(), 3);
        let second = &outcome.tickets[1];
        assert_eq!(second.id(), 2);
        assert!(second.notes.is_empty());
        assert!(second.degraded);
        assert_eq!(outcome.tickets[0].notes.len(), 1);
        assert_eq!(outcome.degraded, 1);
        assert_eq!(fetcher.stats().snapshot().active, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_fetch_stops_child_requests() {
        let api = Arc::new(MockTicketApi::new());
        api.add_tickets((1..=10).map(fixtures::ticket));
        api.set_latency(Duration::from_secs(1));
        let config = quiet_config();
        let fetcher = TicketFetcher::new(api.clone(), &config);

        let result = tokio::time::timeout(
            Duration::from_millis(1500),
            fetcher.fetch(&request(&config, 10).with_concurrency(5)),
        )
        .await;
        assert!(result.is_err(), "fetch should still be running");

        // Five notes requests, then five time entries requests
        let calls_at_drop = api.child_calls();
        assert_eq!(calls_at_drop, 10);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(api.child_calls(), calls_at_drop);
        assert_eq!(fetcher.stats().snapshot().active, 0);
    }
}
