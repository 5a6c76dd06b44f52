//! Per-ticket detail fetching: notes and time entries under a shared
//! concurrency limit.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::retry::{ChildEntity, RetryPolicy};
use super::types::EnrichedTicket;
use crate::config::SyncConfig;
use crate::metrics;
use crate::ticket::Ticket;
use crate::upstream::TicketApi;

/// Counters for detail fetches. Shared by every task of a fetcher.
#[derive(Debug, Default)]
pub struct FetchStats {
    active: AtomicU64,
    peak_active: AtomicU64,
    completed: AtomicU64,
    degraded: AtomicU64,
}

/// Point-in-time copy of [`FetchStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FetchStatsSnapshot {
    pub active: u64,
    pub peak_active: u64,
    pub completed: u64,
    pub degraded: u64,
}

impl FetchStats {
    pub fn snapshot(&self) -> FetchStatsSnapshot {
        FetchStatsSnapshot {
            active: self.active.load(Ordering::SeqCst),
            peak_active: self.peak_active.load(Ordering::SeqCst),
            completed: self.completed.load(Ordering::SeqCst),
            degraded: self.degraded.load(Ordering::SeqCst),
        }
    }
}

/// Marks one fetch as active for as long as it is alive.
struct ActiveGuard {
    stats: Arc<FetchStats>,
}

impl ActiveGuard {
    fn enter(stats: &Arc<FetchStats>) -> Self {
        let now = stats.active.fetch_add(1, Ordering::SeqCst) + 1;
        stats.peak_active.fetch_max(now, Ordering::SeqCst);
        metrics::DETAIL_FETCHES_IN_FLIGHT.inc();
        Self {
            stats: Arc::clone(stats),
        }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.stats.active.fetch_sub(1, Ordering::SeqCst);
        metrics::DETAIL_FETCHES_IN_FLIGHT.dec();
    }
}

/// Fetches the notes and time entries of one ticket at a time.
#[derive(Clone)]
pub struct DetailFetcher {
    api: Arc<dyn TicketApi>,
    retry: RetryPolicy,
    politeness_delay: Duration,
    sub_request_delay: Duration,
    page_size: u32,
    stats: Arc<FetchStats>,
}

impl DetailFetcher {
    pub fn new(api: Arc<dyn TicketApi>, config: &SyncConfig) -> Self {
        Self {
            api,
            retry: RetryPolicy::from_config(config),
            politeness_delay: Duration::from_millis(config.politeness_delay_ms),
            sub_request_delay: Duration::from_millis(config.sub_request_delay_ms),
            page_size: config.detail_page_size,
            stats: Arc::new(FetchStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<FetchStats> {
        Arc::clone(&self.stats)
    }

    /// Attach notes and time entries to `ticket`.
    ///
    /// Holds one permit of `permits` for the whole fetch, released on every
    /// exit path. A child collection that cannot be fetched is left empty
    /// and the result is marked degraded; this never fails.
    pub async fn enrich(&self, ticket: Ticket, permits: Arc<Semaphore>) -> EnrichedTicket {
        let ticket_id = ticket.id;

        let _permit = match permits.acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                warn!(ticket_id, "Detail fetch semaphore closed, skipping children");
                return self.finish(EnrichedTicket::bare(ticket));
            }
        };
        let _active = ActiveGuard::enter(&self.stats);

        tokio::time::sleep(self.politeness_delay).await;

        let api = Arc::clone(&self.api);
        let page_size = self.page_size;
        let notes = self
            .retry
            .run(ChildEntity::Notes, ticket_id, || {
                let api = Arc::clone(&api);
                async move { api.ticket_notes(ticket_id, page_size).await }
            })
            .await;

        tokio::time::sleep(self.sub_request_delay).await;

        let time_entries = self
            .retry
            .run(ChildEntity::TimeEntries, ticket_id, || {
                let api = Arc::clone(&api);
                async move { api.ticket_time_entries(ticket_id, page_size).await }
            })
            .await;

        let degraded = notes.is_degraded() || time_entries.is_degraded();
        let enriched = EnrichedTicket {
            ticket,
            notes: notes.into_items(),
            time_entries: time_entries.into_items(),
            degraded,
        };

        debug!(
            ticket_id,
            notes = enriched.notes.len(),
            time_entries = enriched.time_entries.len(),
            degraded,
            "Ticket details fetched"
        );

        self.finish(enriched)
    }

    /// Record a finished ticket in the counters.
    pub(crate) fn finish(&self, enriched: EnrichedTicket) -> EnrichedTicket {
        self.stats.completed.fetch_add(1, Ordering::SeqCst);
        if enriched.degraded {
            self.stats.degraded.fetch_add(1, Ordering::SeqCst);
            metrics::DEGRADED_TICKETS.inc();
        }
        enriched
    }
}
