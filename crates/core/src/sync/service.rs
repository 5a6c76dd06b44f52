//! Sync runs: fetch a window of tickets and persist them.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use super::fetcher::TicketFetcher;
use super::types::{EnrichedTicket, FetchRequest, SyncError, SyncReport, SyncStats};
use crate::metrics;
use crate::ticket::TicketStore;

/// Fetches tickets from the ticketing API and writes them to the store.
pub struct SyncService {
    fetcher: TicketFetcher,
    store: Arc<dyn TicketStore>,
}

impl SyncService {
    pub fn new(fetcher: TicketFetcher, store: Arc<dyn TicketStore>) -> Self {
        Self { fetcher, store }
    }

    pub fn fetcher(&self) -> &TicketFetcher {
        &self.fetcher
    }

    /// Fetch every ticket in the request's window and upsert it with its
    /// notes and time entries.
    ///
    /// Only a fetch failure is an error. Individual write failures are
    /// collected in the report's `errors`.
    pub async fn run(&self, request: &FetchRequest) -> Result<SyncReport, SyncError> {
        let started = Instant::now();

        let outcome = match self.fetcher.fetch(request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                metrics::SYNC_DURATION
                    .with_label_values(&["failed"])
                    .observe(started.elapsed().as_secs_f64());
                return Err(e);
            }
        };

        let statistics = store_enriched(self.store.as_ref(), &outcome.tickets);

        metrics::SYNC_DURATION
            .with_label_values(&["success"])
            .observe(started.elapsed().as_secs_f64());
        info!(
            tickets = statistics.tickets_inserted,
            notes = statistics.notes_inserted,
            time_entries = statistics.time_entries_inserted,
            degraded = statistics.degraded_tickets,
            errors = statistics.errors.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Sync complete"
        );

        Ok(SyncReport {
            status: "success".to_string(),
            date_range: request.range.view(),
            statistics,
        })
    }
}

/// Upsert fetched tickets and their children.
///
/// The ticket row comes first: if it cannot be written its children are
/// skipped, while a failed child write leaves the ticket row in place.
pub fn store_enriched(store: &dyn TicketStore, tickets: &[EnrichedTicket]) -> SyncStats {
    let mut stats = SyncStats::default();
    info!(count = tickets.len(), "Storing tickets");

    for enriched in tickets {
        let ticket_id = enriched.id();
        stats.tickets_processed += 1;
        if enriched.degraded {
            stats.degraded_tickets += 1;
        }

        if let Err(e) = store.upsert_ticket(&enriched.ticket) {
            warn!(ticket_id, error = %e, "Failed to store ticket");
            stats.errors.push(format!("Ticket {}: {}", ticket_id, e));
            continue;
        }
        stats.tickets_inserted += 1;

        match store.upsert_notes(&enriched.notes) {
            Ok(n) => stats.notes_inserted += n,
            Err(e) => {
                warn!(ticket_id, error = %e, "Failed to store notes");
                stats.errors.push(format!("Notes for ticket {}: {}", ticket_id, e));
            }
        }

        match store.upsert_time_entries(&enriched.time_entries) {
            Ok(n) => stats.time_entries_inserted += n,
            Err(e) => {
                warn!(ticket_id, error = %e, "Failed to store time entries");
                stats
                    .errors
                    .push(format!("Time entries for ticket {}: {}", ticket_id, e));
            }
        }

        debug!(
            ticket_id,
            notes = enriched.notes.len(),
            time_entries = enriched.time_entries.len(),
            "Stored ticket"
        );
    }

    stats
}
