//! Ticket synchronization from the ticketing API.
//!
//! - [`TicketFetcher`] pages through tickets by id cursor and enriches each
//!   page concurrently under a semaphore.
//! - [`DetailFetcher`] fetches one ticket's notes and time entries with
//!   politeness delays.
//! - [`RetryPolicy`] retries rate-limited child requests with backoff and
//!   degrades everything else to an empty collection.
//! - [`SyncService`] persists the result through a [`crate::ticket::TicketStore`].

mod detail;
mod fetcher;
mod retry;
mod service;
mod types;

pub use detail::{DetailFetcher, FetchStats, FetchStatsSnapshot};
pub use fetcher::TicketFetcher;
pub use retry::{ChildEntity, ChildFetch, DegradeReason, RetryPolicy};
pub use service::{store_enriched, SyncService};
pub use types::{
    DateRange, DateRangeView, EnrichedTicket, FetchOutcome, FetchRequest, SyncError, SyncReport,
    SyncStats,
};
