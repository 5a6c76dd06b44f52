//! Mock ticketing API for testing.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::ticket::{Note, Ticket, TimeEntry};
use crate::upstream::{TicketApi, TicketPageQuery, UpstreamError};

#[derive(Default)]
struct MockState {
    /// Tickets served by cursor emulation, keyed and ordered by id.
    tickets: Vec<Ticket>,
    /// When set, pages are served from this list in order, ignoring the cursor.
    scripted_pages: Option<Vec<Vec<Ticket>>>,
    notes: HashMap<i64, Vec<Note>>,
    time_entries: HashMap<i64, Vec<TimeEntry>>,
    /// Remaining 429 responses per ticket.
    notes_rate_limits: HashMap<i64, u32>,
    time_entries_rate_limits: HashMap<i64, u32>,
    failing_notes: HashSet<i64>,
    failing_time_entries: HashSet<i64>,
    panicking: HashSet<i64>,
    /// Page requests with this `after_id` fail.
    failing_pages: HashSet<i64>,
    page_queries: Vec<TicketPageQuery>,
}

/// Mock implementation of the [`TicketApi`] trait.
///
/// Provides controllable behavior for testing:
/// - Serve tickets page by page, honouring the id cursor and company filter
/// - Serve notes and time entries per ticket
/// - Simulate rate limiting, hard failures, panics and latency
/// - Track page queries and in-flight child requests for assertions
///
/// # Example
///
/// ```rust,ignore
/// use helpdesk_core::testing::{fixtures, MockTicketApi};
///
/// let api = MockTicketApi::new();
/// api.add_tickets((1..=10).map(fixtures::ticket));
/// api.rate_limit_notes(3, 2);      // two 429s, then success
/// api.fail_time_entries(4);        // HTTP 500
///
/// let fetcher = TicketFetcher::new(Arc::new(api), &SyncConfig::default());
/// ```
pub struct MockTicketApi {
    state: Mutex<MockState>,
    latency: Mutex<Duration>,
    in_flight: Arc<AtomicU64>,
    peak_in_flight: Arc<AtomicU64>,
    child_calls: AtomicU64,
}

impl std::fmt::Debug for MockTicketApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTicketApi")
            .field("state", &"<state>")
            .field("in_flight", &self.in_flight.load(Ordering::SeqCst))
            .finish()
    }
}

impl Default for MockTicketApi {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks one in-flight child request.
struct InFlight {
    counter: Arc<AtomicU64>,
}

impl InFlight {
    fn enter(counter: &Arc<AtomicU64>, peak: &AtomicU64) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self {
            counter: Arc::clone(counter),
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockTicketApi {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            latency: Mutex::new(Duration::ZERO),
            in_flight: Arc::new(AtomicU64::new(0)),
            peak_in_flight: Arc::new(AtomicU64::new(0)),
            child_calls: AtomicU64::new(0),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add tickets served through cursor emulation.
    pub fn add_tickets(&self, tickets: impl IntoIterator<Item = Ticket>) {
        let mut state = self.state();
        state.tickets.extend(tickets);
        state.tickets.sort_by_key(|t| t.id);
    }

    /// Serve exactly these pages, in order, regardless of the request.
    pub fn script_pages(&self, pages: Vec<Vec<Ticket>>) {
        self.state().scripted_pages = Some(pages);
    }

    pub fn add_notes(&self, ticket_id: i64, notes: Vec<Note>) {
        self.state().notes.entry(ticket_id).or_default().extend(notes);
    }

    pub fn add_time_entries(&self, ticket_id: i64, entries: Vec<TimeEntry>) {
        self.state()
            .time_entries
            .entry(ticket_id)
            .or_default()
            .extend(entries);
    }

    /// Answer the next `times` notes requests for `ticket_id` with HTTP 429.
    pub fn rate_limit_notes(&self, ticket_id: i64, times: u32) {
        self.state().notes_rate_limits.insert(ticket_id, times);
    }

    /// Answer the next `times` time entry requests for `ticket_id` with HTTP 429.
    pub fn rate_limit_time_entries(&self, ticket_id: i64, times: u32) {
        self.state().time_entries_rate_limits.insert(ticket_id, times);
    }

    /// Notes requests for `ticket_id` fail with HTTP 500.
    pub fn fail_notes(&self, ticket_id: i64) {
        self.state().failing_notes.insert(ticket_id);
    }

    /// Time entry requests for `ticket_id` fail with HTTP 500.
    pub fn fail_time_entries(&self, ticket_id: i64) {
        self.state().failing_time_entries.insert(ticket_id);
    }

    /// Child requests for `ticket_id` panic.
    pub fn panic_on(&self, ticket_id: i64) {
        self.state().panicking.insert(ticket_id);
    }

    /// The page request with this cursor fails with HTTP 500.
    pub fn fail_page_after(&self, after_id: i64) {
        self.state().failing_pages.insert(after_id);
    }

    /// Delay applied to every child request.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap_or_else(|e| e.into_inner()) = latency;
    }

    /// Page queries received so far.
    pub fn page_queries(&self) -> Vec<TicketPageQuery> {
        self.state().page_queries.clone()
    }

    /// Highest number of child requests observed in flight at once.
    pub fn peak_in_flight(&self) -> u64 {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Total child requests received.
    pub fn child_calls(&self) -> u64 {
        self.child_calls.load(Ordering::SeqCst)
    }

    async fn child_request(&self, ticket_id: i64, notes: bool) -> Result<(), UpstreamError> {
        self.child_calls.fetch_add(1, Ordering::SeqCst);
        let _in_flight = InFlight::enter(&self.in_flight, &self.peak_in_flight);

        let latency = *self.latency.lock().unwrap_or_else(|e| e.into_inner());
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut guard = self.state();
        if guard.panicking.contains(&ticket_id) {
            drop(guard);
            panic!("mock panic while fetching children of ticket {}", ticket_id);
        }

        let state = &mut *guard;
        let (limits, failing) = if notes {
            (&mut state.notes_rate_limits, &state.failing_notes)
        } else {
            (&mut state.time_entries_rate_limits, &state.failing_time_entries)
        };
        if failing.contains(&ticket_id) {
            return Err(UpstreamError::Status {
                status: 500,
                body: "internal error".to_string(),
            });
        }
        if let Some(remaining) = limits.get_mut(&ticket_id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(UpstreamError::RateLimited);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TicketApi for MockTicketApi {
    async fn query_tickets(&self, query: &TicketPageQuery) -> Result<Vec<Ticket>, UpstreamError> {
        let mut state = self.state();
        state.page_queries.push(query.clone());

        if state.failing_pages.contains(&query.after_id) {
            return Err(UpstreamError::Status {
                status: 500,
                body: "page unavailable".to_string(),
            });
        }

        if let Some(pages) = state.scripted_pages.as_mut() {
            if pages.is_empty() {
                return Ok(Vec::new());
            }
            return Ok(pages.remove(0));
        }

        Ok(state
            .tickets
            .iter()
            .filter(|t| t.id > query.after_id)
            .filter(|t| query.company_id.is_none() || t.company_id == query.company_id)
            .take(query.max_records as usize)
            .cloned()
            .collect())
    }

    async fn ticket_notes(
        &self,
        ticket_id: i64,
        max_records: u32,
    ) -> Result<Vec<Note>, UpstreamError> {
        self.child_request(ticket_id, true).await?;
        let state = self.state();
        Ok(state
            .notes
            .get(&ticket_id)
            .map(|n| n.iter().take(max_records as usize).cloned().collect())
            .unwrap_or_default())
    }

    async fn ticket_time_entries(
        &self,
        ticket_id: i64,
        max_records: u32,
    ) -> Result<Vec<TimeEntry>, UpstreamError> {
        self.child_request(ticket_id, false).await?;
        let state = self.state();
        Ok(state
            .time_entries
            .get(&ticket_id)
            .map(|e| e.iter().take(max_records as usize).cloned().collect())
            .unwrap_or_default())
    }
}
