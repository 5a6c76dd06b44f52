//! Types shared by the fetch pipeline and the sync service.

use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::SyncConfig;
use crate::ticket::{Note, Ticket, TimeEntry};
use crate::upstream::{UpstreamError, FILTER_DATE_FORMAT};

/// Errors that abort a fetch or sync run.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Invalid date range: {0}")]
    InvalidRange(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A ticket page could not be retrieved. Pages are never skipped.
    #[error("Failed to fetch tickets after id {after_id}: {source}")]
    PageFetch {
        after_id: i64,
        #[source]
        source: UpstreamError,
    },

    /// The API returned a full page whose ids do not move past the cursor.
    #[error("Pagination cursor did not advance (cursor {cursor}, page max id {page_max})")]
    CursorStalled { cursor: i64, page_max: i64 },
}

/// Inclusive creation-date window, in the API's local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl DateRange {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self, SyncError> {
        if start >= end {
            return Err(SyncError::InvalidRange(
                "Start date must be before end date".to_string(),
            ));
        }
        Ok(Self { start, end })
    }

    /// From midnight `days` days ago to the last second of `now`'s day.
    pub fn last_days(days: u64, now: NaiveDateTime) -> Self {
        let today = now.date();
        let start_day = today.checked_sub_days(Days::new(days)).unwrap_or(NaiveDate::MIN);
        Self {
            start: start_day.and_time(NaiveTime::MIN),
            end: today.and_time(end_of_day()),
        }
    }

    /// Parse `YYYY-MM-DD` or `YYYY-MM-DDTHH:MM:SS` bounds. Bare dates mean
    /// midnight.
    pub fn parse(start: &str, end: &str) -> Result<Self, SyncError> {
        let start = parse_bound(start)?;
        let end = parse_bound(end)?;
        Self::new(start, end)
    }

    pub fn view(&self) -> DateRangeView {
        DateRangeView {
            start: self.start.format(FILTER_DATE_FORMAT).to_string(),
            end: self.end.format(FILTER_DATE_FORMAT).to_string(),
        }
    }
}

fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN)
}

fn parse_bound(value: &str) -> Result<NaiveDateTime, SyncError> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(dt);
        }
    }
    Err(SyncError::InvalidRange(format!(
        "Invalid date format '{}'. Use ISO format (YYYY-MM-DD)",
        value
    )))
}

/// Date range as reported back to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRangeView {
    pub start: String,
    pub end: String,
}

/// Parameters of one fetch run.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub range: DateRange,
    pub company_id: Option<i64>,
    /// Tickets requested per page.
    pub page_size: u32,
    /// Per-ticket detail fetches allowed in flight at once.
    pub concurrency: usize,
}

impl FetchRequest {
    /// Request over `range` using the configured page size and concurrency.
    pub fn new(range: DateRange, config: &SyncConfig) -> Self {
        Self {
            range,
            company_id: None,
            page_size: config.max_tickets_per_request,
            concurrency: config.max_concurrent_requests,
        }
    }

    pub fn with_company(mut self, company_id: Option<i64>) -> Self {
        self.company_id = company_id;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn validate(&self, config: &SyncConfig) -> Result<(), SyncError> {
        if self.page_size == 0 || self.page_size > config.max_fetch_limit {
            return Err(SyncError::InvalidRequest(format!(
                "max_tickets must be between 1 and {}",
                config.max_fetch_limit
            )));
        }
        if self.concurrency == 0 || self.concurrency > config.max_concurrency_limit {
            return Err(SyncError::InvalidRequest(format!(
                "concurrent_limit must be between 1 and {}",
                config.max_concurrency_limit
            )));
        }
        if self.range.start >= self.range.end {
            return Err(SyncError::InvalidRange(
                "Start date must be before end date".to_string(),
            ));
        }
        Ok(())
    }
}

/// A ticket together with its notes and time entries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedTicket {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub notes: Vec<Note>,
    pub time_entries: Vec<TimeEntry>,
    /// Set when a child collection is empty because it could not be fetched.
    pub degraded: bool,
}

impl EnrichedTicket {
    /// The ticket with no children, marked degraded.
    pub fn bare(ticket: Ticket) -> Self {
        Self {
            ticket,
            notes: Vec::new(),
            time_entries: Vec::new(),
            degraded: true,
        }
    }

    pub fn id(&self) -> i64 {
        self.ticket.id
    }
}

/// Result of a completed fetch run.
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    /// Every fetched ticket, in page order.
    pub tickets: Vec<EnrichedTicket>,
    pub pages: u32,
    /// Highest ticket id seen; 0 when nothing matched.
    pub final_cursor: i64,
    pub degraded: usize,
}

/// Counters reported at the end of a sync.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncStats {
    pub tickets_processed: usize,
    pub tickets_inserted: usize,
    pub notes_inserted: usize,
    pub time_entries_inserted: usize,
    pub degraded_tickets: usize,
    pub errors: Vec<String>,
}

/// Response body of a sync run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    pub status: String,
    pub date_range: DateRangeView,
    pub statistics: SyncStats,
}
