//! Ticket storage trait and query types.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::{parse_timestamp, Note, Ticket, TimeEntry};

/// Error type for storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// Filters applied when searching, counting or aggregating tickets.
///
/// Unset fields do not constrain the result. Dates accept `YYYY-MM-DD`
/// (expanded to the whole day) or a full timestamp and apply to the
/// ticket's creation date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TicketQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<i64>,
    /// Exact ticket number, e.g. `T20240501.0042`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<i32>,
    /// `true` excludes completed tickets, `false` keeps only completed ones.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_open: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_resource_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    /// Case-insensitive substring of the title or description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// `true` keeps tickets with a non-blank resolution, `false` those without.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_resolution: Option<bool>,
}

impl TicketQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_company(mut self, company_id: i64) -> Self {
        self.company_id = Some(company_id);
        self
    }

    pub fn with_status(mut self, status: i32) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_open(mut self, is_open: bool) -> Self {
        self.is_open = Some(is_open);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_dates(mut self, start: impl Into<String>, end: impl Into<String>) -> Self {
        self.start_date = Some(start.into());
        self.end_date = Some(end.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_ticket_number(mut self, ticket_number: impl Into<String>) -> Self {
        self.ticket_number = Some(ticket_number.into());
        self
    }

    pub fn with_resolution(mut self, has_resolution: bool) -> Self {
        self.has_resolution = Some(has_resolution);
        self
    }

    /// True when no filter is set.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Resolve a user-supplied date to the stored timestamp format.
///
/// Bare dates expand to the first (or last, when `end_of_day`) second of
/// the day.
pub(crate) fn date_bound(value: &str, end_of_day: bool) -> Result<String, StoreError> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        let time = if end_of_day { "23:59:59" } else { "00:00:00" };
        return Ok(format!("{}T{}Z", date.format("%Y-%m-%d"), time));
    }
    parse_timestamp(value)
        .map(|ts| super::types::format_timestamp(&ts))
        .ok_or_else(|| StoreError::InvalidQuery(format!("unrecognized date '{}'", value)))
}

/// Ticket column a count aggregation can group by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupField {
    Status,
    Priority,
    CompanyId,
    AssignedResourceId,
    ContactId,
    QueueId,
    TicketType,
}

impl GroupField {
    pub fn column(&self) -> &'static str {
        match self {
            GroupField::Status => "status",
            GroupField::Priority => "priority",
            GroupField::CompanyId => "company_id",
            GroupField::AssignedResourceId => "assigned_resource_id",
            GroupField::ContactId => "contact_id",
            GroupField::QueueId => "queue_id",
            GroupField::TicketType => "ticket_type",
        }
    }
}

/// Key used to total logged hours.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeGroup {
    #[default]
    TicketId,
    ResourceId,
}

impl TimeGroup {
    pub fn column(&self) -> &'static str {
        match self {
            TimeGroup::TicketId => "ticket_id",
            TimeGroup::ResourceId => "resource_id",
        }
    }
}

/// Number of tickets sharing a group key. `None` collects unset values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupCount {
    pub key: Option<i64>,
    pub count: i64,
}

/// Hours logged for a group key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeTotal {
    pub key: Option<i64>,
    pub total_hours: f64,
    pub entry_count: i64,
}

/// A ticket with its cached summary and detail totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub ticket: Ticket,
    pub summary: Option<String>,
    pub notes_count: i64,
    pub time_entries_count: i64,
    pub total_hours: f64,
}

/// Row counts per table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    pub tickets: i64,
    pub open_tickets: i64,
    pub notes: i64,
    pub time_entries: i64,
}

/// Trait for ticket storage backends.
///
/// Writes are keyed on the upstream identifier: writing a record that
/// already exists replaces it.
pub trait TicketStore: Send + Sync {
    /// Insert or replace a ticket.
    fn upsert_ticket(&self, ticket: &Ticket) -> Result<(), StoreError>;

    /// Insert or replace notes. Returns the number written.
    fn upsert_notes(&self, notes: &[Note]) -> Result<usize, StoreError>;

    /// Insert or replace time entries. Returns the number written.
    fn upsert_time_entries(&self, entries: &[TimeEntry]) -> Result<usize, StoreError>;

    fn get_ticket(&self, id: i64) -> Result<Option<Ticket>, StoreError>;

    fn notes_for(&self, ticket_id: i64) -> Result<Vec<Note>, StoreError>;

    fn time_entries_for(&self, ticket_id: i64) -> Result<Vec<TimeEntry>, StoreError>;

    /// Tickets matching the query, most recently created first.
    fn search(&self, query: &TicketQuery, limit: usize) -> Result<Vec<Ticket>, StoreError>;

    /// Tickets matching the query, most recently resolved first. Tickets
    /// never resolved come last.
    fn search_resolved(&self, query: &TicketQuery, limit: usize)
        -> Result<Vec<Ticket>, StoreError>;

    fn find_by_number(&self, ticket_number: &str) -> Result<Option<Ticket>, StoreError>;

    fn count(&self, query: &TicketQuery) -> Result<i64, StoreError>;

    /// Ticket counts per value of `field`, largest first.
    fn aggregate_tickets(
        &self,
        query: &TicketQuery,
        field: GroupField,
    ) -> Result<Vec<GroupCount>, StoreError>;

    /// Logged hours per key, largest first, at most `limit` groups.
    fn aggregate_time(&self, group: TimeGroup, limit: usize) -> Result<Vec<TimeTotal>, StoreError>;

    fn stats(&self) -> Result<StoreStats, StoreError>;

    /// Newest tickets with their cached summary, note count and logged
    /// hours. `with_summary_only` skips tickets that have no summary yet.
    fn summary_rows(
        &self,
        limit: usize,
        with_summary_only: bool,
    ) -> Result<Vec<SummaryRow>, StoreError>;

    /// Cache a generated summary. Returns false when the ticket is unknown.
    /// Syncs never overwrite it.
    fn save_summary(&self, ticket_id: i64, summary: &str) -> Result<bool, StoreError>;

    /// Cheap round-trip to verify the backend is reachable.
    fn health_check(&self) -> Result<(), StoreError>;
}
