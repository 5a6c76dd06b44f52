//! Helpdesk record types mirrored from the ticketing system.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Status code the ticketing system uses for completed tickets.
///
/// Every other status counts as open.
pub const COMPLETE_STATUS: i32 = 5;

/// A helpdesk ticket.
///
/// Identifiers are assigned by the ticketing system; a re-sync overwrites
/// every field (last write wins).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: i64,
    #[serde(default)]
    pub ticket_number: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<i32>,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub ticket_type: Option<i32>,
    #[serde(default)]
    pub ticket_category: Option<i32>,
    #[serde(default)]
    pub queue_id: Option<i64>,
    #[serde(default)]
    pub create_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub due_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resolved_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_activity_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub company_id: Option<i64>,
    #[serde(default)]
    pub contact_id: Option<i64>,
    #[serde(default)]
    pub assigned_resource_id: Option<i64>,
    #[serde(default)]
    pub resolution: Option<String>,
}

impl Ticket {
    /// Create a ticket with only its identifier set.
    pub fn new(id: i64) -> Self {
        Self {
            id,
            ticket_number: None,
            title: None,
            description: None,
            status: None,
            priority: None,
            ticket_type: None,
            ticket_category: None,
            queue_id: None,
            create_date: None,
            due_date_time: None,
            completed_date: None,
            resolved_date_time: None,
            last_activity_date: None,
            company_id: None,
            contact_id: None,
            assigned_resource_id: None,
            resolution: None,
        }
    }

    /// Whether the ticket is still open. Tickets without a status are open.
    pub fn is_open(&self) -> bool {
        self.status != Some(COMPLETE_STATUS)
    }
}

/// A note attached to a ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: i64,
    pub ticket_id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub note_type: Option<i32>,
    #[serde(default)]
    pub create_date_time: Option<DateTime<Utc>>,
}

/// Time logged by a technician against a ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeEntry {
    pub id: i64,
    pub ticket_id: i64,
    #[serde(default)]
    pub date_worked: Option<DateTime<Utc>>,
    #[serde(default)]
    pub hours_worked: Option<f64>,
    #[serde(default)]
    pub summary_notes: Option<String>,
    #[serde(default)]
    pub resource_id: Option<i64>,
}

/// Parse a timestamp as emitted by the ticketing API.
///
/// The API returns RFC 3339 values (`2024-06-15T10:30:00.123Z`) but older
/// records may lack the offset, in which case UTC is assumed.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|ndt| ndt.and_utc())
        })
}

/// Canonical text form used for storage; sorts lexicographically.
pub fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}
