//! Wire types for the ticketing REST API.
//!
//! Records are decoded at this boundary into the typed domain structs in
//! [`crate::ticket`]; nothing past this module handles raw JSON.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ticket::{parse_timestamp, Note, Ticket, TimeEntry};

/// Timestamp layout the API expects in filter values.
pub const FILTER_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Comparison operator in a query filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// One `{field, op, value}` condition. Conditions in a request are ANDed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryFilter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl QueryFilter {
    pub fn new(field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }
}

/// Body of a `POST /{Entity}/query` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(rename = "MaxRecords")]
    pub max_records: u32,
    #[serde(rename = "IncludeFields", default)]
    pub include_fields: Vec<String>,
    #[serde(rename = "Filter")]
    pub filter: Vec<QueryFilter>,
}

impl QueryRequest {
    pub fn new(max_records: u32) -> Self {
        Self {
            max_records,
            include_fields: Vec::new(),
            filter: Vec::new(),
        }
    }

    pub fn filter(mut self, filter: QueryFilter) -> Self {
        self.filter.push(filter);
        self
    }

    /// Query for every child record of one ticket.
    pub fn for_ticket(ticket_id: i64, max_records: u32) -> Self {
        Self::new(max_records).filter(QueryFilter::new("ticketID", FilterOp::Eq, ticket_id))
    }
}

/// Envelope of a query response.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryResponse<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

/// Parameters of one ticket page request.
#[derive(Debug, Clone, PartialEq)]
pub struct TicketPageQuery {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    /// Only tickets with an id strictly greater than this are returned.
    pub after_id: i64,
    pub company_id: Option<i64>,
    pub max_records: u32,
}

impl TicketPageQuery {
    pub fn to_request(&self) -> QueryRequest {
        let mut request = QueryRequest::new(self.max_records)
            .filter(QueryFilter::new(
                "createDate",
                FilterOp::Gte,
                self.start.format(FILTER_DATE_FORMAT).to_string(),
            ))
            .filter(QueryFilter::new(
                "createDate",
                FilterOp::Lte,
                self.end.format(FILTER_DATE_FORMAT).to_string(),
            ))
            .filter(QueryFilter::new("id", FilterOp::Gt, self.after_id));

        if let Some(company_id) = self.company_id {
            request = request.filter(QueryFilter::new("companyID", FilterOp::Eq, company_id));
        }
        request
    }
}

fn timestamp(value: Option<String>) -> Option<chrono::DateTime<chrono::Utc>> {
    value.as_deref().and_then(parse_timestamp)
}

/// Ticket as returned by `Tickets/query`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiTicket {
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
    #[serde(default, rename = "queueID")]
    pub queue_id: Option<i64>,
    #[serde(default)]
    pub create_date: Option<String>,
    #[serde(default)]
    pub due_date_time: Option<String>,
    #[serde(default)]
    pub completed_date: Option<String>,
    #[serde(default)]
    pub resolved_date_time: Option<String>,
    #[serde(default)]
    pub last_activity_date: Option<String>,
    #[serde(default, rename = "companyID")]
    pub company_id: Option<i64>,
    #[serde(default, rename = "contactID")]
    pub contact_id: Option<i64>,
    #[serde(default, rename = "assignedResourceID")]
    pub assigned_resource_id: Option<i64>,
    #[serde(default)]
    pub resolution: Option<String>,
}

impl From<ApiTicket> for Ticket {
    fn from(t: ApiTicket) -> Self {
        Ticket {
            id: t.id,
            ticket_number: t.ticket_number,
            title: t.title,
            description: t.description,
            status: t.status,
            priority: t.priority,
            ticket_type: t.ticket_type,
            ticket_category: t.ticket_category,
            queue_id: t.queue_id,
            create_date: timestamp(t.create_date),
            due_date_time: timestamp(t.due_date_time),
            completed_date: timestamp(t.completed_date),
            resolved_date_time: timestamp(t.resolved_date_time),
            last_activity_date: timestamp(t.last_activity_date),
            company_id: t.company_id,
            contact_id: t.contact_id,
            assigned_resource_id: t.assigned_resource_id,
            resolution: t.resolution,
        }
    }
}

/// Note as returned by `TicketNotes/query`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiNote {
    pub id: i64,
    #[serde(rename = "ticketID")]
    pub ticket_id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub note_type: Option<i32>,
    #[serde(default)]
    pub create_date_time: Option<String>,
}

impl From<ApiNote> for Note {
    fn from(n: ApiNote) -> Self {
        Note {
            id: n.id,
            ticket_id: n.ticket_id,
            title: n.title,
            description: n.description,
            note_type: n.note_type,
            create_date_time: timestamp(n.create_date_time),
        }
    }
}

/// Time entry as returned by `TimeEntries/query`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiTimeEntry {
    pub id: i64,
    #[serde(rename = "ticketID")]
    pub ticket_id: i64,
    #[serde(default)]
    pub date_worked: Option<String>,
    #[serde(default)]
    pub hours_worked: Option<f64>,
    #[serde(default)]
    pub summary_notes: Option<String>,
    #[serde(default, rename = "resourceID")]
    pub resource_id: Option<i64>,
}

impl From<ApiTimeEntry> for TimeEntry {
    fn from(e: ApiTimeEntry) -> Self {
        TimeEntry {
            id: e.id,
            ticket_id: e.ticket_id,
            date_worked: timestamp(e.date_worked),
            hours_worked: e.hours_worked,
            summary_notes: e.summary_notes,
            resource_id: e.resource_id,
        }
    }
}
