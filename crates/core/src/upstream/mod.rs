//! Client for the ticketing system's REST API.
//!
//! [`TicketApi`] is the seam the sync engine talks to; [`UpstreamClient`]
//! implements it over HTTP.

mod client;
mod types;

pub use client::{Resource, UpstreamClient};
pub use types::*;

use async_trait::async_trait;
use thiserror::Error;

use crate::ticket::{Note, Ticket, TimeEntry};

/// Errors returned by the ticketing API.
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    /// HTTP 429. The only condition worth retrying.
    #[error("Rate limit exceeded (HTTP 429)")]
    RateLimited,

    /// Any other non-success status.
    #[error("API error: {status} - {body}")]
    Status { status: u16, body: String },

    #[error("Request timed out")]
    Timeout,

    /// Connection or transport failure.
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// Credentials that cannot be sent as headers, or a client that
    /// could not be built.
    #[error("Client not configured: {0}")]
    NotConfigured(String),
}

impl UpstreamError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, UpstreamError::RateLimited)
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            UpstreamError::Timeout
        } else if e.is_decode() {
            UpstreamError::Parse(e.to_string())
        } else {
            UpstreamError::Http(e.to_string())
        }
    }
}

/// Read access to tickets and their child records.
#[async_trait]
pub trait TicketApi: Send + Sync {
    /// One page of tickets, ordered by id.
    async fn query_tickets(&self, query: &TicketPageQuery) -> Result<Vec<Ticket>, UpstreamError>;

    /// Notes attached to a ticket.
    async fn ticket_notes(&self, ticket_id: i64, max_records: u32)
        -> Result<Vec<Note>, UpstreamError>;

    /// Time entries logged against a ticket.
    async fn ticket_time_entries(
        &self,
        ticket_id: i64,
        max_records: u32,
    ) -> Result<Vec<TimeEntry>, UpstreamError>;
}
