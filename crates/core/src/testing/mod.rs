//! Testing utilities and mock implementations.
//!
//! Mocks of the external service traits, so sync runs and chat requests
//! can be exercised without the ticketing API or an LLM provider.
//!
//! # Example
//!
//! ```rust,ignore
//! use helpdesk_core::testing::{fixtures, MockLlmClient, MockTicketApi};
//!
//! let api = MockTicketApi::new();
//! api.add_tickets((1..=1120).map(fixtures::ticket));
//! api.fail_time_entries(7);
//!
//! let llm = MockLlmClient::new();
//! llm.push_response(r#"{"action": "count_tickets"}"#);
//! ```

mod mock_llm_client;
mod mock_ticket_api;

pub use mock_llm_client::MockLlmClient;
pub use mock_ticket_api::MockTicketApi;

/// Test fixtures and helper functions.
pub mod fixtures {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use crate::ticket::{Note, Ticket, TimeEntry};

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0)
            .single()
            .unwrap_or_default()
    }

    /// Create a new, medium priority ticket. Later ids are created later.
    pub fn ticket(id: i64) -> Ticket {
        let mut ticket = Ticket::new(id);
        ticket.ticket_number = Some(format!("T2024{:04}", id));
        ticket.title = Some(format!("Printer offline #{}", id));
        ticket.description = Some("The office printer stopped responding.".to_string());
        ticket.status = Some(1);
        ticket.priority = Some(2);
        ticket.queue_id = Some(14046773);
        ticket.company_id = Some(100 + id % 3);
        ticket.create_date = Some(base_time() + Duration::minutes(id));
        ticket
    }

    /// Create a note on `ticket_id`.
    pub fn note(id: i64, ticket_id: i64) -> Note {
        Note {
            id,
            ticket_id,
            title: Some(format!("Note {}", id)),
            description: Some("Called the customer.".to_string()),
            note_type: Some(1),
            create_date_time: Some(base_time() + Duration::minutes(id)),
        }
    }

    /// Create a time entry of `hours` on `ticket_id`.
    pub fn time_entry(id: i64, ticket_id: i64, hours: f64) -> TimeEntry {
        TimeEntry {
            id,
            ticket_id,
            date_worked: Some(base_time() + Duration::hours(id)),
            hours_worked: Some(hours),
            summary_notes: Some("Remote session".to_string()),
            resource_id: Some(29682000 + id % 2),
        }
    }
}
