//! Helpdesk tickets, their notes and time entries, and local persistence.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteTicketStore;
pub use store::{
    GroupCount, GroupField, StoreError, StoreStats, SummaryRow, TicketQuery, TicketStore, TimeGroup,
    TimeTotal,
};
pub use types::{format_timestamp, parse_timestamp, Note, Ticket, TimeEntry, COMPLETE_STATUS};
