//! Stored ticket API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use helpdesk_core::ticket::{Note, StoreError, Ticket, TicketQuery, TimeEntry};

use super::{error_response, ErrorResponse};
use crate::state::AppState;

/// Maximum allowed limit for ticket queries
const MAX_LIMIT: usize = 1000;

/// Default limit for ticket queries
const DEFAULT_LIMIT: usize = 100;

type ApiError = (StatusCode, Json<ErrorResponse>);

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for listing tickets
#[derive(Debug, Default, Deserialize)]
pub struct ListTicketsParams {
    pub ticket_number: Option<String>,
    pub company_id: Option<i64>,
    pub status: Option<i32>,
    /// `true` for open tickets, `false` for completed ones
    pub is_open: Option<bool>,
    pub priority: Option<i32>,
    pub queue_id: Option<i64>,
    pub assigned_resource_id: Option<i64>,
    pub contact_id: Option<i64>,
    /// Creation date lower bound (YYYY-MM-DD)
    pub start_date: Option<String>,
    /// Creation date upper bound (YYYY-MM-DD)
    pub end_date: Option<String>,
    /// Substring of the title or description
    pub text: Option<String>,
    /// `true` for tickets with a recorded resolution
    pub has_resolution: Option<bool>,
    /// Maximum number of tickets to return
    pub limit: Option<usize>,
}

impl ListTicketsParams {
    fn query(&self) -> TicketQuery {
        TicketQuery {
            ticket_id: None,
            ticket_number: self.ticket_number.clone(),
            company_id: self.company_id,
            status: self.status,
            is_open: self.is_open,
            priority: self.priority,
            queue_id: self.queue_id,
            assigned_resource_id: self.assigned_resource_id,
            contact_id: self.contact_id,
            start_date: self.start_date.clone(),
            end_date: self.end_date.clone(),
            text: self.text.clone(),
            has_resolution: self.has_resolution,
        }
    }
}

/// Response for listing tickets
#[derive(Debug, Serialize)]
pub struct ListTicketsResponse {
    pub tickets: Vec<Ticket>,
    /// Number of tickets matching the filters, beyond `limit` too
    pub total: i64,
    pub limit: usize,
}

/// One ticket with its children
#[derive(Debug, Serialize)]
pub struct TicketDetailResponse {
    pub ticket: Ticket,
    pub notes: Vec<Note>,
    pub time_entries: Vec<TimeEntry>,
}

// ============================================================================
// Handlers
// ============================================================================

/// List stored tickets, newest first
pub async fn list_tickets(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListTicketsParams>,
) -> Result<Json<ListTicketsResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let query = params.query();

    let total = state.store().count(&query).map_err(store_error)?;
    let tickets = state.store().search(&query, limit).map_err(store_error)?;

    Ok(Json(ListTicketsResponse {
        tickets,
        total,
        limit,
    }))
}

/// Get one ticket with its notes and time entries
pub async fn get_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<TicketDetailResponse>, ApiError> {
    let store = state.store();
    let ticket = store
        .get_ticket(id)
        .map_err(store_error)?
        .ok_or_else(|| {
            error_response(StatusCode::NOT_FOUND, format!("Ticket not found: {}", id))
        })?;
    let notes = store.notes_for(id).map_err(store_error)?;
    let time_entries = store.time_entries_for(id).map_err(store_error)?;

    Ok(Json(TicketDetailResponse {
        ticket,
        notes,
        time_entries,
    }))
}

pub(crate) fn store_error(e: StoreError) -> ApiError {
    match e {
        StoreError::InvalidQuery(_) => error_response(StatusCode::BAD_REQUEST, e.to_string()),
        StoreError::Database(_) => {
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
