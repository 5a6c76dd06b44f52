//! Sync API handlers.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use chrono::Local;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info};

use helpdesk_core::{DateRange, FetchRequest, SyncError, SyncReport};

use super::{error_response, ErrorResponse};
use crate::metrics::SYNC_REQUESTS;
use crate::state::AppState;

type ApiError = (StatusCode, Json<ErrorResponse>);

// ============================================================================
// Request Types
// ============================================================================

/// Optional body of the rolling-window sync routes.
#[derive(Debug, Default, Deserialize)]
pub struct SyncBody {
    pub company_id: Option<i64>,
    /// Tickets per page (1 to the configured fetch limit).
    pub max_tickets: Option<i64>,
    /// Detail fetches in flight (1 to the configured concurrency limit).
    pub concurrent_limit: Option<i64>,
}

/// Body of `POST /sync/custom`.
#[derive(Debug, Deserialize)]
pub struct CustomSyncBody {
    pub start_date: String,
    pub end_date: String,
    pub company_id: Option<i64>,
    pub max_tickets: Option<i64>,
    pub concurrent_limit: Option<i64>,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn sync_last_7_days(
    State(state): State<Arc<AppState>>,
    body: Option<Json<SyncBody>>,
) -> Result<Json<SyncReport>, ApiError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let range = DateRange::last_days(7, Local::now().naive_local());
    run_sync(&state, "7d", range, body.company_id, body.max_tickets, body.concurrent_limit).await
}

pub async fn sync_last_30_days(
    State(state): State<Arc<AppState>>,
    body: Option<Json<SyncBody>>,
) -> Result<Json<SyncReport>, ApiError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let range = DateRange::last_days(30, Local::now().naive_local());
    run_sync(&state, "30d", range, body.company_id, body.max_tickets, body.concurrent_limit).await
}

pub async fn sync_custom(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CustomSyncBody>, JsonRejection>,
) -> Result<Json<SyncReport>, ApiError> {
    let Json(body) = body.map_err(|e| {
        SYNC_REQUESTS.with_label_values(&["custom", "rejected"]).inc();
        error_response(StatusCode::BAD_REQUEST, e.body_text())
    })?;

    let range = DateRange::parse(&body.start_date, &body.end_date).map_err(|e| {
        SYNC_REQUESTS.with_label_values(&["custom", "rejected"]).inc();
        bad_request(e)
    })?;

    run_sync(
        &state,
        "custom",
        range,
        body.company_id,
        body.max_tickets,
        body.concurrent_limit,
    )
    .await
}

// ============================================================================
// Helpers
// ============================================================================

async fn run_sync(
    state: &AppState,
    window: &str,
    range: DateRange,
    company_id: Option<i64>,
    max_tickets: Option<i64>,
    concurrent_limit: Option<i64>,
) -> Result<Json<SyncReport>, ApiError> {
    let sync_config = &state.config().sync;
    let mut request = FetchRequest::new(range, sync_config).with_company(company_id);
    if let Some(max_tickets) = max_tickets {
        // Out-of-range values fall to 0 and fail validation.
        request = request.with_page_size(u32::try_from(max_tickets).unwrap_or(0));
    }
    if let Some(limit) = concurrent_limit {
        request = request.with_concurrency(usize::try_from(limit).unwrap_or(0));
    }

    if let Err(e) = request.validate(sync_config) {
        SYNC_REQUESTS.with_label_values(&[window, "rejected"]).inc();
        return Err(bad_request(e));
    }

    let Some(_guard) = state.try_begin_sync() else {
        SYNC_REQUESTS.with_label_values(&[window, "busy"]).inc();
        return Err(error_response(
            StatusCode::CONFLICT,
            "A sync is already running",
        ));
    };

    info!(
        window,
        start = %request.range.start,
        end = %request.range.end,
        company_id = ?request.company_id,
        page_size = request.page_size,
        concurrency = request.concurrency,
        "Starting sync"
    );

    match state.sync().run(&request).await {
        Ok(report) => {
            SYNC_REQUESTS.with_label_values(&[window, "success"]).inc();
            Ok(Json(report))
        }
        Err(e @ (SyncError::InvalidRange(_) | SyncError::InvalidRequest(_))) => {
            SYNC_REQUESTS.with_label_values(&[window, "rejected"]).inc();
            Err(bad_request(e))
        }
        Err(e) => {
            error!(window, error = %e, "Sync failed");
            SYNC_REQUESTS.with_label_values(&[window, "failed"]).inc();
            Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Sync failed: {}", e),
            ))
        }
    }
}

/// 400 carrying the validation message without the error-kind prefix.
fn bad_request(e: SyncError) -> ApiError {
    let message = match e {
        SyncError::InvalidRange(message) | SyncError::InvalidRequest(message) => message,
        other => other.to_string(),
    };
    error_response(StatusCode::BAD_REQUEST, message)
}
