//! Ticket summary handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use helpdesk_core::chat::{SummaryList, SummaryListParams};

use super::solutions::{insight_error, record};
use super::{error_response, ErrorResponse};
use crate::state::AppState;

type ApiError = (StatusCode, Json<ErrorResponse>);

#[derive(Debug, Serialize)]
pub struct RegenerateResponse {
    pub status: &'static str,
    pub ticket_id: i64,
    pub summary: String,
}

/// Newest tickets with their summaries, generating missing ones
pub async fn list_summaries(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SummaryListParams>,
) -> Result<Json<SummaryList>, ApiError> {
    let summaries = state.summaries().ok_or_else(llm_unavailable)?;
    let result = summaries.list(&params).await;
    record("summaries", &result);
    result
        .map(Json)
        .map_err(|e| insight_error("Failed to get summaries", e))
}

/// Replace the cached summary of one ticket
pub async fn regenerate_summary(
    State(state): State<Arc<AppState>>,
    Path(ticket_id): Path<i64>,
) -> Result<Json<RegenerateResponse>, ApiError> {
    let summaries = state.summaries().ok_or_else(llm_unavailable)?;
    let result = summaries.regenerate(ticket_id).await;
    record("regenerate", &result);
    let summary = result.map_err(|e| insight_error("Failed to regenerate summary", e))?;
    Ok(Json(RegenerateResponse {
        status: "success",
        ticket_id,
        summary,
    }))
}

fn llm_unavailable() -> ApiError {
    error_response(StatusCode::SERVICE_UNAVAILABLE, "LLM not configured")
}
