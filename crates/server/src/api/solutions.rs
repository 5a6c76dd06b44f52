//! Solution search and LLM-written solution handlers.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

use helpdesk_core::chat::{
    InsightError, SolutionAnswer, SolutionList, SolutionSearch, SolutionStats, SuggestionReport,
};
use helpdesk_core::StoreError;

use super::{error_response, ErrorResponse};
use crate::metrics::INSIGHT_REQUESTS;
use crate::state::AppState;

type ApiError = (StatusCode, Json<ErrorResponse>);

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct SolutionStatsResponse {
    pub status: &'static str,
    pub stats: SolutionStats,
}

#[derive(Debug, Serialize)]
pub struct SuggestionsResponse {
    pub status: &'static str,
    #[serde(flatten)]
    pub report: SuggestionReport,
}

#[derive(Debug, Default, Deserialize)]
pub struct SuggestionsParams {
    #[serde(default)]
    pub force_refresh: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// Search tickets and their resolutions, most recently resolved first
pub async fn search_solutions(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SolutionSearch>, JsonRejection>,
) -> Result<Json<SolutionList>, ApiError> {
    let Json(search) =
        body.map_err(|e| error_response(StatusCode::BAD_REQUEST, e.body_text()))?;

    state
        .solutions()
        .search(&search)
        .map(Json)
        .map_err(|e| insight_error("Failed to search solutions", e))
}

/// Step-by-step solution for one ticket, written by the LLM
pub async fn get_solution(
    State(state): State<Arc<AppState>>,
    Path(ticket_number): Path<String>,
) -> Result<Json<SolutionAnswer>, ApiError> {
    let result = state.solutions().solution_for(&ticket_number).await;
    record("solution", &result);
    result
        .map(Json)
        .map_err(|e| insight_error("Failed to get solution", e))
}

/// How many stored tickets have a recorded resolution
pub async fn solution_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SolutionStatsResponse>, ApiError> {
    let stats = state
        .solutions()
        .stats()
        .map_err(|e| insight_error("Failed to get solution stats", e))?;
    Ok(Json(SolutionStatsResponse {
        status: "success",
        stats,
    }))
}

/// Suggested fixes for recurring open problems, cached for an hour
pub async fn ai_suggestions(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SuggestionsParams>,
) -> Result<Json<SuggestionsResponse>, ApiError> {
    let result = state.solutions().suggestions(params.force_refresh).await;
    record("suggestions", &result);
    let report = result.map_err(|e| insight_error("Failed to generate AI suggestions", e))?;
    Ok(Json(SuggestionsResponse {
        status: "success",
        report,
    }))
}

pub(crate) fn record<T>(kind: &str, result: &Result<T, InsightError>) {
    let label = match result {
        Ok(_) => "success",
        Err(InsightError::LlmUnavailable) => "unavailable",
        Err(InsightError::InvalidRequest(_)) | Err(InsightError::NotFound(_)) => "rejected",
        Err(_) => "error",
    };
    INSIGHT_REQUESTS.with_label_values(&[kind, label]).inc();
}

/// Map a service error to a status. `context` prefixes server-side failures.
pub(crate) fn insight_error(context: &str, e: InsightError) -> ApiError {
    match e {
        InsightError::InvalidRequest(msg) => error_response(StatusCode::BAD_REQUEST, msg),
        InsightError::NotFound(msg) => error_response(StatusCode::NOT_FOUND, msg),
        InsightError::LlmUnavailable => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, "LLM not configured")
        }
        InsightError::Store(StoreError::InvalidQuery(msg)) => {
            error_response(StatusCode::BAD_REQUEST, msg)
        }
        e => {
            error!(error = %e, "{}", context);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("{}: {}", context, e),
            )
        }
    }
}
