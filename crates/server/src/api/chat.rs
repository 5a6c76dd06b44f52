//! Natural-language query handler.

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use helpdesk_core::{ChatRequest, ChatResponse};

use super::{error_response, ErrorResponse};
use crate::metrics::CHAT_REQUESTS;
use crate::state::AppState;

/// Answer a question about the stored tickets.
///
/// Translation and query failures come back as a 200 whose `error` field is
/// set. Only an empty message or a missing LLM is refused.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, Json<ErrorResponse>)> {
    if request.message.trim().is_empty() {
        CHAT_REQUESTS.with_label_values(&["rejected"]).inc();
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "Message cannot be empty",
        ));
    }

    let Some(chat) = state.chat() else {
        CHAT_REQUESTS.with_label_values(&["rejected"]).inc();
        return Err(error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "LLM not configured",
        ));
    };

    let response = chat.chat(&request).await;
    let result = if response.error.is_some() {
        "error"
    } else {
        "answered"
    };
    CHAT_REQUESTS.with_label_values(&[result]).inc();

    Ok(Json(response))
}
