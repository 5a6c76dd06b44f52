pub mod chat;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod solutions;
pub mod summaries;
pub mod sync;
pub mod tickets;

pub use routes::create_router;

use axum::{http::StatusCode, Json};
use serde::Serialize;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub(crate) fn error_response(
    status: StatusCode,
    message: impl Into<String>,
) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}
