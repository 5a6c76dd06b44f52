use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use helpdesk_core::{ticket::StoreStats, SanitizedConfig};

use super::{error_response, ErrorResponse};
use crate::metrics::{collect_dynamic_metrics, encode_metrics};
use crate::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Serialize)]
pub struct ServiceInfo {
    pub service: String,
    pub version: String,
    pub started_at: String,
    pub endpoints: Vec<&'static str>,
}

pub async fn root(State(state): State<Arc<AppState>>) -> Json<ServiceInfo> {
    Json(ServiceInfo {
        service: "helpdesk".to_string(),
        version: VERSION.to_string(),
        started_at: state.started_at().to_rfc3339(),
        endpoints: vec![
            "GET /health",
            "GET /config",
            "GET /stats/database",
            "GET /metrics",
            "POST /sync/last-7-days",
            "POST /sync/last-30-days",
            "POST /sync/custom",
            "POST /chat",
            "GET /tickets",
            "GET /tickets/{id}",
            "POST /solutions/search",
            "GET /solutions/ticket/{ticket_number}",
            "GET /solutions/stats",
            "GET /solutions/ai-suggestions",
            "GET /summaries/list",
            "POST /summaries/regenerate/{ticket_id}",
        ],
    })
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
    pub llm: String,
    pub timestamp: String,
}

/// Always 200; the body says whether the store is reachable.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let database_ok = match state.store().health_check() {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "Database health check failed");
            false
        }
    };

    Json(HealthResponse {
        status: if database_ok { "healthy" } else { "unhealthy" }.to_string(),
        database: if database_ok {
            "connected"
        } else {
            "disconnected"
        }
        .to_string(),
        llm: if state.chat().is_some() {
            "configured"
        } else {
            "not configured"
        }
        .to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<SanitizedConfig> {
    Json(state.sanitized_config())
}

#[derive(Serialize)]
pub struct DatabaseStatsResponse {
    pub status: String,
    pub statistics: StoreStats,
    pub timestamp: String,
}

pub async fn database_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DatabaseStatsResponse>, (StatusCode, Json<ErrorResponse>)> {
    let statistics = state.store().stats().map_err(|e| {
        error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to get stats: {}", e),
        )
    })?;

    Ok(Json(DatabaseStatsResponse {
        status: "success".to_string(),
        statistics,
        timestamp: Utc::now().to_rfc3339(),
    }))
}

/// Prometheus text exposition.
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    collect_dynamic_metrics(&state);
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        encode_metrics(),
    )
}
