use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::{
    chat, handlers, middleware::metrics_middleware, solutions, summaries, sync, tickets,
};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Service info, health and config
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/stats/database", get(handlers::database_stats))
        .route("/metrics", get(handlers::metrics))
        // Sync
        .route("/sync/last-7-days", post(sync::sync_last_7_days))
        .route("/sync/last-30-days", post(sync::sync_last_30_days))
        .route("/sync/custom", post(sync::sync_custom))
        // Natural-language queries
        .route("/chat", post(chat::chat))
        // Stored tickets
        .route("/tickets", get(tickets::list_tickets))
        .route("/tickets/{id}", get(tickets::get_ticket))
        // Resolutions and LLM-written solutions
        .route("/solutions/search", post(solutions::search_solutions))
        .route(
            "/solutions/ticket/{ticket_number}",
            get(solutions::get_solution),
        )
        .route("/solutions/stats", get(solutions::solution_stats))
        .route("/solutions/ai-suggestions", get(solutions::ai_suggestions))
        // Ticket summaries
        .route("/summaries/list", get(summaries::list_summaries))
        .route(
            "/summaries/regenerate/{ticket_id}",
            post(summaries::regenerate_summary),
        )
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
