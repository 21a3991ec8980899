//! Route definitions

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::{functions, health, users};
use crate::state::AppState;

/// Authenticated routes (rate limited)
pub fn create_router() -> Router<AppState> {
    Router::new()
        .nest("/api/user", user_routes())
        .nest("/functions/v1", function_routes())
}

/// Health check routes (exported separately to bypass rate limiting)
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/api/health", get(health::health_check))
}

fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/info", get(users::get_user_info))
        .route("/add_info", post(users::add_user_info))
}

fn function_routes() -> Router<AppState> {
    Router::new()
        .route("/llm", post(functions::buffered_completion))
        .route("/stream-llm", post(functions::stream_completion))
}
