//! Health check handler

use axum::Json;
use roomkit_service::dto::HealthResponse;

/// Liveness check, no auth
///
/// GET /api/health
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}
