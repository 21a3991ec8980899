//! Completion functions
//!
//! Proxies to the text generation API so the API key stays server-side.

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use roomkit_core::entities::CompletionRequest;
use roomkit_service::dto::TaskAcceptedResponse;
use tracing::info;

use crate::extractors::{AuthUser, JsonBody};
use crate::response::{ApiError, ApiResult};
use crate::state::AppState;

/// Queue a buffered completion; the result lands in `llm_result` under `taskId`
///
/// POST /functions/v1/llm
pub async fn buffered_completion(
    State(state): State<AppState>,
    auth: AuthUser,
    JsonBody(request): JsonBody<CompletionRequest>,
) -> ApiResult<(StatusCode, Json<TaskAcceptedResponse>)> {
    let service = state.completions();
    let task = service.start_buffered(request)?;
    info!(user_id = %auth.user_id, task_id = %task.accepted.task_id, "Completion queued");

    // The task keeps running after the response is sent
    Ok((StatusCode::ACCEPTED, Json(task.accepted)))
}

/// Stream upstream bytes back as they arrive
///
/// POST /functions/v1/stream-llm
pub async fn stream_completion(
    State(state): State<AppState>,
    auth: AuthUser,
    JsonBody(request): JsonBody<CompletionRequest>,
) -> ApiResult<Response> {
    let service = state.completions();
    let upstream = service.stream(request).await?;
    info!(user_id = %auth.user_id, "Completion stream opened");

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, upstream.content_type)
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(upstream.body))
        .map(IntoResponse::into_response)
        .map_err(ApiError::internal)
}
