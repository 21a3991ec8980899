//! User profile handlers

use axum::{extract::State, Json};
use roomkit_service::dto::{AddProfileRequest, ApiResponse, ProfileResponse};

use crate::extractors::{AuthUser, ValidatedJson};
use crate::response::ApiResult;
use crate::state::AppState;

/// Profile of the caller, `data: null` when none exists yet
///
/// GET /api/user/info
pub async fn get_user_info(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<ApiResponse<Option<ProfileResponse>>>> {
    let service = state.profiles();
    let profile = service.get_profile(&auth.user_id).await?;
    Ok(Json(ApiResponse::success(profile)))
}

/// Create the caller's profile
///
/// POST /api/user/add_info
pub async fn add_user_info(
    State(state): State<AppState>,
    auth: AuthUser,
    ValidatedJson(request): ValidatedJson<AddProfileRequest>,
) -> ApiResult<Json<ApiResponse<ProfileResponse>>> {
    let service = state.profiles();
    let profile = service.add_profile(&auth.user_id, request).await?;
    Ok(Json(ApiResponse::success(profile)))
}
