use crate::error::ApiResult;
use crate::middleware::AuthUser;
use crate::response::ApiResponse;
use crate::AppState;
use axum::{extract::State, Extension, Json};
use std::sync::Arc;
use ticketing_auth::{EmailChange, PasswordChange};
use ticketing_models::UserProfile;

/// Get current user
pub async fn me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<ApiResponse<UserProfile>> {
    let profile = state.auth.current_profile(user.user_id).await?;
    Ok(ApiResponse::success("Profile loaded", profile))
}

pub async fn change_email(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(change): Json<EmailChange>,
) -> ApiResult<ApiResponse<()>> {
    state.auth.change_email(user.user_id, &change).await?;
    Ok(ApiResponse::message(
        "Verification code sent to the new address",
    ))
}

pub async fn change_password(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(change): Json<PasswordChange>,
) -> ApiResult<ApiResponse<()>> {
    state.auth.change_password(user.user_id, &change).await?;
    Ok(ApiResponse::message("Password updated"))
}
