use crate::cookies::{cleared_cookies, session_cookies, session_token};
use crate::error::{ApiError, ApiResult};
use crate::response::ApiResponse;
use crate::AppState;
use axum::{
    extract::{ConnectInfo, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{AppendHeaders, IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use ticketing_auth::{AuthError, SignInRequest, SignUpRequest};
use ticketing_logging::client_ip;
use ticketing_models::DeviceType;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct SignUpData {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct SignInData {
    pub user_id: Uuid,
    pub device_type: DeviceType,
    pub expires_at: DateTime<Utc>,
    pub refresh_expiry: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailRequest {
    pub user_id: Uuid,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct IdentifierRequest {
    /// Username or email
    pub identifier: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct UsernameQuery {
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct UsernameAvailability {
    pub username: String,
    pub available: bool,
}

fn peer_addr(peer: Option<ConnectInfo<SocketAddr>>) -> Option<SocketAddr> {
    peer.map(|ConnectInfo(addr)| addr)
}

/// Create an account and send its verification code
pub async fn sign_up(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SignUpRequest>,
) -> ApiResult<(StatusCode, ApiResponse<SignUpData>)> {
    let user = state.auth.sign_up(request).await?;

    Ok((
        StatusCode::CREATED,
        ApiResponse::success(
            "Account created, check your email for a verification code",
            SignUpData {
                user_id: user.id,
                username: user.username,
                email: user.email,
            },
        ),
    ))
}

/// Sign in and receive session cookies
pub async fn sign_in(
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(mut request): Json<SignInRequest>,
) -> ApiResult<impl IntoResponse> {
    request.ip_address = client_ip(&headers, peer_addr(peer));
    request.user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let session = state.auth.sign_in(request).await?;

    Ok((
        AppendHeaders(session_cookies(&session)),
        ApiResponse::success(
            "Signed in",
            SignInData {
                user_id: session.user_id,
                device_type: session.device_type,
                expires_at: session.expires_at,
                refresh_expiry: session.refresh_expiry,
            },
        ),
    ))
}

/// End the current session. Cookies are cleared whatever the outcome.
pub async fn logout(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let result = match session_token(&headers) {
        Some(token) => state.auth.logout(&token).await,
        None => Err(AuthError::NoActiveSession),
    };

    match result {
        Ok(()) => (
            AppendHeaders(cleared_cookies()),
            ApiResponse::message("Logged out"),
        )
            .into_response(),
        Err(e) => (AppendHeaders(cleared_cookies()), ApiError::from(e)).into_response(),
    }
}

pub async fn verify_email(
    State(state): State<Arc<AppState>>,
    Json(request): Json<VerifyEmailRequest>,
) -> ApiResult<ApiResponse<()>> {
    state
        .auth
        .verify_email(request.user_id, &request.code)
        .await?;
    Ok(ApiResponse::message("Email verified"))
}

pub async fn resend_verification(
    State(state): State<Arc<AppState>>,
    Json(request): Json<IdentifierRequest>,
) -> ApiResult<ApiResponse<()>> {
    state.auth.resend_verification(&request.identifier).await?;
    Ok(ApiResponse::message("Verification code sent"))
}

pub async fn request_password_reset(
    State(state): State<Arc<AppState>>,
    Json(request): Json<IdentifierRequest>,
) -> ApiResult<ApiResponse<()>> {
    state
        .auth
        .request_password_reset(&request.identifier)
        .await?;
    Ok(ApiResponse::message("Password reset instructions sent"))
}

pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ResetPasswordRequest>,
) -> ApiResult<ApiResponse<()>> {
    state
        .auth
        .reset_password(&request.token, &request.new_password)
        .await?;
    Ok(ApiResponse::message("Password updated"))
}

pub async fn check_username(
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Query(query): Query<UsernameQuery>,
) -> ApiResult<ApiResponse<UsernameAvailability>> {
    let ip = client_ip(&headers, peer_addr(peer)).unwrap_or_else(|| "unknown".to_string());
    let available = state.auth.check_username(&query.username, &ip).await?;

    let data = UsernameAvailability {
        username: query.username,
        available,
    };
    Ok(if available {
        ApiResponse::success("Username is available", data)
    } else {
        ApiResponse::warning("Username is taken", data)
    })
}
