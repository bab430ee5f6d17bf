use crate::cookies::session_token;
use crate::error::ApiError;
use crate::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use uuid::Uuid;

/// Authenticated session context
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub session_id: Uuid,
}

/// Middleware to require a live session
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = session_token(request.headers()).ok_or_else(|| ApiError::unauthenticated())?;
    let session = state.auth.validate_session(&token).await?;

    request.extensions_mut().insert(AuthUser {
        user_id: session.user_id,
        session_id: session.id,
    });

    Ok(next.run(request).await)
}
