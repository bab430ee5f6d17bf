use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ticketing_auth::AuthError;
use ticketing_logging::{LogError, Origin};

use crate::response::ApiResponse;

/// A failed request, left on the response for the error logger.
#[derive(Debug, Clone)]
pub struct FailedRequest {
    pub message: String,
    /// Where the error entered the API layer.
    pub origin: Origin,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiErrorKind {
    #[error(transparent)]
    Auth(AuthError),

    #[error(transparent)]
    Logs(LogError),

    #[error("{0}")]
    BadRequest(String),

    #[error("Authentication required")]
    Unauthenticated,
}

/// Error returned by handlers. Remembers where it was raised so the request
/// log points at the failing handler rather than at the middleware.
#[derive(Debug, thiserror::Error)]
#[error("{kind}")]
pub struct ApiError {
    kind: ApiErrorKind,
    origin: Origin,
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<AuthError> for ApiError {
    #[track_caller]
    fn from(err: AuthError) -> Self {
        Self::new(ApiErrorKind::Auth(err))
    }
}

impl From<LogError> for ApiError {
    #[track_caller]
    fn from(err: LogError) -> Self {
        Self::new(ApiErrorKind::Logs(err))
    }
}

impl ApiError {
    #[track_caller]
    fn new(kind: ApiErrorKind) -> Self {
        Self {
            kind,
            origin: Origin::capture(),
        }
    }

    #[track_caller]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::BadRequest(message.into()))
    }

    #[track_caller]
    pub fn unauthenticated() -> Self {
        Self::new(ApiErrorKind::Unauthenticated)
    }

    pub fn kind(&self) -> &ApiErrorKind {
        &self.kind
    }

    pub fn status(&self) -> StatusCode {
        match &self.kind {
            ApiErrorKind::Auth(err) => match err {
                AuthError::InvalidInput(_)
                | AuthError::InvalidToken
                | AuthError::PasswordReuse => StatusCode::BAD_REQUEST,
                AuthError::InvalidCredentials | AuthError::NoActiveSession => {
                    StatusCode::UNAUTHORIZED
                }
                AuthError::Forbidden(_) | AuthError::EmailNotVerified => StatusCode::FORBIDDEN,
                AuthError::NotFound(_) => StatusCode::NOT_FOUND,
                AuthError::DuplicateResource(_) => StatusCode::CONFLICT,
                AuthError::AccountLocked { .. } => StatusCode::LOCKED,
                AuthError::QueueSaturated | AuthError::RateLimited => {
                    StatusCode::TOO_MANY_REQUESTS
                }
                AuthError::Database(_) | AuthError::Cache(_) | AuthError::Internal(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ApiErrorKind::Logs(LogError::EmptyFilter) => StatusCode::BAD_REQUEST,
            ApiErrorKind::Logs(LogError::Store(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiErrorKind::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
        }
    }

    /// What the client is told. Server-side failures are not described.
    fn public_message(&self) -> String {
        if self.status().is_server_error() {
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }

        let mut response = (status, ApiResponse::failed(self.public_message())).into_response();
        response.extensions_mut().insert(FailedRequest {
            message: self.to_string(),
            origin: self.origin,
        });
        response
    }
}
