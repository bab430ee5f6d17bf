use chrono::{DateTime, Utc};
use thiserror::Error;
use ticketing_cache::CacheError;
use ticketing_database::DatabaseError;

pub type Result<T> = std::result::Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Email not verified")]
    EmailNotVerified,

    #[error("Account locked until {locked_until}")]
    AccountLocked { locked_until: DateTime<Utc> },

    #[error("Email queue is saturated, try again shortly")]
    QueueSaturated,

    /// The named field (`username`, `email`) is already taken.
    #[error("{0} already exists")]
    DuplicateResource(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("New password must differ from the current one")]
    PasswordReuse,

    #[error("No active session")]
    NoActiveSession,

    #[error("Too many requests")]
    RateLimited,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<DatabaseError> for AuthError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::DuplicateEntry(field) => AuthError::DuplicateResource(field),
            DatabaseError::NotFound(what) => AuthError::NotFound(what),
            other => AuthError::Database(other.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for AuthError {
    fn from(err: validator::ValidationErrors) -> Self {
        AuthError::InvalidInput(err.to_string())
    }
}

impl From<argon2::Error> for AuthError {
    fn from(err: argon2::Error) -> Self {
        AuthError::Internal(format!("Password hashing failed: {}", err))
    }
}

impl From<tokio::task::JoinError> for AuthError {
    fn from(err: tokio::task::JoinError) -> Self {
        AuthError::Internal(format!("Background task failed: {}", err))
    }
}
