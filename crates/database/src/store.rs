//! Storage seams.
//!
//! Services depend on these traits rather than on a pool so that the same
//! logic runs against Postgres in production and against the in-memory
//! stores in tests. Every method that writes more than one row is a single
//! transaction in the Postgres implementation.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ticketing_models::{
    DedupKey, FailedLogin, LockoutPolicy, LogFilter, LogQuery, LogRecord, LogRepeat,
    NewLogRecord, NewSession, NewUser, SecurityAttributes, Session, User, UserAccount,
    UserPreferences,
};
use uuid::Uuid;

#[async_trait]
pub trait LogStore: Send + Sync {
    /// Most recent row with the same key created at or after `since`.
    async fn find_recent_duplicate(
        &self,
        key: DedupKey<'_>,
        since: DateTime<Utc>,
    ) -> Result<Option<LogRecord>>;

    /// Bump `occurrences` and overwrite the fields the repeat carries.
    async fn record_repeat(&self, id: i64, repeat: &LogRepeat) -> Result<()>;

    /// Insert all records or none.
    async fn insert_batch(&self, records: &[NewLogRecord]) -> Result<u64>;

    /// Newest first, soft-deleted rows included.
    async fn query(&self, query: &LogQuery) -> Result<Vec<LogRecord>>;

    async fn delete(&self, filters: &[LogFilter]) -> Result<u64>;
}

#[async_trait]
pub trait AuthStore: Send + Sync {
    async fn guest_role_id(&self) -> Result<Option<Uuid>>;

    async fn username_exists(&self, username: &str) -> Result<bool>;

    async fn email_exists(&self, email: &str) -> Result<bool>;

    /// Insert the user, its security attributes and default preferences.
    async fn create_account(
        &self,
        user: &NewUser,
        security: &SecurityAttributes,
        preferences: &UserPreferences,
    ) -> Result<User>;

    async fn find_account_by_id(&self, user_id: Uuid) -> Result<Option<UserAccount>>;

    /// Match on username or email.
    async fn find_account_by_identifier(&self, identifier: &str) -> Result<Option<UserAccount>>;

    /// Account whose reset token equals `token` and has not expired.
    async fn find_account_by_reset_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<UserAccount>>;

    async fn set_verification_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Mark the email verified, clear the token pair and promote the pending
    /// address when the current one is empty.
    async fn mark_email_verified(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<()>;

    /// Increment the failure counter and apply the lockout policy atomically.
    async fn record_failed_login(
        &self,
        user_id: Uuid,
        policy: LockoutPolicy,
        now: DateTime<Utc>,
    ) -> Result<FailedLogin>;

    /// Reset the failure counter, clear the lock and open a session.
    async fn complete_sign_in(&self, session: &NewSession) -> Result<Session>;

    async fn find_active_session(&self, session_token: &str) -> Result<Option<Session>>;

    /// Session still marked active for a token, expired or not.
    async fn find_open_session(&self, session_token: &str) -> Result<Option<Session>>;

    /// Deactivate a session. Returns false when it was already inactive.
    async fn end_session(&self, session_id: Uuid, now: DateTime<Utc>) -> Result<bool>;

    async fn set_password_reset_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Store the new hash, clear the reset token and any lockout.
    async fn complete_password_reset(&self, user_id: Uuid, password_hash: &str) -> Result<()>;

    async fn update_password_hash(&self, user_id: Uuid, password_hash: &str) -> Result<()>;

    async fn set_pending_email(
        &self,
        user_id: Uuid,
        email: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()>;
}
