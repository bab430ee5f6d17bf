use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub phone: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub role_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub phone: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub role_id: Uuid,
}

/// Per-user credential and verification state.
///
/// Token and expiry columns are always written in pairs.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SecurityAttributes {
    pub user_id: Uuid,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub failed_login_attempts: i32,
    pub lock_until: Option<DateTime<Utc>>,
    pub email_verified: bool,
    pub email_verified_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub email_verification_token: Option<String>,
    pub email_token_expiry: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub password_reset_token: Option<String>,
    pub password_reset_token_expiry: Option<DateTime<Utc>>,
    pub pending_email: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl SecurityAttributes {
    pub fn new(user_id: Uuid, password_hash: String, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            password_hash,
            failed_login_attempts: 0,
            lock_until: None,
            email_verified: false,
            email_verified_at: None,
            email_verification_token: None,
            email_token_expiry: None,
            password_reset_token: None,
            password_reset_token_expiry: None,
            pending_email: None,
            updated_at: now,
        }
    }

    /// The lock expiry while the account is locked at `now`.
    pub fn locked_until(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.lock_until.filter(|until| *until > now)
    }

    /// The stored verification token, if it is present and unexpired.
    pub fn active_verification_token(&self, now: DateTime<Utc>) -> Option<&str> {
        match (&self.email_verification_token, self.email_token_expiry) {
            (Some(token), Some(expiry)) if !token.is_empty() && expiry > now => Some(token),
            _ => None,
        }
    }

    pub fn active_reset_token(&self, now: DateTime<Utc>) -> Option<&str> {
        match (&self.password_reset_token, self.password_reset_token_expiry) {
            (Some(token), Some(expiry)) if !token.is_empty() && expiry > now => Some(token),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserPreferences {
    pub user_id: Uuid,
    pub language: String,
    pub theme: String,
    pub timezone: String,
    pub show_profile: bool,
    pub allow_following: bool,
    pub show_email: bool,
    pub show_phone: bool,
    pub show_location: bool,
    pub show_events: bool,
}

impl UserPreferences {
    pub fn defaults_for(user_id: Uuid) -> Self {
        Self {
            user_id,
            language: "en".to_string(),
            theme: "light".to_string(),
            timezone: "UTC".to_string(),
            show_profile: true,
            allow_following: true,
            show_email: false,
            show_phone: false,
            show_location: false,
            show_events: false,
        }
    }
}

/// A user joined with its security attributes.
#[derive(Debug, Clone)]
pub struct UserAccount {
    pub user: User,
    pub security: SecurityAttributes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub email_verified: bool,
    pub phone: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub pending_email: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<UserAccount> for UserProfile {
    fn from(account: UserAccount) -> Self {
        Self {
            id: account.user.id,
            username: account.user.username,
            email: account.user.email,
            email_verified: account.security.email_verified,
            phone: account.user.phone,
            date_of_birth: account.user.date_of_birth,
            pending_email: account.security.pending_email,
            created_at: account.user.created_at,
        }
    }
}
