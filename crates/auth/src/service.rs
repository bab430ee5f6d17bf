use crate::email::{EmailJob, EmailQueue, LoginWarningKind};
use crate::error::{AuthError, Result};
use crate::password::{secure_eq, PasswordHasher};
use crate::tokens::generate_token;
use crate::username::UsernameAvailability;
use crate::validation::{check_password, EmailChange, SignUpRequest};
use chrono::{DateTime, Duration, Local, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use ticketing_cache::SessionCache;
use ticketing_database::AuthStore;
use ticketing_models::{
    DeviceType, LockoutPolicy, NewSession, NewUser, SecurityAttributes, Session, User,
    UserAccount, UserPreferences, UserProfile,
};
use uuid::Uuid;
use validator::Validate;

/// Lifetime of email verification codes and password reset tokens.
pub const TOKEN_TTL_HOURS: i64 = 24;
pub const SESSION_TTL_HOURS: i64 = 24;
pub const REMEMBER_ME_TTL_HOURS: i64 = 168;

#[derive(Debug, Clone, Deserialize)]
pub struct SignInRequest {
    /// Username or email.
    pub identifier: String,
    pub password: String,
    #[serde(default)]
    pub remember_me: bool,
    #[serde(skip)]
    pub ip_address: Option<String>,
    #[serde(skip)]
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
}

/// Sign-up, sign-in and the account flows around them.
pub struct AuthService {
    store: Arc<dyn AuthStore>,
    sessions: Arc<dyn SessionCache>,
    email: EmailQueue,
    hasher: PasswordHasher,
    lockout: LockoutPolicy,
    usernames: UsernameAvailability,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn AuthStore>,
        sessions: Arc<dyn SessionCache>,
        email: EmailQueue,
    ) -> Self {
        Self {
            usernames: UsernameAvailability::new(Arc::clone(&store)),
            store,
            sessions,
            email,
            hasher: PasswordHasher::default(),
            lockout: LockoutPolicy::default(),
        }
    }

    pub fn with_hasher(mut self, hasher: PasswordHasher) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn with_lockout_policy(mut self, lockout: LockoutPolicy) -> Self {
        self.lockout = lockout;
        self
    }

    pub fn email_queue(&self) -> &EmailQueue {
        &self.email
    }

    /// Create an unverified account linked to the guest role and send the
    /// first verification code.
    pub async fn sign_up(&self, request: SignUpRequest) -> Result<User> {
        let now = Utc::now();
        let date_of_birth = request.check(Local::now().date_naive())?;

        let role_id = self
            .store
            .guest_role_id()
            .await?
            .ok_or_else(|| AuthError::Internal("guest role is not configured".to_string()))?;

        if self.store.username_exists(&request.username).await? {
            return Err(AuthError::DuplicateResource("username".to_string()));
        }
        if self.store.email_exists(&request.email).await? {
            return Err(AuthError::DuplicateResource("email".to_string()));
        }

        let user_id = Uuid::new_v4();
        let password_hash = self.hasher.hash_blocking(&request.password, user_id).await?;

        let token_expiry = now + Duration::hours(TOKEN_TTL_HOURS);
        let mut security = SecurityAttributes::new(user_id, password_hash, now);
        security.email_token_expiry = Some(token_expiry);

        let new_user = NewUser {
            id: user_id,
            username: request.username,
            email: request.email,
            phone: request.phone.filter(|p| !p.trim().is_empty()),
            date_of_birth,
            role_id,
        };

        let user = self
            .store
            .create_account(&new_user, &security, &UserPreferences::defaults_for(user_id))
            .await?;
        self.usernames.forget(&user.username).await;

        tracing::info!(user_id = %user.id, username = %user.username, "User signed up");

        let code = self.email.send_verification(&user.email, &user.username).await?;
        self.store
            .set_verification_token(user.id, &code, token_expiry)
            .await?;

        Ok(user)
    }

    pub async fn sign_in(&self, request: SignInRequest) -> Result<Session> {
        let now = Utc::now();
        let UserAccount { user, security } = self
            .store
            .find_account_by_identifier(&request.identifier)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !security.email_verified {
            if let Err(e) = self.issue_verification(&user, &user.email).await {
                tracing::warn!(user_id = %user.id, error = %e, "Failed to resend verification code");
            }
            return Err(AuthError::EmailNotVerified);
        }

        if let Some(locked_until) = security.locked_until(now) {
            self.send_warning(&user, LoginWarningKind::AccountLocked, &request)
                .await;
            return Err(AuthError::AccountLocked { locked_until });
        }

        let valid = self
            .hasher
            .verify_blocking(&request.password, user.id, &security.password_hash)
            .await?;

        if !valid {
            let failed = self
                .store
                .record_failed_login(user.id, self.lockout, now)
                .await?;

            if let Some(locked_until) = failed.lock_until {
                tracing::warn!(
                    user_id = %user.id,
                    attempts = failed.attempts,
                    locked_until = %locked_until,
                    "Account locked after failed sign-in attempts"
                );
                self.send_warning(&user, LoginWarningKind::LockoutFailedAttempts, &request)
                    .await;
                return Err(AuthError::AccountLocked { locked_until });
            }

            return Err(AuthError::InvalidCredentials);
        }

        self.send_warning(&user, LoginWarningKind::NewLogin, &request)
            .await;

        let lifetime = Duration::hours(if request.remember_me {
            REMEMBER_ME_TTL_HOURS
        } else {
            SESSION_TTL_HOURS
        });

        let new_session = NewSession {
            user_id: user.id,
            session_token: generate_token(),
            refresh_token: generate_token(),
            device_type: DeviceType::from_user_agent(request.user_agent.as_deref().unwrap_or("")),
            ip_address: request.ip_address,
            user_agent: request.user_agent,
            expires_at: now + lifetime,
            refresh_expiry: now + lifetime * 2,
        };

        let session = self.store.complete_sign_in(&new_session).await?;

        if let Err(e) = self.sessions.put(&session).await {
            tracing::warn!(error = %e, "Failed to cache session");
        }

        tracing::info!(user_id = %user.id, device = %session.device_type, "User signed in");
        Ok(session)
    }

    /// End the session behind `session_token`.
    ///
    /// The cache entry goes first; if it cannot be removed the session stays
    /// active in the store and the caller is told to retry. It is evicted
    /// again once the store has committed, since a concurrent lookup may have
    /// re-cached the still-active row in between.
    pub async fn logout(&self, session_token: &str) -> Result<()> {
        let session = self
            .store
            .find_open_session(session_token)
            .await?
            .ok_or(AuthError::NoActiveSession)?;

        self.evict_session(session_token).await?;

        if !self.store.end_session(session.id, Utc::now()).await? {
            return Err(AuthError::NoActiveSession);
        }

        self.evict_session(session_token).await?;

        tracing::info!(user_id = %session.user_id, "User logged out");
        Ok(())
    }

    /// Resolve a session token, preferring the cache.
    pub async fn validate_session(&self, session_token: &str) -> Result<Session> {
        let now = Utc::now();

        match self.sessions.get(session_token).await {
            Ok(Some(session)) if session.is_valid(now) => return Ok(session),
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "Session cache lookup failed"),
        }

        let session = self
            .store
            .find_active_session(session_token)
            .await?
            .filter(|s| s.is_valid(now))
            .ok_or(AuthError::NoActiveSession)?;

        if let Err(e) = self.sessions.put(&session).await {
            tracing::warn!(error = %e, "Failed to cache session");
            return Ok(session);
        }

        // A logout that committed after the read above must not leave this
        // entry behind; logouts committing later evict it themselves.
        match self.store.find_active_session(session_token).await {
            Ok(Some(_)) => Ok(session),
            Ok(None) => {
                self.forget_session(session_token).await;
                Err(AuthError::NoActiveSession)
            }
            Err(e) => {
                self.forget_session(session_token).await;
                Err(e.into())
            }
        }
    }

    pub async fn verify_email(&self, user_id: Uuid, code: &str) -> Result<()> {
        let now = Utc::now();
        let account = self.account(user_id).await?;

        match account.security.active_verification_token(now) {
            Some(token) if secure_eq(token, code.trim()) => {}
            _ => return Err(AuthError::InvalidToken),
        }

        self.store.mark_email_verified(user_id, now).await?;
        tracing::info!(user_id = %user_id, "Email verified");
        Ok(())
    }

    /// Issue a fresh code to the address awaiting verification.
    pub async fn resend_verification(&self, identifier: &str) -> Result<()> {
        let UserAccount { user, security } = self
            .store
            .find_account_by_identifier(identifier)
            .await?
            .ok_or_else(|| AuthError::NotFound("User not found".to_string()))?;

        let recipient = match security.pending_email.as_deref().filter(|e| !e.is_empty()) {
            Some(pending) => pending.to_string(),
            None if !security.email_verified => user.email.clone(),
            None => {
                return Err(AuthError::InvalidInput(
                    "Email is already verified".to_string(),
                ))
            }
        };

        self.issue_verification(&user, &recipient).await
    }

    pub async fn request_password_reset(&self, identifier: &str) -> Result<()> {
        let now = Utc::now();
        let UserAccount { user, security } = self
            .store
            .find_account_by_identifier(identifier)
            .await?
            .ok_or_else(|| AuthError::NotFound("User not found".to_string()))?;

        if let Some(locked_until) = security.locked_until(now) {
            return Err(AuthError::AccountLocked { locked_until });
        }

        let token = generate_token();
        let expires_at = now + Duration::hours(TOKEN_TTL_HOURS);
        self.store
            .set_password_reset_token(user.id, &token, expires_at)
            .await?;

        let job = EmailJob::password_reset(&user.email, &user.username, &token, expires_at);
        if let Err(e) = self.email.submit(job).await {
            tracing::warn!(user_id = %user.id, error = %e, "Failed to queue password reset email");
        }

        Ok(())
    }

    /// Set a new password with a reset token. Clears any lockout.
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<()> {
        check_password(new_password)?;

        let now = Utc::now();
        let UserAccount { user, security } = self
            .store
            .find_account_by_reset_token(token, now)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        if let Some(locked_until) = security.locked_until(now) {
            return Err(AuthError::AccountLocked { locked_until });
        }

        let password_hash = self.hasher.hash_blocking(new_password, user.id).await?;
        if secure_eq(&password_hash, &security.password_hash) {
            return Err(AuthError::PasswordReuse);
        }

        self.store
            .complete_password_reset(user.id, &password_hash)
            .await?;

        tracing::info!(user_id = %user.id, "Password reset");
        Ok(())
    }

    pub async fn change_password(&self, user_id: Uuid, change: &PasswordChange) -> Result<()> {
        check_password(&change.new_password)?;

        let account = self.account(user_id).await?;
        let stored = &account.security.password_hash;

        if !self
            .hasher
            .verify_blocking(&change.current_password, user_id, stored)
            .await?
        {
            return Err(AuthError::InvalidCredentials);
        }

        let password_hash = self
            .hasher
            .hash_blocking(&change.new_password, user_id)
            .await?;
        if secure_eq(&password_hash, stored) {
            return Err(AuthError::PasswordReuse);
        }

        self.store
            .update_password_hash(user_id, &password_hash)
            .await?;
        Ok(())
    }

    /// Park `change.email` as pending and send it a verification code.
    pub async fn change_email(&self, user_id: Uuid, change: &EmailChange) -> Result<()> {
        change.validate()?;

        let UserAccount { user, .. } = self.account(user_id).await?;
        if user.email == change.email {
            return Err(AuthError::InvalidInput(
                "New email matches the current one".to_string(),
            ));
        }
        if self.store.email_exists(&change.email).await? {
            return Err(AuthError::DuplicateResource("email".to_string()));
        }

        let code = self
            .email
            .send_verification(&change.email, &user.username)
            .await?;
        self.store
            .set_pending_email(user_id, &change.email, &code, token_expiry())
            .await?;

        tracing::info!(user_id = %user_id, "Email change requested");
        Ok(())
    }

    pub async fn current_profile(&self, user_id: Uuid) -> Result<UserProfile> {
        Ok(self.account(user_id).await?.into())
    }

    pub async fn check_username(&self, username: &str, ip_address: &str) -> Result<bool> {
        self.usernames.check(username, ip_address).await
    }

    async fn evict_session(&self, session_token: &str) -> Result<()> {
        self.sessions
            .evict(session_token)
            .await
            .map_err(|e| AuthError::Internal(format!("Failed to evict cached session: {}", e)))
    }

    async fn forget_session(&self, session_token: &str) {
        if let Err(e) = self.sessions.evict(session_token).await {
            tracing::warn!(error = %e, "Failed to evict cached session");
        }
    }

    async fn account(&self, user_id: Uuid) -> Result<UserAccount> {
        self.store
            .find_account_by_id(user_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("User not found".to_string()))
    }

    async fn issue_verification(&self, user: &User, recipient: &str) -> Result<()> {
        let code = self.email.send_verification(recipient, &user.username).await?;
        self.store
            .set_verification_token(user.id, &code, token_expiry())
            .await?;
        Ok(())
    }

    /// Best effort; a saturated queue only costs the notice.
    async fn send_warning(&self, user: &User, kind: LoginWarningKind, request: &SignInRequest) {
        let device = DeviceType::from_user_agent(request.user_agent.as_deref().unwrap_or(""));
        let job = EmailJob::login_warning(
            &user.email,
            &user.username,
            kind,
            device.as_str(),
            request.ip_address.as_deref().unwrap_or("unknown"),
        );

        if let Err(e) = self.email.submit(job).await {
            tracing::warn!(
                user_id = %user.id,
                warning = kind.as_str(),
                error = %e,
                "Failed to queue login warning"
            );
        }
    }
}

fn token_expiry() -> DateTime<Utc> {
    Utc::now() + Duration::hours(TOKEN_TTL_HOURS)
}
