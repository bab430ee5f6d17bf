use super::sessions;
use super::users::{self, UniqueColumn};
use crate::error::{DatabaseError, Result};
use crate::store::AuthStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use ticketing_models::{
    FailedLogin, LockoutPolicy, NewSession, NewUser, SecurityAttributes, Session, User,
    UserAccount, UserPreferences,
};
use uuid::Uuid;

/// Postgres-backed [`AuthStore`].
#[derive(Clone)]
pub struct PgAuthRepository {
    pool: PgPool,
}

impl PgAuthRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn account_for(&self, user: Option<User>) -> Result<Option<UserAccount>> {
        let Some(user) = user else {
            return Ok(None);
        };
        let security = users::find_security(&self.pool, user.id)
            .await?
            .ok_or_else(|| DatabaseError::not_found("SecurityAttributes", &user.id.to_string()))?;

        Ok(Some(UserAccount { user, security }))
    }
}

#[async_trait]
impl AuthStore for PgAuthRepository {
    async fn guest_role_id(&self) -> Result<Option<Uuid>> {
        let row: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM roles WHERE name = 'guest'")
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(id,)| id))
    }

    async fn username_exists(&self, username: &str) -> Result<bool> {
        users::exists_by_column(&self.pool, UniqueColumn::Username, username).await
    }

    async fn email_exists(&self, email: &str) -> Result<bool> {
        users::exists_by_column(&self.pool, UniqueColumn::Email, email).await
    }

    async fn create_account(
        &self,
        user: &NewUser,
        security: &SecurityAttributes,
        preferences: &UserPreferences,
    ) -> Result<User> {
        let mut tx = self.pool.begin().await?;

        let created = users::insert_user(&mut *tx, user).await?;
        users::insert_security(&mut *tx, security).await?;
        users::insert_preferences(&mut *tx, preferences).await?;

        tx.commit().await?;
        Ok(created)
    }

    async fn find_account_by_id(&self, user_id: Uuid) -> Result<Option<UserAccount>> {
        let user = users::find_user_by_id(&self.pool, user_id).await?;
        self.account_for(user).await
    }

    async fn find_account_by_identifier(&self, identifier: &str) -> Result<Option<UserAccount>> {
        let user = users::find_user_by_identifier(&self.pool, identifier).await?;
        self.account_for(user).await
    }

    async fn find_account_by_reset_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<UserAccount>> {
        let Some(security) = users::find_security_by_reset_token(&self.pool, token, now).await?
        else {
            return Ok(None);
        };
        let user = users::find_user_by_id(&self.pool, security.user_id).await?;

        Ok(user.map(|user| UserAccount { user, security }))
    }

    async fn set_verification_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE user_security_attributes
            SET email_verification_token = $2, email_token_expiry = $3, updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("SecurityAttributes", &user_id.to_string()));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn mark_email_verified(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let pending: Option<(Option<String>,)> = sqlx::query_as(
            r#"
            UPDATE user_security_attributes
            SET email_verified = TRUE,
                email_verified_at = $2,
                email_verification_token = NULL,
                email_token_expiry = NULL,
                updated_at = $2
            WHERE user_id = $1
            RETURNING pending_email
            "#,
        )
        .bind(user_id)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((pending_email,)) = pending else {
            return Err(DatabaseError::not_found("SecurityAttributes", &user_id.to_string()));
        };

        if let Some(email) = pending_email.filter(|e| !e.is_empty()) {
            let adopted = sqlx::query(
                r#"
                UPDATE user_profiles
                SET email = $2, updated_at = $3
                WHERE id = $1 AND email = ''
                "#,
            )
            .bind(user_id)
            .bind(&email)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(DatabaseError::classify)?;

            if adopted.rows_affected() > 0 {
                sqlx::query(
                    "UPDATE user_security_attributes SET pending_email = NULL WHERE user_id = $1",
                )
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn record_failed_login(
        &self,
        user_id: Uuid,
        policy: LockoutPolicy,
        now: DateTime<Utc>,
    ) -> Result<FailedLogin> {
        let mut tx = self.pool.begin().await?;

        let (attempts,): (i32,) = sqlx::query_as(
            r#"
            UPDATE user_security_attributes
            SET failed_login_attempts = failed_login_attempts + 1, updated_at = $2
            WHERE user_id = $1
            RETURNING failed_login_attempts
            "#,
        )
        .bind(user_id)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| DatabaseError::not_found("SecurityAttributes", &user_id.to_string()))?;

        let lock_until = policy.lock_until(attempts, now);
        if let Some(until) = lock_until {
            sqlx::query("UPDATE user_security_attributes SET lock_until = $2 WHERE user_id = $1")
                .bind(user_id)
                .bind(until)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(FailedLogin {
            attempts,
            lock_until,
        })
    }

    async fn complete_sign_in(&self, session: &NewSession) -> Result<Session> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE user_security_attributes
            SET failed_login_attempts = 0, lock_until = NULL, updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(session.user_id)
        .execute(&mut *tx)
        .await?;

        let created = sessions::insert_session(&mut *tx, session).await?;

        tx.commit().await?;
        Ok(created)
    }

    async fn find_active_session(&self, session_token: &str) -> Result<Option<Session>> {
        sessions::find_active_session(&self.pool, session_token).await
    }

    async fn find_open_session(&self, session_token: &str) -> Result<Option<Session>> {
        sessions::find_open_session(&self.pool, session_token).await
    }

    async fn end_session(&self, session_id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let ended = sessions::deactivate_session(&mut *tx, session_id, now).await?;
        tx.commit().await?;
        Ok(ended)
    }

    async fn set_password_reset_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE user_security_attributes
            SET password_reset_token = $2, password_reset_token_expiry = $3, updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn complete_password_reset(&self, user_id: Uuid, password_hash: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE user_security_attributes
            SET password_hash = $2,
                password_reset_token = NULL,
                password_reset_token_expiry = NULL,
                failed_login_attempts = 0,
                lock_until = NULL,
                updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(password_hash)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("SecurityAttributes", &user_id.to_string()));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn update_password_hash(&self, user_id: Uuid, password_hash: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE user_security_attributes
            SET password_hash = $2, updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_pending_email(
        &self,
        user_id: Uuid,
        email: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE user_security_attributes
            SET pending_email = $2,
                email_verification_token = $3,
                email_token_expiry = $4,
                updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(email)
        .bind(token)
        .bind(expires_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}
