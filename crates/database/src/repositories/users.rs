//! Queries over `user_profiles`, `user_security_attributes` and
//! `user_preferences`. Each function takes any Postgres executor so the
//! same statement runs on the pool or inside a transaction.

use crate::error::{DatabaseError, Result};
use chrono::{DateTime, Utc};
use sqlx::{Executor, Postgres};
use ticketing_models::{NewUser, SecurityAttributes, User, UserPreferences};
use uuid::Uuid;

pub async fn insert_user<'e, E>(executor: E, user: &NewUser) -> Result<User>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as::<_, User>(
        r#"
        INSERT INTO user_profiles (id, username, email, phone, date_of_birth, role_id)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, username, email, phone, date_of_birth, role_id, created_at, updated_at
        "#,
    )
    .bind(user.id)
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.phone)
    .bind(user.date_of_birth)
    .bind(user.role_id)
    .fetch_one(executor)
    .await
    .map_err(DatabaseError::classify)
}

pub async fn insert_security<'e, E>(executor: E, security: &SecurityAttributes) -> Result<()>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO user_security_attributes (
            user_id, password_hash, failed_login_attempts, lock_until,
            email_verified, email_verified_at, email_verification_token, email_token_expiry,
            password_reset_token, password_reset_token_expiry, pending_email, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(security.user_id)
    .bind(&security.password_hash)
    .bind(security.failed_login_attempts)
    .bind(security.lock_until)
    .bind(security.email_verified)
    .bind(security.email_verified_at)
    .bind(&security.email_verification_token)
    .bind(security.email_token_expiry)
    .bind(&security.password_reset_token)
    .bind(security.password_reset_token_expiry)
    .bind(&security.pending_email)
    .bind(security.updated_at)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn insert_preferences<'e, E>(executor: E, preferences: &UserPreferences) -> Result<()>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO user_preferences (
            user_id, language, theme, timezone, show_profile, allow_following,
            show_email, show_phone, show_location, show_events
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(preferences.user_id)
    .bind(&preferences.language)
    .bind(&preferences.theme)
    .bind(&preferences.timezone)
    .bind(preferences.show_profile)
    .bind(preferences.allow_following)
    .bind(preferences.show_email)
    .bind(preferences.show_phone)
    .bind(preferences.show_location)
    .bind(preferences.show_events)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn find_user_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<User>>
where
    E: Executor<'e, Database = Postgres>,
{
    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT id, username, email, phone, date_of_birth, role_id, created_at, updated_at
        FROM user_profiles
        WHERE id = $1 AND deleted_at IS NULL
        "#,
    )
    .bind(id)
    .fetch_optional(executor)
    .await?;

    Ok(user)
}

pub async fn find_user_by_identifier<'e, E>(executor: E, identifier: &str) -> Result<Option<User>>
where
    E: Executor<'e, Database = Postgres>,
{
    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT id, username, email, phone, date_of_birth, role_id, created_at, updated_at
        FROM user_profiles
        WHERE (username = $1 OR email = $1) AND deleted_at IS NULL
        LIMIT 1
        "#,
    )
    .bind(identifier)
    .fetch_optional(executor)
    .await?;

    Ok(user)
}

pub async fn find_security<'e, E>(executor: E, user_id: Uuid) -> Result<Option<SecurityAttributes>>
where
    E: Executor<'e, Database = Postgres>,
{
    let security = sqlx::query_as::<_, SecurityAttributes>(
        "SELECT * FROM user_security_attributes WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_optional(executor)
    .await?;

    Ok(security)
}

pub async fn find_security_by_reset_token<'e, E>(
    executor: E,
    token: &str,
    now: DateTime<Utc>,
) -> Result<Option<SecurityAttributes>>
where
    E: Executor<'e, Database = Postgres>,
{
    let security = sqlx::query_as::<_, SecurityAttributes>(
        r#"
        SELECT * FROM user_security_attributes
        WHERE password_reset_token = $1 AND password_reset_token_expiry > $2
        "#,
    )
    .bind(token)
    .bind(now)
    .fetch_optional(executor)
    .await?;

    Ok(security)
}

pub async fn exists_by_column<'e, E>(executor: E, column: UniqueColumn, value: &str) -> Result<bool>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = match column {
        UniqueColumn::Username => "SELECT EXISTS(SELECT 1 FROM user_profiles WHERE username = $1)",
        UniqueColumn::Email => "SELECT EXISTS(SELECT 1 FROM user_profiles WHERE email = $1)",
    };

    let (exists,): (bool,) = sqlx::query_as(sql).bind(value).fetch_one(executor).await?;
    Ok(exists)
}

#[derive(Debug, Clone, Copy)]
pub enum UniqueColumn {
    Username,
    Email,
}
