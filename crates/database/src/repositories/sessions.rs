use crate::error::Result;
use chrono::{DateTime, Utc};
use sqlx::{Executor, Postgres};
use ticketing_models::{NewSession, Session};
use uuid::Uuid;

pub async fn insert_session<'e, E>(executor: E, session: &NewSession) -> Result<Session>
where
    E: Executor<'e, Database = Postgres>,
{
    let created = sqlx::query_as::<_, Session>(
        r#"
        INSERT INTO user_sessions (
            user_id, session_token, refresh_token, ip_address, user_agent,
            device_type, is_active, expires_at, refresh_expiry
        )
        VALUES ($1, $2, $3, $4, $5, $6, TRUE, $7, $8)
        RETURNING id, user_id, session_token, refresh_token, ip_address, user_agent,
                  device_type, is_active, expires_at, refresh_expiry, logged_out_at,
                  created_at, updated_at
        "#,
    )
    .bind(session.user_id)
    .bind(&session.session_token)
    .bind(&session.refresh_token)
    .bind(&session.ip_address)
    .bind(&session.user_agent)
    .bind(session.device_type.as_str())
    .bind(session.expires_at)
    .bind(session.refresh_expiry)
    .fetch_one(executor)
    .await?;

    Ok(created)
}

/// Active, unexpired session for a token.
pub async fn find_active_session<'e, E>(executor: E, session_token: &str) -> Result<Option<Session>>
where
    E: Executor<'e, Database = Postgres>,
{
    let session = sqlx::query_as::<_, Session>(
        r#"
        SELECT id, user_id, session_token, refresh_token, ip_address, user_agent,
               device_type, is_active, expires_at, refresh_expiry, logged_out_at,
               created_at, updated_at
        FROM user_sessions
        WHERE session_token = $1 AND is_active = TRUE AND expires_at > NOW()
        "#,
    )
    .bind(session_token)
    .fetch_optional(executor)
    .await?;

    Ok(session)
}

/// Session marked active for a token regardless of expiry; logout uses this
/// so an expired session can still be closed.
pub async fn find_open_session<'e, E>(executor: E, session_token: &str) -> Result<Option<Session>>
where
    E: Executor<'e, Database = Postgres>,
{
    let session = sqlx::query_as::<_, Session>(
        r#"
        SELECT id, user_id, session_token, refresh_token, ip_address, user_agent,
               device_type, is_active, expires_at, refresh_expiry, logged_out_at,
               created_at, updated_at
        FROM user_sessions
        WHERE session_token = $1 AND is_active = TRUE
        "#,
    )
    .bind(session_token)
    .fetch_optional(executor)
    .await?;

    Ok(session)
}

pub async fn deactivate_session<'e, E>(executor: E, session_id: Uuid, now: DateTime<Utc>) -> Result<bool>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        r#"
        UPDATE user_sessions
        SET is_active = FALSE, logged_out_at = $2, updated_at = $2
        WHERE id = $1 AND is_active = TRUE
        "#,
    )
    .bind(session_id)
    .bind(now)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}
