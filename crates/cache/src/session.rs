use crate::error::Result;
use crate::redis_cache::{session_cache_key, Cache};
use async_trait::async_trait;
use chrono::Utc;
use ticketing_models::Session;

/// Lookup cache in front of the session table.
#[async_trait]
pub trait SessionCache: Send + Sync {
    async fn get(&self, session_token: &str) -> Result<Option<Session>>;

    /// Cache the session until it expires. Already-expired sessions are not stored.
    async fn put(&self, session: &Session) -> Result<()>;

    async fn evict(&self, session_token: &str) -> Result<()>;
}

#[async_trait]
impl SessionCache for Cache {
    async fn get(&self, session_token: &str) -> Result<Option<Session>> {
        Cache::get(self, &session_cache_key(session_token)).await
    }

    async fn put(&self, session: &Session) -> Result<()> {
        let ttl = (session.expires_at - Utc::now()).num_seconds();
        if ttl <= 0 {
            return Ok(());
        }
        self.set(
            &session_cache_key(&session.session_token),
            session,
            Some(ttl as u64),
        )
        .await
    }

    async fn evict(&self, session_token: &str) -> Result<()> {
        self.delete(&session_cache_key(session_token)).await
    }
}
