//! In-memory session cache for tests.

use crate::error::{CacheError, Result};
use crate::session::SessionCache;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use ticketing_models::Session;
use tokio::sync::RwLock;

#[derive(Clone, Default)]
pub struct MemorySessionCache {
    entries: Arc<RwLock<HashMap<String, Session>>>,
    fail: Arc<AtomicBool>,
}

impl MemorySessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail as if Redis were unreachable.
    pub fn fail_all(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub async fn contains(&self, session_token: &str) -> bool {
        self.entries.read().await.contains_key(session_token)
    }

    fn check(&self) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CacheError::Other("cache unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionCache for MemorySessionCache {
    async fn get(&self, session_token: &str) -> Result<Option<Session>> {
        self.check()?;
        let now = Utc::now();
        Ok(self
            .entries
            .read()
            .await
            .get(session_token)
            .filter(|s| s.expires_at > now)
            .cloned())
    }

    async fn put(&self, session: &Session) -> Result<()> {
        self.check()?;
        if session.expires_at <= Utc::now() {
            return Ok(());
        }
        self.entries
            .write()
            .await
            .insert(session.session_token.clone(), session.clone());
        Ok(())
    }

    async fn evict(&self, session_token: &str) -> Result<()> {
        self.check()?;
        self.entries.write().await.remove(session_token);
        Ok(())
    }
}
