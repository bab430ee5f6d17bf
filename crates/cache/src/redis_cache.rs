use crate::error::Result;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub url: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379/0".to_string(),
        }
    }
}

impl CacheConfig {
    /// `REDIS_URL` wins when set; otherwise the URL is assembled from
    /// `REDIS_ADDR`, `REDIS_PASSWORD` and `REDIS_DB`.
    pub fn from_env() -> Self {
        if let Ok(url) = std::env::var("REDIS_URL") {
            return Self { url };
        }

        let addr = std::env::var("REDIS_ADDR").unwrap_or_else(|_| "localhost:6379".to_string());
        let password = std::env::var("REDIS_PASSWORD").ok();
        let db = std::env::var("REDIS_DB")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        Self {
            url: build_url(&addr, password.as_deref(), db),
        }
    }
}

fn build_url(addr: &str, password: Option<&str>, db: u32) -> String {
    match password.filter(|p| !p.is_empty()) {
        Some(password) => format!("redis://:{}@{}/{}", password, addr, db),
        None => format!("redis://{}/{}", addr, db),
    }
}

#[derive(Clone)]
pub struct Cache {
    manager: ConnectionManager,
}

impl Cache {
    pub async fn new(config: CacheConfig) -> Result<Self> {
        let client = Client::open(config.url)?;
        let manager = ConnectionManager::new(client).await?;

        Ok(Self { manager })
    }

    /// Set a value in the cache with optional TTL (seconds)
    pub async fn set<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl_seconds: Option<u64>,
    ) -> Result<()> {
        let serialized = serde_json::to_string(value)?;
        let mut conn = self.manager.clone();

        if let Some(ttl) = ttl_seconds {
            conn.set_ex::<_, _, ()>(key, serialized, ttl).await?;
        } else {
            conn.set::<_, _, ()>(key, serialized).await?;
        }

        Ok(())
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let mut conn = self.manager.clone();
        let value: Option<String> = conn.get(key).await?;

        match value {
            Some(s) => Ok(Some(serde_json::from_str(&s)?)),
            None => Ok(None),
        }
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.manager.clone();
        redis::cmd("PING").query_async::<()>(&mut conn).await?;
        Ok(())
    }
}

/// Session entries are keyed by a digest of the token so raw tokens never
/// reach Redis.
pub fn session_cache_key(session_token: &str) -> String {
    let digest = Sha256::digest(session_token.as_bytes());
    format!("session:{}", hex::encode(digest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_url() {
        assert_eq!(build_url("cache:6379", None, 2), "redis://cache:6379/2");
        assert_eq!(build_url("cache:6379", Some(""), 0), "redis://cache:6379/0");
        assert_eq!(
            build_url("cache:6379", Some("s3cret"), 1),
            "redis://:s3cret@cache:6379/1"
        );
    }

    #[test]
    fn test_session_key_hides_token() {
        let key = session_cache_key("raw-token");
        assert!(key.starts_with("session:"));
        assert!(!key.contains("raw-token"));
        assert_eq!(key.len(), "session:".len() + 64);
    }

    #[tokio::test]
    #[ignore] // Only run with Redis available
    async fn test_set_get() {
        let cache = Cache::new(CacheConfig::from_env()).await.unwrap();

        cache.set("test_key", &"test_value", Some(60)).await.unwrap();
        let value: Option<String> = cache.get("test_key").await.unwrap();

        assert_eq!(value, Some("test_value".to_string()));
        cache.delete("test_key").await.unwrap();
    }
}
