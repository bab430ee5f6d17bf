use crate::error::{AuthError, Result};
use crate::validation::check_username;
use std::sync::Arc;
use std::time::Duration;
use ticketing_cache::{IntervalLimiter, TtlCache};
use ticketing_database::AuthStore;

pub const AVAILABILITY_TTL: Duration = Duration::from_secs(5 * 60);
pub const CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Answers "is this username free?" for the sign-up form.
///
/// Answers are cached for five minutes and each client IP may ask at most
/// once per second.
#[derive(Clone)]
pub struct UsernameAvailability {
    store: Arc<dyn AuthStore>,
    answers: TtlCache<String, bool>,
    limiter: IntervalLimiter,
}

impl UsernameAvailability {
    pub fn new(store: Arc<dyn AuthStore>) -> Self {
        Self {
            store,
            answers: TtlCache::new(AVAILABILITY_TTL),
            limiter: IntervalLimiter::new(CHECK_INTERVAL),
        }
    }

    pub async fn check(&self, username: &str, ip_address: &str) -> Result<bool> {
        if !self.limiter.check(ip_address).await {
            return Err(AuthError::RateLimited);
        }

        check_username(username)?;

        if let Some(available) = self.answers.get(&username.to_string()).await {
            return Ok(available);
        }

        let available = !self.store.username_exists(username).await?;
        self.answers.insert(username.to_string(), available).await;
        Ok(available)
    }

    /// Drop a cached answer once the name is taken.
    pub async fn forget(&self, username: &str) {
        self.answers.remove(&username.to_string()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ticketing_database::mocks::MemoryAuthStore;

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_per_ip() {
        let availability = UsernameAvailability::new(Arc::new(MemoryAuthStore::new()));

        assert!(availability.check("event_fan", "198.51.100.1").await.unwrap());
        assert!(matches!(
            availability.check("event_fan", "198.51.100.1").await,
            Err(AuthError::RateLimited)
        ));
        assert!(availability.check("event_fan", "198.51.100.2").await.is_ok());

        tokio::time::advance(CHECK_INTERVAL).await;
        assert!(availability.check("event_fan", "198.51.100.1").await.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_username_rejected() {
        let availability = UsernameAvailability::new(Arc::new(MemoryAuthStore::new()));
        assert!(matches!(
            availability.check("root_user", "198.51.100.1").await,
            Err(AuthError::InvalidInput(_))
        ));
    }
}
