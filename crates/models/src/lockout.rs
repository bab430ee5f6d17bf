use chrono::{DateTime, Duration, Utc};

/// Progressive lockout: once the failure count reaches `max_attempts`, every
/// further failure extends the lock by another `step`.
#[derive(Debug, Clone, Copy)]
pub struct LockoutPolicy {
    pub max_attempts: i32,
    pub step: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            step: Duration::hours(1),
        }
    }
}

impl LockoutPolicy {
    /// Lock expiry after the `attempts`-th consecutive failure, if any.
    pub fn lock_until(&self, attempts: i32, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if attempts < self.max_attempts {
            return None;
        }
        let steps = i64::from(attempts - self.max_attempts + 1);
        Some(now + self.step * steps as i32)
    }
}

/// Outcome of recording one failed sign-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailedLogin {
    pub attempts: i32,
    pub lock_until: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_lock_below_threshold() {
        let policy = LockoutPolicy::default();
        let now = Utc::now();
        for attempts in 0..5 {
            assert_eq!(policy.lock_until(attempts, now), None);
        }
    }

    #[test]
    fn test_lock_grows_by_one_hour_per_failure() {
        let policy = LockoutPolicy::default();
        let now = Utc::now();
        assert_eq!(policy.lock_until(5, now), Some(now + Duration::hours(1)));
        assert_eq!(policy.lock_until(6, now), Some(now + Duration::hours(2)));
        assert_eq!(policy.lock_until(9, now), Some(now + Duration::hours(5)));
    }
}
