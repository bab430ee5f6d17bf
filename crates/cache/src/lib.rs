pub mod error;
pub mod local;
pub mod redis_cache;
pub mod session;

#[cfg(feature = "test-utils")]
pub mod mocks;

pub use error::{CacheError, Result};
pub use local::{IntervalLimiter, TtlCache};
pub use redis_cache::{session_cache_key, Cache, CacheConfig};
pub use session::SessionCache;
