use crate::caller::CallerFilter;
use std::time::Duration;

const DEFAULT_BUFFER_SIZE: usize = 100;
const DEFAULT_FLUSH_PERIOD_SECS: u64 = 5;

#[derive(Debug, Clone)]
pub struct LogPipelineConfig {
    /// Channel capacity and the batch size that triggers a flush.
    pub buffer_size: usize,
    pub flush_period: Duration,
    /// Repeats of a key younger than this are coalesced.
    pub dedup_window: chrono::Duration,
    /// Process-wide label stamped on every record.
    pub environment: String,
    pub callers: CallerFilter,
}

impl Default for LogPipelineConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            flush_period: Duration::from_secs(DEFAULT_FLUSH_PERIOD_SECS),
            dedup_window: chrono::Duration::hours(1),
            environment: "development".to_string(),
            callers: CallerFilter::default(),
        }
    }
}

impl LogPipelineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            buffer_size: std::env::var("LOG_BUFFER_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|size| *size > 0)
                .unwrap_or(defaults.buffer_size),
            flush_period: std::env::var("LOG_FLUSH_PERIOD_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.flush_period),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| defaults.environment.clone()),
            ..defaults
        }
    }
}
