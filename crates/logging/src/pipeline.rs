use std::backtrace::Backtrace;
use std::net::SocketAddr;
use std::panic::Location;
use std::sync::Arc;

use axum::http::{HeaderMap, Method, Uri};
use serde_json::json;
use ticketing_database::LogStore;
use ticketing_models::{LogFilter, LogLevel, LogQuery, LogRecord, NewLogRecord};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::caller::{trim_path, Origin};
use crate::client_ip::client_ip;
use crate::config::LogPipelineConfig;
use crate::drain::Drain;
use crate::error::{LogError, Result};

/// Headers never copied into a record's context.
const REDACTED_HEADERS: [&str; 3] = ["authorization", "cookie", "set-cookie"];

/// Request details attached to a log record.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub route: Option<String>,
    pub method: Option<String>,
    pub status_code: Option<u16>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    /// JSON text with query, path params and headers.
    pub context: Option<String>,
}

impl RequestContext {
    pub fn from_request(
        method: &Method,
        uri: &Uri,
        headers: &HeaderMap,
        peer: Option<SocketAddr>,
    ) -> Self {
        let header_map: serde_json::Map<String, serde_json::Value> = headers
            .iter()
            .filter(|(name, _)| !REDACTED_HEADERS.contains(&name.as_str()))
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), json!(v)))
            })
            .collect();

        let context = json!({
            "query": uri.query().unwrap_or_default(),
            "headers": header_map,
        });

        Self {
            route: Some(uri.path().to_string()),
            method: Some(method.as_str().to_string()),
            status_code: None,
            ip_address: client_ip(headers, peer),
            user_agent: headers
                .get(axum::http::header::USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            context: Some(context.to_string()),
        }
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    /// Merge path parameters into the JSON context.
    pub fn with_params(mut self, params: &[(String, String)]) -> Self {
        if params.is_empty() {
            return self;
        }
        let mut context = self
            .context
            .as_deref()
            .and_then(|c| serde_json::from_str::<serde_json::Value>(c).ok())
            .unwrap_or_else(|| json!({}));
        if let Some(object) = context.as_object_mut() {
            let params: serde_json::Map<String, serde_json::Value> =
                params.iter().map(|(k, v)| (k.clone(), json!(v))).collect();
            object.insert("params".to_string(), serde_json::Value::Object(params));
        }
        self.context = Some(context.to_string());
        self
    }
}

/// A record on its way to the drain, with the stack it was submitted from.
#[derive(Debug)]
pub(crate) struct Submission {
    pub(crate) record: NewLogRecord,
    pub(crate) trace: Option<Arc<Backtrace>>,
}

/// Cheap, clonable submit handle for request handlers.
///
/// Submitting never symbolizes a stack: info and warning records carry the
/// caller's location, error records an unresolved backtrace that the drain
/// formats later.
#[derive(Clone)]
pub struct LogSink {
    sender: mpsc::Sender<Submission>,
    environment: Arc<str>,
}

impl LogSink {
    pub(crate) fn new(sender: mpsc::Sender<Submission>, environment: &str) -> Self {
        Self {
            sender,
            environment: Arc::from(environment),
        }
    }

    /// Enqueue a record without waiting.
    ///
    /// Returns false when the record was dropped because the channel is
    /// full or the pipeline has shut down.
    pub fn submit(&self, record: NewLogRecord) -> bool {
        self.send(Submission {
            record,
            trace: None,
        })
    }

    fn send(&self, submission: Submission) -> bool {
        match self.sender.try_send(submission) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(Submission { record, .. })) => {
                tracing::warn!(
                    level = %record.level,
                    message = %record.message,
                    "Log channel full, record dropped"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(Submission { record, .. })) => {
                tracing::warn!(
                    level = %record.level,
                    message = %record.message,
                    "Log pipeline stopped, record dropped"
                );
                false
            }
        }
    }

    /// Build a record stamped with the caller's position and submit it.
    #[track_caller]
    pub fn log(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        request: Option<&RequestContext>,
    ) -> bool {
        let origin = if level == LogLevel::Error {
            Origin::capture()
        } else {
            Origin::here()
        };
        self.log_from(level, message, request, origin)
    }

    /// Submit a record attributed to an origin captured elsewhere, such as
    /// where an error was raised.
    pub fn log_from(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        request: Option<&RequestContext>,
        origin: Origin,
    ) -> bool {
        let record = self.record(level, message.into(), request, origin.location());
        let trace = if level == LogLevel::Error {
            origin.trace().cloned()
        } else {
            None
        };
        self.send(Submission { record, trace })
    }

    #[track_caller]
    pub fn info(&self, message: impl Into<String>, request: Option<&RequestContext>) -> bool {
        self.log(LogLevel::Info, message, request)
    }

    #[track_caller]
    pub fn warning(&self, message: impl Into<String>, request: Option<&RequestContext>) -> bool {
        self.log(LogLevel::Warning, message, request)
    }

    #[track_caller]
    pub fn error(&self, message: impl Into<String>, request: Option<&RequestContext>) -> bool {
        self.log(LogLevel::Error, message, request)
    }

    fn record(
        &self,
        level: LogLevel,
        message: String,
        request: Option<&RequestContext>,
        location: &Location<'_>,
    ) -> NewLogRecord {
        let mut record = NewLogRecord::new(level, message, self.environment.as_ref());
        record.file = Some(trim_path(location.file()));
        record.line = i32::try_from(location.line()).ok();

        if let Some(request) = request {
            record.route = request.route.clone();
            record.method = request.method.clone();
            record.status_code = request.status_code.map(i32::from);
            record.ip_address = request.ip_address.clone();
            record.user_agent = request.user_agent.clone();
            record.context = request.context.clone();
        }

        record
    }
}

/// Owner of the log pipeline: the drain task, its cancellation and the
/// read side of the store.
pub struct LogService {
    sink: LogSink,
    store: Arc<dyn LogStore>,
    cancel: CancellationToken,
    drain: Mutex<Option<JoinHandle<()>>>,
}

impl LogService {
    /// Spawn the drain on the current runtime.
    pub fn start(store: Arc<dyn LogStore>, config: LogPipelineConfig) -> Self {
        let buffer_size = config.buffer_size.max(1);
        let (sender, receiver) = mpsc::channel(buffer_size);
        let cancel = CancellationToken::new();

        let drain = Drain::new(
            Arc::clone(&store),
            receiver,
            buffer_size,
            config.flush_period,
            config.dedup_window,
            config.callers,
        );
        let handle = tokio::spawn(drain.run(cancel.clone()));

        Self {
            sink: LogSink::new(sender, &config.environment),
            store,
            cancel,
            drain: Mutex::new(Some(handle)),
        }
    }

    pub fn sink(&self) -> LogSink {
        self.sink.clone()
    }

    /// Records matching every filter, newest first, soft-deleted ones included.
    pub async fn query(&self, query: &LogQuery) -> Result<Vec<LogRecord>> {
        Ok(self.store.query(query).await?)
    }

    pub async fn delete(&self, filters: &[LogFilter]) -> Result<u64> {
        if filters.is_empty() {
            return Err(LogError::EmptyFilter);
        }
        let deleted = self.store.delete(filters).await?;
        tracing::info!(deleted, filters = filters.len(), "Deleted log records");
        Ok(deleted)
    }

    /// Stop the drain and wait until it has flushed. Idempotent.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = self.drain.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Log drain task failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink_with_capacity(capacity: usize) -> (LogSink, mpsc::Receiver<Submission>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (LogSink::new(sender, "test"), receiver)
    }

    #[tokio::test]
    async fn test_submit_drops_when_full() {
        let (sink, mut receiver) = sink_with_capacity(2);

        assert!(sink.info("one", None));
        assert!(sink.info("two", None));
        assert!(!sink.info("three", None));

        assert_eq!(receiver.recv().await.unwrap().record.message, "one");
        assert!(sink.info("four", None));
    }

    #[tokio::test]
    async fn test_submit_after_close_is_dropped() {
        let (sink, receiver) = sink_with_capacity(4);
        drop(receiver);
        assert!(!sink.warning("late", None));
    }

    #[tokio::test]
    async fn test_record_carries_caller_and_request() {
        let (sink, mut receiver) = sink_with_capacity(4);
        let request = RequestContext {
            route: Some("/api/v1/auth/sign-in".into()),
            method: Some("POST".into()),
            ip_address: Some("203.0.113.9".into()),
            ..Default::default()
        }
        .with_status(401);

        let line = line!() + 1;
        sink.error("invalid credentials", Some(&request));
        let Submission { record, trace } = receiver.recv().await.unwrap();

        assert_eq!(record.level, LogLevel::Error);
        assert_eq!(record.environment, "test");
        assert_eq!(record.status_code, Some(401));
        assert_eq!(record.route.as_deref(), Some("/api/v1/auth/sign-in"));
        assert_eq!(record.file.as_deref(), Some("logging/src/pipeline.rs"));
        assert_eq!(record.line, Some(line as i32));
        assert!(record.stack.is_none());
        assert!(trace.is_some());
    }

    #[tokio::test]
    async fn test_non_error_records_carry_location_only() {
        let (sink, mut receiver) = sink_with_capacity(4);

        let line = line!() + 1;
        sink.info("cache warmed", None);
        let Submission { record, trace } = receiver.recv().await.unwrap();

        assert!(trace.is_none());
        assert_eq!(record.line, Some(line as i32));

        sink.log_from(LogLevel::Warning, "slow", None, Origin::capture());
        assert!(receiver.recv().await.unwrap().trace.is_none());
    }

    #[test]
    fn test_request_context_redacts_credentials() {
        let mut headers = HeaderMap::new();
        headers.insert("cookie", "session_token=abc".parse().unwrap());
        headers.insert("user-agent", "curl/8.4.0".parse().unwrap());
        headers.insert("x-real-ip", "198.51.100.4".parse().unwrap());
        let uri: Uri = "/api/v1/logs?level=error".parse().unwrap();

        let request = RequestContext::from_request(&Method::GET, &uri, &headers, None)
            .with_params(&[("id".to_string(), "42".to_string())]);

        let context = request.context.unwrap();
        assert!(!context.contains("session_token"));
        assert!(context.contains("level=error"));
        assert!(context.contains("\"params\""));
        assert_eq!(request.ip_address.as_deref(), Some("198.51.100.4"));
        assert_eq!(request.user_agent.as_deref(), Some("curl/8.4.0"));
        assert_eq!(request.route.as_deref(), Some("/api/v1/logs"));
    }
}
