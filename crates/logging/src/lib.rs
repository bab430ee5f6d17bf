//! Persistent application log pipeline.
//!
//! Request handlers submit records through a [`LogSink`]; a single drain task
//! coalesces repeats of the same `(ip, route, message)` within the dedup
//! window and writes the rest to the [`LogStore`](ticketing_database::LogStore)
//! in batches. Failures inside the pipeline are reported on `tracing` only.

pub mod caller;
pub mod client_ip;
pub mod config;
mod drain;
pub mod error;
pub mod pipeline;

pub use caller::{CallerFilter, Frame, Origin};
pub use client_ip::client_ip;
pub use config::LogPipelineConfig;
pub use error::{LogError, Result};
pub use pipeline::{LogService, LogSink, RequestContext};
