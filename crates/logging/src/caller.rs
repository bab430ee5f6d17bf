//! Source position of the code that submitted a log record.
//!
//! Every record carries the `#[track_caller]` location of its submit call.
//! Error records also carry an unresolved backtrace; the drain task
//! symbolizes it and walks it from the innermost frame outwards, skipping
//! frames whose source path contains any ignored substring (the web stack,
//! the async runtime, the standard library, request plumbing and this crate
//! itself). The first surviving frame replaces the submit location.

use std::backtrace::Backtrace;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Frames kept for error-level records.
pub const MAX_STACK_FRAMES: usize = 20;

/// One resolved backtrace frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub function: String,
    pub file: String,
    pub line: u32,
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}:{})", self.function, trim_path(&self.file), self.line)
    }
}

/// Decides which frames count as "caller" frames.
#[derive(Debug, Clone)]
pub struct CallerFilter {
    ignored: Vec<String>,
}

impl Default for CallerFilter {
    fn default() -> Self {
        Self::new([
            "/axum-",
            "/axum/",
            "/tower-",
            "/tower/",
            "/hyper-",
            "/tokio-",
            "/tokio/",
            "/futures-",
            "/rustc/",
            "/library/std/",
            "/library/core/",
            "/library/alloc/",
            "/ticketing-logging-",
            "crates/logging/src/",
            "crates/api/src/error.rs",
            "crates/api/src/middleware/request_log.rs",
        ])
    }
}

impl CallerFilter {
    pub fn new<I, S>(ignored: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ignored: ignored.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_ignored(&self, file: &str) -> bool {
        self.ignored.iter().any(|marker| file.contains(marker.as_str()))
    }

    /// Up to `max` caller frames of `trace`, innermost first.
    ///
    /// Symbolizes the trace. Empty when the binary carries no debug info.
    pub fn resolve(&self, trace: &Backtrace, max: usize) -> Vec<Frame> {
        self.select(parse_backtrace(&trace.to_string()), max)
    }

    pub fn select(&self, frames: Vec<Frame>, max: usize) -> Vec<Frame> {
        frames
            .into_iter()
            .filter(|frame| !self.is_ignored(&frame.file))
            .take(max)
            .collect()
    }
}

/// Where a log record or an error came from.
///
/// Cheap to clone; the backtrace is shared and stays unresolved until the
/// drain formats it.
#[derive(Debug, Clone)]
pub struct Origin {
    location: &'static Location<'static>,
    trace: Option<Arc<Backtrace>>,
}

impl Origin {
    /// The calling location only.
    #[track_caller]
    pub fn here() -> Self {
        Self {
            location: Location::caller(),
            trace: None,
        }
    }

    /// The calling location plus the current call stack.
    #[track_caller]
    pub fn capture() -> Self {
        Self {
            location: Location::caller(),
            trace: Some(Arc::new(Backtrace::force_capture())),
        }
    }

    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }

    pub fn trace(&self) -> Option<&Arc<Backtrace>> {
        self.trace.as_ref()
    }
}

/// Parse the `Display` form of a [`Backtrace`].
///
/// Each frame is a numbered function line optionally followed by an
/// `at <path>:<line>:<col>` line; frames without a location are dropped.
pub fn parse_backtrace(trace: &str) -> Vec<Frame> {
    let mut frames = Vec::new();
    let mut function: Option<&str> = None;

    for line in trace.lines().map(str::trim) {
        if let Some(location) = line.strip_prefix("at ") {
            if let (Some(name), Some((file, line))) = (function, parse_location(location)) {
                frames.push(Frame {
                    function: name.to_string(),
                    file,
                    line,
                });
            }
            continue;
        }

        function = line
            .split_once(": ")
            .filter(|(index, _)| !index.is_empty() && index.chars().all(|c| c.is_ascii_digit()))
            .map(|(_, name)| name);
    }

    frames
}

fn parse_location(location: &str) -> Option<(String, u32)> {
    let mut parts = location.rsplitn(3, ':');
    let _column = parts.next()?;
    let line = parts.next()?.parse().ok()?;
    let file = parts.next()?;
    Some((file.to_string(), line))
}

/// Keep the last three path segments.
pub fn trim_path(path: &str) -> String {
    let segments: Vec<&str> = path.split(['/', '\\']).filter(|s| !s.is_empty()).collect();
    let start = segments.len().saturating_sub(3);
    segments[start..].join("/")
}
