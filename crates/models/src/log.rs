use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Severity of a persisted log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Error)]
#[error("unknown log level: {0}")]
pub struct ParseLevelError(pub String);

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" => Ok(Self::Info),
            "warning" | "warn" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            other => Err(ParseLevelError(other.to_string())),
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = ParseLevelError;

    fn try_from(value: String) -> Result<Self, ParseLevelError> {
        value.parse()
    }
}

/// A persisted log row.
///
/// `occurrences` counts how many submissions were coalesced into this row
/// within the dedup window. It never decreases.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LogRecord {
    pub id: i64,
    #[sqlx(try_from = "String")]
    pub level: LogLevel,
    pub message: String,
    pub route: Option<String>,
    pub method: Option<String>,
    pub status_code: Option<i32>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub file: Option<String>,
    pub line: Option<i32>,
    pub stack: Option<String>,
    pub environment: String,
    pub context: Option<String>,
    pub occurrences: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A record as submitted by a request handler, before persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLogRecord {
    pub level: LogLevel,
    pub message: String,
    pub route: Option<String>,
    pub method: Option<String>,
    pub status_code: Option<i32>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub file: Option<String>,
    pub line: Option<i32>,
    pub stack: Option<String>,
    pub environment: String,
    pub context: Option<String>,
    pub occurrences: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Identity used to coalesce repeated records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DedupKey<'a> {
    pub ip_address: &'a str,
    pub route: &'a str,
    pub message: &'a str,
}

impl NewLogRecord {
    pub fn new(level: LogLevel, message: impl Into<String>, environment: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            level,
            message: message.into(),
            route: None,
            method: None,
            status_code: None,
            ip_address: None,
            user_agent: None,
            file: None,
            line: None,
            stack: None,
            environment: environment.into(),
            context: None,
            occurrences: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns `None` when either the IP address or the route is missing,
    /// in which case the record is never coalesced.
    pub fn dedup_key(&self) -> Option<DedupKey<'_>> {
        let ip_address = non_empty(self.ip_address.as_deref())?;
        let route = non_empty(self.route.as_deref())?;
        Some(DedupKey {
            ip_address,
            route,
            message: &self.message,
        })
    }

    /// Fold a later repeat of the same key into this pending record.
    pub fn absorb(&mut self, repeat: &LogRepeat) {
        self.occurrences += 1;
        self.updated_at = repeat.seen_at;
        repeat.apply(
            &mut self.context,
            &mut self.stack,
            &mut self.status_code,
            &mut self.method,
            &mut self.user_agent,
            &mut self.file,
            &mut self.line,
            &mut self.level,
        );
    }
}

impl LogRecord {
    pub fn dedup_key(&self) -> Option<DedupKey<'_>> {
        let ip_address = non_empty(self.ip_address.as_deref())?;
        let route = non_empty(self.route.as_deref())?;
        Some(DedupKey {
            ip_address,
            route,
            message: &self.message,
        })
    }

    /// Apply a repeat to a stored row, as the store does inside its transaction.
    pub fn absorb(&mut self, repeat: &LogRepeat) {
        self.occurrences += 1;
        self.updated_at = repeat.seen_at;
        repeat.apply(
            &mut self.context,
            &mut self.stack,
            &mut self.status_code,
            &mut self.method,
            &mut self.user_agent,
            &mut self.file,
            &mut self.line,
            &mut self.level,
        );
    }
}

/// Fields carried by a repeated submission.
///
/// Each field is `Some` only when the repeat supplied a non-empty value, so
/// applying it never blanks out what an earlier submission recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRepeat {
    pub context: Option<String>,
    pub stack: Option<String>,
    pub status_code: Option<i32>,
    pub method: Option<String>,
    pub user_agent: Option<String>,
    pub file: Option<String>,
    pub line: Option<i32>,
    pub level: LogLevel,
    pub seen_at: DateTime<Utc>,
}

impl LogRepeat {
    pub fn from_record(record: &NewLogRecord) -> Self {
        Self {
            context: non_empty_owned(&record.context),
            stack: non_empty_owned(&record.stack),
            status_code: record.status_code.filter(|code| *code != 0),
            method: non_empty_owned(&record.method),
            user_agent: non_empty_owned(&record.user_agent),
            file: non_empty_owned(&record.file),
            line: record.line.filter(|line| *line != 0),
            level: record.level,
            seen_at: record.created_at,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn apply(
        &self,
        context: &mut Option<String>,
        stack: &mut Option<String>,
        status_code: &mut Option<i32>,
        method: &mut Option<String>,
        user_agent: &mut Option<String>,
        file: &mut Option<String>,
        line: &mut Option<i32>,
        level: &mut LogLevel,
    ) {
        if let Some(v) = &self.context {
            *context = Some(v.clone());
        }
        if let Some(v) = &self.stack {
            *stack = Some(v.clone());
        }
        if let Some(v) = self.status_code {
            *status_code = Some(v);
        }
        if let Some(v) = &self.method {
            *method = Some(v.clone());
        }
        if let Some(v) = &self.user_agent {
            *user_agent = Some(v.clone());
        }
        if let Some(v) = &self.file {
            *file = Some(v.clone());
        }
        if let Some(v) = self.line {
            *line = Some(v);
        }
        *level = self.level;
    }
}

/// One conjunctive condition of a log query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFilter {
    IpEquals(String),
    RouteEquals(String),
    MessageContains(String),
    LevelEquals(LogLevel),
    /// Inclusive lower bound, exclusive upper bound on `created_at`.
    DateRange(DateTime<Utc>, DateTime<Utc>),
}

impl LogFilter {
    /// The whole calendar month (UTC) as a date range.
    pub fn month_range(year: i32, month: u32) -> Option<Self> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)?;
        let next = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)?
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)?
        };
        let start = Utc.from_utc_datetime(&first.and_hms_opt(0, 0, 0)?);
        let end = Utc.from_utc_datetime(&next.and_hms_opt(0, 0, 0)?);
        Some(Self::DateRange(start, end))
    }

    /// Parse a `YYYY-MM` month into a range.
    pub fn parse_month(value: &str) -> Option<Self> {
        let (year, month) = value.trim().split_once('-')?;
        Self::month_range(year.parse().ok()?, month.parse().ok()?)
    }

    pub fn matches(&self, record: &LogRecord) -> bool {
        match self {
            Self::IpEquals(ip) => record.ip_address.as_deref() == Some(ip.as_str()),
            Self::RouteEquals(route) => record.route.as_deref() == Some(route.as_str()),
            Self::MessageContains(needle) => record.message.contains(needle.as_str()),
            Self::LevelEquals(level) => record.level == *level,
            Self::DateRange(from, to) => record.created_at >= *from && record.created_at < *to,
        }
    }
}

/// A filtered, paginated log listing.
#[derive(Debug, Clone, Default)]
pub struct LogQuery {
    pub filters: Vec<LogFilter>,
    pub limit: i64,
    pub offset: i64,
}

impl LogQuery {
    pub fn matches(&self, record: &LogRecord) -> bool {
        self.filters.iter().all(|f| f.matches(record))
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn non_empty_owned(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.trim().is_empty()).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(ip: Option<&str>, route: Option<&str>) -> NewLogRecord {
        let mut r = NewLogRecord::new(LogLevel::Info, "not found", "test");
        r.ip_address = ip.map(str::to_string);
        r.route = route.map(str::to_string);
        r
    }

    #[test]
    fn test_level_from_stored_text() {
        assert_eq!(LogLevel::try_from("warning".to_string()).ok(), Some(LogLevel::Warning));
        assert_eq!(LogLevel::try_from("ERROR".to_string()).ok(), Some(LogLevel::Error));
        assert!(LogLevel::try_from("loud".to_string()).is_err());
    }

    #[test]
    fn test_dedup_key_requires_ip_and_route() {
        assert!(record(Some("203.0.113.9"), Some("/api/v1/events")).dedup_key().is_some());
        assert!(record(None, Some("/api/v1/events")).dedup_key().is_none());
        assert!(record(Some("203.0.113.9"), None).dedup_key().is_none());
        assert!(record(Some("  "), Some("/api/v1/events")).dedup_key().is_none());
    }

    #[test]
    fn test_absorb_keeps_fields_when_repeat_is_empty() {
        let mut first = record(Some("1.1.1.1"), Some("/r"));
        first.method = Some("GET".into());
        first.status_code = Some(404);
        first.context = Some("{\"q\":1}".into());

        let mut second = record(Some("1.1.1.1"), Some("/r"));
        second.level = LogLevel::Error;
        second.method = Some(String::new());
        second.stack = Some("frame".into());

        first.absorb(&LogRepeat::from_record(&second));

        assert_eq!(first.occurrences, 2);
        assert_eq!(first.method.as_deref(), Some("GET"));
        assert_eq!(first.status_code, Some(404));
        assert_eq!(first.context.as_deref(), Some("{\"q\":1}"));
        assert_eq!(first.stack.as_deref(), Some("frame"));
        assert_eq!(first.level, LogLevel::Error);
    }

    #[test]
    fn test_month_range_wraps_year() {
        let Some(LogFilter::DateRange(from, to)) = LogFilter::parse_month("2025-12") else {
            panic!("expected a range");
        };
        assert_eq!(from.to_rfc3339(), "2025-12-01T00:00:00+00:00");
        assert_eq!(to.to_rfc3339(), "2026-01-01T00:00:00+00:00");
        assert!(LogFilter::parse_month("2025-13").is_none());
    }

    #[test]
    fn test_level_parsing() {
        assert_eq!("WARN".parse::<LogLevel>().unwrap(), LogLevel::Warning);
        assert_eq!("error".parse::<LogLevel>().unwrap(), LogLevel::Error);
        assert!("fatal".parse::<LogLevel>().is_err());
    }
}
