use crate::error::{ApiError, ApiResult};
use crate::response::ApiResponse;
use crate::AppState;
use axum::extract::{Query, State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use ticketing_models::{LogFilter, LogLevel, LogQuery, LogRecord};

pub const DEFAULT_LIMIT: i64 = 50;
pub const MAX_LIMIT: i64 = 500;

/// Query string accepted by `GET /logs` and `DELETE /logs`.
#[derive(Debug, Default, Deserialize)]
pub struct LogParams {
    pub ip: Option<String>,
    pub route: Option<String>,
    pub message: Option<String>,
    pub level: Option<String>,
    /// RFC 3339
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// `YYYY-MM`
    pub month: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl LogParams {
    pub fn filters(&self) -> ApiResult<Vec<LogFilter>> {
        let mut filters = Vec::new();

        if let Some(ip) = non_empty(&self.ip) {
            filters.push(LogFilter::IpEquals(ip));
        }
        if let Some(route) = non_empty(&self.route) {
            filters.push(LogFilter::RouteEquals(route));
        }
        if let Some(message) = non_empty(&self.message) {
            filters.push(LogFilter::MessageContains(message));
        }
        if let Some(level) = non_empty(&self.level) {
            let level: LogLevel = level
                .parse()
                .map_err(|e: ticketing_models::ParseLevelError| ApiError::bad_request(e.to_string()))?;
            filters.push(LogFilter::LevelEquals(level));
        }
        if let Some(month) = non_empty(&self.month) {
            let range = LogFilter::parse_month(&month).ok_or_else(|| {
                ApiError::bad_request(format!("Invalid month '{}', expected YYYY-MM", month))
            })?;
            filters.push(range);
        }
        if self.from.is_some() || self.to.is_some() {
            let from = self.from.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
            let to = match self.to {
                Some(to) => to,
                None => far_future()?,
            };
            if from >= to {
                return Err(ApiError::bad_request(
                    "'from' must be earlier than 'to'".to_string(),
                ));
            }
            filters.push(LogFilter::DateRange(from, to));
        }

        Ok(filters)
    }

    pub fn query(&self) -> ApiResult<LogQuery> {
        Ok(LogQuery {
            filters: self.filters()?,
            limit: self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
            offset: self.offset.unwrap_or(0).max(0),
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn far_future() -> ApiResult<DateTime<Utc>> {
    // 9999-12-31T23:59:59Z
    DateTime::from_timestamp(253_402_300_799, 0)
        .ok_or_else(|| ApiError::bad_request("Invalid date range"))
}

#[derive(Debug, Serialize)]
pub struct DeletedLogs {
    pub deleted: u64,
}

pub async fn list_logs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LogParams>,
) -> ApiResult<ApiResponse<Vec<LogRecord>>> {
    let records = state.logs.query(&params.query()?).await?;
    Ok(ApiResponse::success(
        format!("{} log records", records.len()),
        records,
    ))
}

/// Hard-delete matching records. At least one filter is required.
pub async fn delete_logs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LogParams>,
) -> ApiResult<ApiResponse<DeletedLogs>> {
    let deleted = state.logs.delete(&params.filters()?).await?;
    Ok(ApiResponse::success(
        format!("Deleted {} log records", deleted),
        DeletedLogs { deleted },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiErrorKind;

    fn is_bad_request<T>(result: ApiResult<T>) -> bool {
        matches!(result, Err(e) if matches!(e.kind(), ApiErrorKind::BadRequest(_)))
    }

    #[test]
    fn test_limit_defaults_and_clamps() {
        let params = LogParams::default();
        assert_eq!(params.query().unwrap().limit, DEFAULT_LIMIT);

        let params = LogParams {
            limit: Some(10_000),
            offset: Some(-4),
            ..Default::default()
        };
        let query = params.query().unwrap();
        assert_eq!(query.limit, MAX_LIMIT);
        assert_eq!(query.offset, 0);
    }

    #[test]
    fn test_filters_from_params() {
        let params = LogParams {
            ip: Some("203.0.113.9".into()),
            route: Some("  ".into()),
            message: Some("not found".into()),
            level: Some("error".into()),
            month: Some("2024-02".into()),
            ..Default::default()
        };
        let filters = params.filters().unwrap();

        assert_eq!(filters.len(), 4);
        assert_eq!(filters[0], LogFilter::IpEquals("203.0.113.9".into()));
        assert_eq!(filters[1], LogFilter::MessageContains("not found".into()));
        assert_eq!(filters[2], LogFilter::LevelEquals(LogLevel::Error));
        assert_eq!(filters[3], LogFilter::month_range(2024, 2).unwrap());
    }

    #[test]
    fn test_invalid_params_rejected() {
        let params = LogParams {
            level: Some("loud".into()),
            ..Default::default()
        };
        assert!(is_bad_request(params.filters()));

        let params = LogParams {
            month: Some("2024-13".into()),
            ..Default::default()
        };
        assert!(is_bad_request(params.filters()));

        let now = Utc::now();
        let params = LogParams {
            from: Some(now),
            to: Some(now - chrono::Duration::hours(1)),
            ..Default::default()
        };
        assert!(is_bad_request(params.filters()));
    }
}
