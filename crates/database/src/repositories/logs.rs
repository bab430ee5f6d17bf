use crate::error::{DatabaseError, Result};
use crate::store::LogStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use ticketing_models::{DedupKey, LogFilter, LogQuery, LogRecord, LogRepeat, NewLogRecord};

/// Rows per INSERT statement; keeps bind parameters well under the
/// Postgres limit of 65535.
const INSERT_CHUNK: usize = 1000;

#[derive(Clone)]
pub struct PgLogRepository {
    pool: PgPool,
}

impl PgLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LogStore for PgLogRepository {
    async fn find_recent_duplicate(
        &self,
        key: DedupKey<'_>,
        since: DateTime<Utc>,
    ) -> Result<Option<LogRecord>> {
        let record = sqlx::query_as::<_, LogRecord>(
            r#"
            SELECT * FROM logs
            WHERE ip_address = $1
              AND route = $2
              AND message = $3
              AND created_at >= $4
              AND deleted_at IS NULL
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(key.ip_address)
        .bind(key.route)
        .bind(key.message)
        .bind(since)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn record_repeat(&self, id: i64, repeat: &LogRepeat) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE logs
            SET occurrences = occurrences + 1,
                context = COALESCE($2, context),
                stack = COALESCE($3, stack),
                status_code = COALESCE($4, status_code),
                method = COALESCE($5, method),
                user_agent = COALESCE($6, user_agent),
                file = COALESCE($7, file),
                line = COALESCE($8, line),
                level = $9,
                updated_at = $10
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&repeat.context)
        .bind(&repeat.stack)
        .bind(repeat.status_code)
        .bind(&repeat.method)
        .bind(&repeat.user_agent)
        .bind(&repeat.file)
        .bind(repeat.line)
        .bind(repeat.level.as_str())
        .bind(repeat.seen_at)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("Log", &id.to_string()));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn insert_batch(&self, records: &[NewLogRecord]) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for chunk in records.chunks(INSERT_CHUNK) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                r#"
                INSERT INTO logs (
                    level, message, route, method, status_code,
                    ip_address, user_agent, file, line, stack,
                    environment, context, occurrences, created_at, updated_at
                )
                "#,
            );

            builder.push_values(chunk, |mut row, record| {
                row.push_bind(record.level.as_str())
                    .push_bind(record.message.clone())
                    .push_bind(record.route.clone())
                    .push_bind(record.method.clone())
                    .push_bind(record.status_code)
                    .push_bind(record.ip_address.clone())
                    .push_bind(record.user_agent.clone())
                    .push_bind(record.file.clone())
                    .push_bind(record.line)
                    .push_bind(record.stack.clone())
                    .push_bind(record.environment.clone())
                    .push_bind(record.context.clone())
                    .push_bind(record.occurrences)
                    .push_bind(record.created_at)
                    .push_bind(record.updated_at);
            });

            inserted += builder.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn query(&self, query: &LogQuery) -> Result<Vec<LogRecord>> {
        // Unscoped on purpose: soft-deleted rows are part of the listing.
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT * FROM logs WHERE TRUE");

        push_filters(&mut builder, &query.filters);

        builder.push(" ORDER BY created_at DESC LIMIT ");
        builder.push_bind(query.limit);
        builder.push(" OFFSET ");
        builder.push_bind(query.offset);

        let records = builder
            .build_query_as::<LogRecord>()
            .fetch_all(&self.pool)
            .await?;

        Ok(records)
    }

    async fn delete(&self, filters: &[LogFilter]) -> Result<u64> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("DELETE FROM logs WHERE TRUE");
        push_filters(&mut builder, filters);

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

/// Append each filter as a bound `AND` condition.
fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filters: &[LogFilter]) {
    for filter in filters {
        match filter {
            LogFilter::IpEquals(ip) => {
                builder.push(" AND ip_address = ").push_bind(ip.clone());
            }
            LogFilter::RouteEquals(route) => {
                builder.push(" AND route = ").push_bind(route.clone());
            }
            LogFilter::MessageContains(needle) => {
                builder
                    .push(" AND message LIKE ")
                    .push_bind(format!("%{}%", escape_like(needle)));
            }
            LogFilter::LevelEquals(level) => {
                builder.push(" AND level = ").push_bind(level.as_str());
            }
            LogFilter::DateRange(from, to) => {
                builder
                    .push(" AND created_at >= ")
                    .push_bind(*from)
                    .push(" AND created_at < ")
                    .push_bind(*to);
            }
        }
    }
}

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use ticketing_models::LogLevel;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn test_push_filters_binds_every_condition() {
        let filters = vec![
            LogFilter::IpEquals("203.0.113.9".into()),
            LogFilter::LevelEquals(LogLevel::Error),
            LogFilter::MessageContains("timeout".into()),
        ];
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT * FROM logs WHERE TRUE");
        push_filters(&mut builder, &filters);

        assert_eq!(
            builder.sql(),
            "SELECT * FROM logs WHERE TRUE AND ip_address = $1 AND level = $2 AND message LIKE $3"
        );
    }
}
