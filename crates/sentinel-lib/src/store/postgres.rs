//! PostgreSQL log store
//!
//! Reads the `api_logs` table written by the API's request logging filter.

use super::{async_trait, LogBatch, LogStore, RetryPolicy};
use crate::error::StoreError;
use crate::models::LogRecord;
use chrono::NaiveDateTime;
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Most recent window of request logs
pub const RECENT_LOGS_QUERY: &str = r#"
SELECT ip_address,
       "timestamp"::timestamp AS "timestamp",
       endpoint,
       method,
       status_code::int4 AS status_code,
       response_time::float8 AS response_time,
       suspected_payload
FROM api_logs
ORDER BY "timestamp" DESC
LIMIT $1
"#;

/// Raw `api_logs` row; every column is nullable at the database level
#[derive(Debug, Clone, Default, FromRow)]
pub struct LogRow {
    pub ip_address: Option<String>,
    pub timestamp: Option<NaiveDateTime>,
    pub endpoint: Option<String>,
    pub method: Option<String>,
    pub status_code: Option<i32>,
    pub response_time: Option<f64>,
    pub suspected_payload: Option<String>,
}

impl TryFrom<LogRow> for LogRecord {
    type Error = String;

    fn try_from(row: LogRow) -> Result<Self, Self::Error> {
        let record = LogRecord {
            ip_address: row.ip_address.ok_or("missing ip_address")?,
            timestamp: row.timestamp.ok_or("missing timestamp")?.and_utc(),
            endpoint: row.endpoint.ok_or("missing endpoint")?,
            method: row.method.ok_or("missing method")?,
            status_code: row.status_code.ok_or("missing status_code")?,
            response_time: row.response_time.ok_or("missing response_time")?,
            suspected_payload: row.suspected_payload,
        };
        record.validate()?;
        Ok(record)
    }
}

/// Log store backed by a PostgreSQL connection pool
#[derive(Debug, Clone)]
pub struct PgLogStore {
    pool: PgPool,
}

impl PgLogStore {
    /// Connect, retrying a bounded number of times with fixed backoff
    pub async fn connect(database_url: &str, retry: RetryPolicy) -> Result<Self, StoreError> {
        let attempts = retry.attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match PgPoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Duration::from_secs(5))
                .connect(database_url)
                .await
            {
                Ok(pool) => {
                    info!(attempt = attempt, "Connected to log store");
                    return Ok(Self { pool });
                }
                Err(e) => {
                    warn!(
                        attempt = attempt,
                        max_attempts = attempts,
                        error = %e,
                        "Log store connection failed"
                    );
                    last_error = e.to_string();
                    if attempt < attempts {
                        tokio::time::sleep(retry.backoff).await;
                    }
                }
            }
        }

        Err(StoreError::Connection {
            attempts,
            message: last_error,
        })
    }
}

#[async_trait]
impl LogStore for PgLogStore {
    async fn fetch_recent(&self, limit: usize) -> Result<LogBatch, StoreError> {
        let rows = sqlx::query_as::<_, LogRow>(RECENT_LOGS_QUERY)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(classify_error)?;

        let batch = rows_to_batch(rows);
        debug!(
            records = batch.records.len(),
            rejected = batch.rejected,
            "Fetched recent logs"
        );
        Ok(batch)
    }
}

fn rows_to_batch(rows: Vec<LogRow>) -> LogBatch {
    let mut batch = LogBatch::default();
    for row in rows {
        match LogRecord::try_from(row) {
            Ok(record) => batch.records.push(record),
            Err(reason) => {
                warn!(reason = %reason, "Rejected malformed log row");
                batch.rejected += 1;
            }
        }
    }
    batch
}

fn classify_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed => StoreError::Connection {
            attempts: 1,
            message: err.to_string(),
        },
        other => StoreError::Query(other.to_string()),
    }
}
