//! Vector-backed log store

use super::{async_trait, LogBatch, LogStore};
use crate::error::StoreError;
use crate::models::LogRecord;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::warn;

/// In-memory log store
#[derive(Debug)]
pub struct InMemoryLogStore {
    records: RwLock<Vec<LogRecord>>,
    available: AtomicBool,
}

impl Default for InMemoryLogStore {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl InMemoryLogStore {
    pub fn new(records: Vec<LogRecord>) -> Self {
        Self {
            records: RwLock::new(records),
            available: AtomicBool::new(true),
        }
    }

    /// Append records
    pub async fn extend(&self, records: impl IntoIterator<Item = LogRecord>) {
        self.records.write().await.extend(records);
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Simulate an outage; fetches fail while unavailable
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }
}

#[async_trait]
impl LogStore for InMemoryLogStore {
    async fn fetch_recent(&self, limit: usize) -> Result<LogBatch, StoreError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(StoreError::Connection {
                attempts: 1,
                message: "in-memory store marked unavailable".to_string(),
            });
        }

        let mut newest: Vec<LogRecord> = self.records.read().await.clone();
        newest.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        newest.truncate(limit);

        let mut batch = LogBatch::default();
        for record in newest {
            match record.validate() {
                Ok(()) => batch.records.push(record),
                Err(reason) => {
                    warn!(ip = %record.ip_address, reason = %reason, "Rejected malformed log record");
                    batch.rejected += 1;
                }
            }
        }
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn record(ip: &str, minutes_ago: i64) -> LogRecord {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        LogRecord {
            ip_address: ip.to_string(),
            timestamp: now - Duration::minutes(minutes_ago),
            endpoint: "/api/data".to_string(),
            method: "GET".to_string(),
            status_code: 200,
            response_time: 42.0,
            suspected_payload: None,
        }
    }

    #[tokio::test]
    async fn test_fetch_recent_orders_and_limits() {
        let store = InMemoryLogStore::new(vec![
            record("a", 30),
            record("b", 10),
            record("c", 20),
        ]);

        let batch = store.fetch_recent(2).await.unwrap();
        let ips: Vec<_> = batch.records.iter().map(|r| r.ip_address.as_str()).collect();
        assert_eq!(ips, vec!["b", "c"]);
        assert_eq!(batch.rejected, 0);
    }

    #[tokio::test]
    async fn test_malformed_rows_rejected_individually() {
        let mut bad = record("", 5);
        bad.ip_address.clear();
        let store = InMemoryLogStore::new(vec![record("a", 1), bad, record("b", 2)]);

        let batch = store.fetch_recent(10).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.rejected, 1);
    }

    #[tokio::test]
    async fn test_unavailable_store() {
        let store = InMemoryLogStore::default();
        store.set_available(false);
        assert!(matches!(
            store.fetch_recent(10).await,
            Err(StoreError::Connection { .. })
        ));

        store.set_available(true);
        assert!(store.fetch_recent(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_extend() {
        let store = InMemoryLogStore::default();
        assert!(store.is_empty().await);
        store.extend(vec![record("a", 1), record("b", 2)]).await;
        assert_eq!(store.len().await, 2);
    }
}
