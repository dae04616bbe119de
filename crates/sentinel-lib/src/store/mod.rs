//! Log store collaborators
//!
//! The detector only ever reads a bounded window of the most recent request
//! logs. Implementations are provided for PostgreSQL (the production store)
//! and for an in-memory vector used by demo mode and tests.

mod memory;
mod postgres;

pub use memory::InMemoryLogStore;
pub use postgres::{LogRow, PgLogStore, RECENT_LOGS_QUERY};

use crate::error::StoreError;
use crate::models::LogRecord;
use std::time::Duration;

pub use async_trait::async_trait;

/// A window of records fetched from the store
#[derive(Debug, Clone, Default)]
pub struct LogBatch {
    /// Valid records, most recent first
    pub records: Vec<LogRecord>,
    /// Rows dropped because a required column was missing or invalid
    pub rejected: usize,
}

impl LogBatch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Read-only access to recent request logs
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Fetch at most `limit` records ordered by timestamp descending
    async fn fetch_recent(&self, limit: usize) -> Result<LogBatch, StoreError>;
}

/// Bounded retry with fixed backoff for store connections
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 30,
            backoff: Duration::from_secs(2),
        }
    }
}
