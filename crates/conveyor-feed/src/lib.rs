//! Change feed adapters for Conveyor.
//!
//! A feed yields ordered change records from an external system's change log:
//! - SQL-backed adapter for mysql / pgsql / sqlite sources (production)
//! - In-memory feed (tests)

pub mod memory;
pub mod sql;

pub use memory::MemoryFeed;
pub use sql::SqlChangeFeed;

use async_trait::async_trait;
use conveyor_core::change::ChangeRecord;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    /// The feed is unreachable or the query failed. Transient; the poller
    /// retries with backoff and the cursor stays put.
    #[error("feed unavailable: {0}")]
    Unavailable(String),

    /// The source's connection descriptor cannot produce a working adapter.
    #[error("adapter misconfigured: {0}")]
    Misconfigured(String),
}

pub type FeedResult<T> = std::result::Result<T, FeedError>;

/// One poll's worth of change records.
#[derive(Debug, Clone, Default)]
pub struct FeedBatch {
    /// Well-formed records, ascending by sequence.
    pub records: Vec<ChangeRecord>,
    /// Highest sequence id scanned, including malformed rows that were
    /// skipped. The cursor may advance to this value; without it a malformed
    /// row at the end of a batch would be refetched forever.
    pub last_scanned: Option<i64>,
    /// Rows scanned, including malformed ones. A batch shorter than the
    /// requested limit means the feed is drained.
    pub scanned: usize,
}

impl FeedBatch {
    pub fn is_empty(&self) -> bool {
        self.last_scanned.is_none()
    }
}

/// An ordered, replayable change log keyed by sequence id.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Fetch up to `limit` rows with sequence strictly greater than
    /// `cursor`, ascending. Malformed rows are skipped per-record (counted
    /// into `last_scanned`) and never fail the batch.
    async fn fetch_after(&self, cursor: i64, limit: i64) -> FeedResult<FeedBatch>;
}
