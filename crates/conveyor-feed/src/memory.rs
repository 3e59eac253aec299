//! In-memory change feed used by tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use conveyor_core::change::ChangeRecord;

use crate::{ChangeFeed, FeedBatch, FeedError, FeedResult};

/// A feed backed by a vector of records, replayable like the real thing.
#[derive(Default)]
pub struct MemoryFeed {
    records: Mutex<Vec<ChangeRecord>>,
    fail_next: AtomicBool,
}

impl MemoryFeed {
    pub fn new(mut records: Vec<ChangeRecord>) -> Self {
        records.sort_by_key(|r| r.sequence);
        Self {
            records: Mutex::new(records),
            fail_next: AtomicBool::new(false),
        }
    }

    pub fn push(&self, record: ChangeRecord) {
        let mut records = self.records.lock().unwrap();
        records.push(record);
        records.sort_by_key(|r| r.sequence);
    }

    /// Make the next fetch fail with a transient error.
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChangeFeed for MemoryFeed {
    async fn fetch_after(&self, cursor: i64, limit: i64) -> FeedResult<FeedBatch> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(FeedError::Unavailable("injected failure".to_string()));
        }
        let records: Vec<ChangeRecord> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.sequence > cursor)
            .take(limit as usize)
            .cloned()
            .collect();
        let last_scanned = records.last().map(|r| r.sequence);
        Ok(FeedBatch {
            scanned: records.len(),
            records,
            last_scanned,
        })
    }
}
