//! SQL-backed change feed adapter.
//!
//! Reads the external system's `changes_cache` table through sqlx's Any
//! driver, so one adapter covers mysql, pgsql and sqlite sources. Expected
//! shape: `(id BIGINT, evidence TEXT, operation TEXT, fields TEXT,
//! recorded_at TEXT)` with `fields` holding a JSON object.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use conveyor_core::change::{ChangeOp, ChangeRecord};
use conveyor_core::source::ConnectionSpec;
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, Row};
use tracing::warn;

use crate::{ChangeFeed, FeedBatch, FeedError, FeedResult};

/// Change feed reading an external database's change-tracking table.
pub struct SqlChangeFeed {
    pool: AnyPool,
    table: String,
}

impl SqlChangeFeed {
    /// Connect using a source's connection descriptor.
    pub async fn connect(spec: &ConnectionSpec) -> FeedResult<Self> {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(2)
            .connect(&spec.url())
            .await
            .map_err(|e| FeedError::Misconfigured(e.to_string()))?;
        Ok(Self {
            pool,
            table: "changes_cache".to_string(),
        })
    }

    /// Override the change-tracking table name.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    fn decode(row: &AnyRow) -> Result<ChangeRecord, String> {
        let sequence: i64 = row.try_get("id").map_err(|e| e.to_string())?;
        let evidence: String = row.try_get("evidence").map_err(|e| e.to_string())?;
        let operation: String = row.try_get("operation").map_err(|e| e.to_string())?;
        let fields: String = row.try_get("fields").map_err(|e| e.to_string())?;
        let recorded_at: String = row.try_get("recorded_at").map_err(|e| e.to_string())?;

        let operation = ChangeOp::parse(&operation)
            .ok_or_else(|| format!("unknown operation {operation:?}"))?;
        let fields: serde_json::Value =
            serde_json::from_str(&fields).map_err(|e| format!("bad fields json: {e}"))?;
        if !fields.is_object() {
            return Err("fields is not a json object".to_string());
        }
        let occurred_at = parse_timestamp(&recorded_at)
            .ok_or_else(|| format!("unparseable timestamp {recorded_at:?}"))?;

        Ok(ChangeRecord {
            sequence,
            evidence,
            operation,
            fields,
            occurred_at,
        })
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    // mysql-style "YYYY-MM-DD hh:mm:ss", taken as UTC
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

#[async_trait]
impl ChangeFeed for SqlChangeFeed {
    async fn fetch_after(&self, cursor: i64, limit: i64) -> FeedResult<FeedBatch> {
        // Placeholder syntax differs per driver under Any, and both values
        // are integers, so they are formatted into the statement directly.
        let query = format!(
            "SELECT id, evidence, operation, fields, recorded_at \
             FROM {table} WHERE id > {cursor} ORDER BY id ASC LIMIT {limit}",
            table = self.table,
        );
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| FeedError::Unavailable(e.to_string()))?;

        let mut batch = FeedBatch::default();
        for row in &rows {
            let sequence: i64 = row
                .try_get("id")
                .map_err(|e| FeedError::Unavailable(e.to_string()))?;
            batch.last_scanned = Some(sequence);
            batch.scanned += 1;
            match Self::decode(row) {
                Ok(record) => batch.records.push(record),
                Err(reason) => {
                    warn!(sequence, %reason, "skipping malformed change row");
                }
            }
        }
        Ok(batch)
    }
}
