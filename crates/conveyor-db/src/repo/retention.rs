//! Retention policies, cleanup job tracking and the data archive.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conveyor_core::retention::{
    ArchiveEntry, ArchiveType, CleanupCounts, CleanupJob, CleanupJobType, CleanupStatus,
    DeletionAction, RecordError, RetentionPolicy,
};
use conveyor_core::{ArchiveId, CleanupJobId, PolicyId, UserId};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{DbError, DbResult};

#[derive(Debug, sqlx::FromRow)]
struct PolicyRow {
    id: Uuid,
    policy_name: String,
    data_type: String,
    table_name: String,
    retention_period_days: i32,
    grace_period_days: i32,
    deletion_action: String,
    legal_basis: Option<String>,
    description: Option<String>,
    enabled: bool,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PolicyRow> for RetentionPolicy {
    type Error = DbError;

    fn try_from(row: PolicyRow) -> DbResult<Self> {
        let action = DeletionAction::parse(&row.deletion_action).ok_or_else(|| {
            DbError::Decode(format!("unknown deletion action {:?}", row.deletion_action))
        })?;
        Ok(RetentionPolicy {
            id: PolicyId::from_uuid(row.id),
            policy_name: row.policy_name,
            data_type: row.data_type,
            table_name: row.table_name,
            retention_period_days: row.retention_period_days,
            grace_period_days: row.grace_period_days,
            action,
            legal_basis: row.legal_basis,
            description: row.description,
            enabled: row.enabled,
            created_by: UserId::from_uuid(row.created_by),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
pub trait RetentionPolicyRepo: Send + Sync {
    async fn get(&self, id: PolicyId) -> DbResult<RetentionPolicy>;
    async fn get_by_name(&self, name: &str) -> DbResult<RetentionPolicy>;
    async fn list(&self) -> DbResult<Vec<RetentionPolicy>>;
    async fn list_enabled(&self) -> DbResult<Vec<RetentionPolicy>>;
}

/// PostgreSQL implementation of RetentionPolicyRepo.
pub struct PgRetentionPolicyRepo {
    pool: PgPool,
}

impl PgRetentionPolicyRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RetentionPolicyRepo for PgRetentionPolicyRepo {
    async fn get(&self, id: PolicyId) -> DbResult<RetentionPolicy> {
        let row = sqlx::query_as::<_, PolicyRow>("SELECT * FROM retention_policies WHERE id = $1")
            .bind(Uuid::from(id))
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("retention policy {id}")))?;
        row.try_into()
    }

    async fn get_by_name(&self, name: &str) -> DbResult<RetentionPolicy> {
        let row = sqlx::query_as::<_, PolicyRow>(
            "SELECT * FROM retention_policies WHERE policy_name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("retention policy {name:?}")))?;
        row.try_into()
    }

    async fn list(&self) -> DbResult<Vec<RetentionPolicy>> {
        let rows =
            sqlx::query_as::<_, PolicyRow>("SELECT * FROM retention_policies ORDER BY policy_name")
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_enabled(&self) -> DbResult<Vec<RetentionPolicy>> {
        let rows = sqlx::query_as::<_, PolicyRow>(
            "SELECT * FROM retention_policies WHERE enabled ORDER BY policy_name",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CleanupJobRow {
    id: Uuid,
    policy_id: Uuid,
    job_type: String,
    status: String,
    started_by: Option<Uuid>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    records_processed: i64,
    records_deleted: i64,
    records_anonymized: i64,
    records_archived: i64,
    errors: serde_json::Value,
    summary: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<CleanupJobRow> for CleanupJob {
    type Error = DbError;

    fn try_from(row: CleanupJobRow) -> DbResult<Self> {
        let job_type = CleanupJobType::parse(&row.job_type)
            .ok_or_else(|| DbError::Decode(format!("unknown job type {:?}", row.job_type)))?;
        let status = CleanupStatus::parse(&row.status)
            .ok_or_else(|| DbError::Decode(format!("unknown status {:?}", row.status)))?;
        let errors: Vec<RecordError> = serde_json::from_value(row.errors)
            .map_err(|e| DbError::Decode(format!("bad errors: {e}")))?;
        Ok(CleanupJob {
            id: CleanupJobId::from_uuid(row.id),
            policy_id: PolicyId::from_uuid(row.policy_id),
            job_type,
            status,
            started_by: row.started_by.map(UserId::from_uuid),
            started_at: row.started_at,
            completed_at: row.completed_at,
            counts: CleanupCounts {
                processed: row.records_processed,
                deleted: row.records_deleted,
                anonymized: row.records_anonymized,
                archived: row.records_archived,
            },
            errors,
            summary: row.summary,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
pub trait CleanupJobRepo: Send + Sync {
    /// Create a pending cleanup job. At most one open (pending or running)
    /// job per policy; a second is rejected as a duplicate, which is what
    /// keeps two sweepers off the same records.
    async fn create(
        &self,
        policy_id: PolicyId,
        job_type: CleanupJobType,
        started_by: Option<UserId>,
    ) -> DbResult<CleanupJob>;

    async fn mark_running(&self, id: CleanupJobId) -> DbResult<()>;

    /// Flip the cooperative cancel flag on an open job.
    async fn request_cancel(&self, id: CleanupJobId) -> DbResult<()>;
    async fn cancel_requested(&self, id: CleanupJobId) -> DbResult<bool>;

    /// Flush counters mid-sweep, for observability.
    async fn update_progress(&self, id: CleanupJobId, counts: CleanupCounts) -> DbResult<()>;

    /// Terminal transition with final counters, errors and summary.
    async fn finalize(
        &self,
        id: CleanupJobId,
        status: CleanupStatus,
        counts: CleanupCounts,
        errors: &[RecordError],
        summary: &str,
    ) -> DbResult<()>;

    async fn get(&self, id: CleanupJobId) -> DbResult<CleanupJob>;
    async fn list_recent(&self, limit: i64) -> DbResult<Vec<CleanupJob>>;
}

/// PostgreSQL implementation of CleanupJobRepo.
pub struct PgCleanupJobRepo {
    pool: PgPool,
}

impl PgCleanupJobRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CleanupJobRepo for PgCleanupJobRepo {
    async fn create(
        &self,
        policy_id: PolicyId,
        job_type: CleanupJobType,
        started_by: Option<UserId>,
    ) -> DbResult<CleanupJob> {
        let row = sqlx::query_as::<_, CleanupJobRow>(
            r#"
            INSERT INTO retention_cleanup_jobs (id, policy_id, job_type, status, started_by)
            SELECT $1, $2, $3, 'pending', $4
            WHERE NOT EXISTS (
                SELECT 1 FROM retention_cleanup_jobs
                WHERE policy_id = $2 AND status IN ('pending', 'running')
            )
            RETURNING *
            "#,
        )
        .bind(Uuid::from(CleanupJobId::new()))
        .bind(Uuid::from(policy_id))
        .bind(job_type.as_str())
        .bind(started_by.map(Uuid::from))
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| {
            DbError::Duplicate(format!("policy {policy_id} already has an open cleanup job"))
        })?;
        row.try_into()
    }

    async fn mark_running(&self, id: CleanupJobId) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE retention_cleanup_jobs
            SET status = 'running', started_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(Uuid::from(id))
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("pending cleanup job {id}")));
        }
        Ok(())
    }

    async fn request_cancel(&self, id: CleanupJobId) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE retention_cleanup_jobs
            SET cancel_requested = TRUE
            WHERE id = $1 AND status IN ('pending', 'running')
            "#,
        )
        .bind(Uuid::from(id))
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("open cleanup job {id}")));
        }
        Ok(())
    }

    async fn cancel_requested(&self, id: CleanupJobId) -> DbResult<bool> {
        let requested: bool = sqlx::query_scalar(
            "SELECT cancel_requested FROM retention_cleanup_jobs WHERE id = $1",
        )
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("cleanup job {id}")))?;
        Ok(requested)
    }

    async fn update_progress(&self, id: CleanupJobId, counts: CleanupCounts) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE retention_cleanup_jobs
            SET records_processed = $2, records_deleted = $3,
                records_anonymized = $4, records_archived = $5
            WHERE id = $1
            "#,
        )
        .bind(Uuid::from(id))
        .bind(counts.processed)
        .bind(counts.deleted)
        .bind(counts.anonymized)
        .bind(counts.archived)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn finalize(
        &self,
        id: CleanupJobId,
        status: CleanupStatus,
        counts: CleanupCounts,
        errors: &[RecordError],
        summary: &str,
    ) -> DbResult<()> {
        let errors = serde_json::to_value(errors).map_err(|e| DbError::Decode(e.to_string()))?;
        let result = sqlx::query(
            r#"
            UPDATE retention_cleanup_jobs
            SET status = $2, completed_at = NOW(),
                records_processed = $3, records_deleted = $4,
                records_anonymized = $5, records_archived = $6,
                errors = $7, summary = $8
            WHERE id = $1 AND status = 'running'
            "#,
        )
        .bind(Uuid::from(id))
        .bind(status.as_str())
        .bind(counts.processed)
        .bind(counts.deleted)
        .bind(counts.anonymized)
        .bind(counts.archived)
        .bind(errors)
        .bind(summary)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("running cleanup job {id}")));
        }
        Ok(())
    }

    async fn get(&self, id: CleanupJobId) -> DbResult<CleanupJob> {
        let row = sqlx::query_as::<_, CleanupJobRow>(
            "SELECT * FROM retention_cleanup_jobs WHERE id = $1",
        )
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("cleanup job {id}")))?;
        row.try_into()
    }

    async fn list_recent(&self, limit: i64) -> DbResult<Vec<CleanupJob>> {
        let rows = sqlx::query_as::<_, CleanupJobRow>(
            "SELECT * FROM retention_cleanup_jobs ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ArchiveRow {
    id: Uuid,
    archive_type: String,
    source_table: String,
    source_record_id: Uuid,
    archived_data: serde_json::Value,
    retention_job_id: Option<Uuid>,
    archived_reason: Option<String>,
    legal_hold_until: Option<DateTime<Utc>>,
    archived_by: Uuid,
    archived_at: DateTime<Utc>,
}

impl TryFrom<ArchiveRow> for ArchiveEntry {
    type Error = DbError;

    fn try_from(row: ArchiveRow) -> DbResult<Self> {
        let archive_type = ArchiveType::parse(&row.archive_type).ok_or_else(|| {
            DbError::Decode(format!("unknown archive type {:?}", row.archive_type))
        })?;
        Ok(ArchiveEntry {
            id: ArchiveId::from_uuid(row.id),
            archive_type,
            source_table: row.source_table,
            source_record_id: row.source_record_id,
            archived_data: row.archived_data,
            retention_job_id: row.retention_job_id.map(CleanupJobId::from_uuid),
            archived_reason: row.archived_reason,
            legal_hold_until: row.legal_hold_until,
            archived_by: UserId::from_uuid(row.archived_by),
            archived_at: row.archived_at,
        })
    }
}

/// Parameters for a manually written archive entry (legal holds).
#[derive(Debug, Clone)]
pub struct NewArchiveEntry {
    pub archive_type: ArchiveType,
    pub source_table: String,
    pub source_record_id: Uuid,
    pub archived_data: serde_json::Value,
    pub archived_reason: Option<String>,
    pub legal_hold_until: Option<DateTime<Utc>>,
    pub archived_by: UserId,
}

#[async_trait]
pub trait ArchiveRepo: Send + Sync {
    async fn insert(&self, entry: NewArchiveEntry) -> DbResult<ArchiveEntry>;
    async fn list_for_record(&self, table: &str, record_id: Uuid) -> DbResult<Vec<ArchiveEntry>>;

    /// Place or extend a legal hold on an archived copy.
    async fn set_legal_hold(&self, id: ArchiveId, until: DateTime<Utc>) -> DbResult<()>;
}

/// PostgreSQL implementation of ArchiveRepo.
pub struct PgArchiveRepo {
    pool: PgPool,
}

impl PgArchiveRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ArchiveRepo for PgArchiveRepo {
    async fn insert(&self, entry: NewArchiveEntry) -> DbResult<ArchiveEntry> {
        let row = sqlx::query_as::<_, ArchiveRow>(
            r#"
            INSERT INTO data_archive
                (id, archive_type, source_table, source_record_id, archived_data,
                 archived_reason, legal_hold_until, archived_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::from(ArchiveId::new()))
        .bind(entry.archive_type.as_str())
        .bind(&entry.source_table)
        .bind(entry.source_record_id)
        .bind(&entry.archived_data)
        .bind(&entry.archived_reason)
        .bind(entry.legal_hold_until)
        .bind(Uuid::from(entry.archived_by))
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn list_for_record(&self, table: &str, record_id: Uuid) -> DbResult<Vec<ArchiveEntry>> {
        let rows = sqlx::query_as::<_, ArchiveRow>(
            r#"
            SELECT * FROM data_archive
            WHERE source_table = $1 AND source_record_id = $2
            ORDER BY archived_at DESC
            "#,
        )
        .bind(table)
        .bind(record_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn set_legal_hold(&self, id: ArchiveId, until: DateTime<Utc>) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE data_archive SET legal_hold_until = $2 WHERE id = $1",
        )
        .bind(Uuid::from(id))
        .bind(until)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("archive entry {id}")));
        }
        Ok(())
    }
}
