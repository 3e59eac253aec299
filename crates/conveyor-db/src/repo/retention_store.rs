//! Retention actions against target tables.
//!
//! Table and column names come exclusively from the compiled-in target
//! registry, never from stored policy rows, so building statements by name
//! is safe. Every action is one transaction; the pre-image insert commits
//! together with (and therefore never after) the destructive statement.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conveyor_core::CleanupJobId;
use conveyor_core::UserId;
use conveyor_core::retention::{ArchiveType, DeletionAction, TargetSpec};
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction};
use uuid::Uuid;

use crate::{DbError, DbResult};

/// A row selected for action: id plus the full pre-image.
#[derive(Debug, Clone)]
pub struct EligibleRecord {
    pub id: Uuid,
    pub data: serde_json::Value,
}

#[async_trait]
pub trait RetentionStore: Send + Sync {
    /// Select up to `limit` rows of `target` older than `threshold`,
    /// skipping `exclude` ids, rows under an active legal hold, and rows the
    /// action would be a no-op on (already marked, already anonymized).
    async fn scan_eligible(
        &self,
        target: &TargetSpec,
        action: DeletionAction,
        threshold: DateTime<Utc>,
        exclude: &[Uuid],
        limit: i64,
    ) -> DbResult<Vec<EligibleRecord>>;

    /// Archive the pre-image and delete the row. `Ok(false)` means the row
    /// was gone already and nothing was written.
    async fn hard_delete(
        &self,
        target: &TargetSpec,
        record: &EligibleRecord,
        job_id: CleanupJobId,
        archived_by: UserId,
    ) -> DbResult<bool>;

    /// Set the deletion marker; the row stays queryable.
    async fn soft_delete(&self, target: &TargetSpec, record_id: Uuid) -> DbResult<bool>;

    /// Archive the pre-image and overwrite the registered identifying
    /// columns with their placeholders.
    async fn anonymize(
        &self,
        target: &TargetSpec,
        record: &EligibleRecord,
        job_id: CleanupJobId,
        archived_by: UserId,
    ) -> DbResult<bool>;

    /// Move the row into the archive and remove it from the live table.
    async fn archive_move(
        &self,
        target: &TargetSpec,
        record: &EligibleRecord,
        job_id: CleanupJobId,
        archived_by: UserId,
    ) -> DbResult<bool>;
}

/// PostgreSQL implementation of RetentionStore.
pub struct PgRetentionStore {
    pool: PgPool,
}

impl PgRetentionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_preimage(
        tx: &mut Transaction<'_, Postgres>,
        archive_type: ArchiveType,
        target: &TargetSpec,
        record: &EligibleRecord,
        job_id: CleanupJobId,
        archived_by: UserId,
        reason: &str,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO data_archive
                (id, archive_type, source_table, source_record_id, archived_data,
                 retention_job_id, archived_reason, archived_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(archive_type.as_str())
        .bind(target.table)
        .bind(record.id)
        .bind(&record.data)
        .bind(Uuid::from(job_id))
        .bind(reason)
        .bind(Uuid::from(archived_by))
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Legal holds placed after the scan are rejected at the transaction
    /// boundary, never silently raced past.
    async fn reject_if_held(
        tx: &mut Transaction<'_, Postgres>,
        target: &TargetSpec,
        record_id: Uuid,
    ) -> DbResult<()> {
        let held: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM data_archive
                WHERE source_table = $1 AND source_record_id = $2
                  AND legal_hold_until > NOW()
            )
            "#,
        )
        .bind(target.table)
        .bind(record_id)
        .fetch_one(&mut **tx)
        .await?;
        if held {
            return Err(DbError::IntegrityViolation(format!(
                "record {record_id} in {} is under legal hold",
                target.table
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl RetentionStore for PgRetentionStore {
    async fn scan_eligible(
        &self,
        target: &TargetSpec,
        action: DeletionAction,
        threshold: DateTime<Utc>,
        exclude: &[Uuid],
        limit: i64,
    ) -> DbResult<Vec<EligibleRecord>> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT t.id AS id, row_to_json(t)::jsonb AS data FROM ");
        qb.push(target.table);
        qb.push(" t WHERE t.");
        qb.push(target.age_column);
        qb.push(" < ");
        qb.push_bind(threshold);

        if !exclude.is_empty() {
            qb.push(" AND t.id != ALL(");
            qb.push_bind(exclude.to_vec());
            qb.push(")");
        }

        match action {
            DeletionAction::SoftDelete => {
                qb.push(" AND NOT t.marked_for_deletion");
            }
            DeletionAction::Anonymize => {
                qb.push(
                    " AND NOT EXISTS (SELECT 1 FROM data_archive a \
                     WHERE a.source_table = ",
                );
                qb.push_bind(target.table);
                qb.push(
                    " AND a.source_record_id = t.id \
                     AND a.archive_type = 'anonymization_backup')",
                );
            }
            DeletionAction::HardDelete | DeletionAction::Archive => {}
        }

        // The table's own hold column (the archive exempts held copies).
        if let Some(hold) = target.hold_column {
            qb.push(" AND (t.");
            qb.push(hold);
            qb.push(" IS NULL OR t.");
            qb.push(hold);
            qb.push(" <= NOW())");
        }

        // Holds recorded against this record in the archive.
        if target.archives_preimage() {
            qb.push(
                " AND NOT EXISTS (SELECT 1 FROM data_archive h \
                 WHERE h.source_table = ",
            );
            qb.push_bind(target.table);
            qb.push(" AND h.source_record_id = t.id AND h.legal_hold_until > NOW())");
        }

        qb.push(" ORDER BY t.");
        qb.push(target.age_column);
        qb.push(" ASC LIMIT ");
        qb.push_bind(limit);

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|row| {
                Ok(EligibleRecord {
                    id: row.try_get("id")?,
                    data: row.try_get("data")?,
                })
            })
            .collect()
    }

    async fn hard_delete(
        &self,
        target: &TargetSpec,
        record: &EligibleRecord,
        job_id: CleanupJobId,
        archived_by: UserId,
    ) -> DbResult<bool> {
        let mut tx = self.pool.begin().await?;

        if target.archives_preimage() {
            Self::reject_if_held(&mut tx, target, record.id).await?;
            Self::insert_preimage(
                &mut tx,
                ArchiveType::PreDeletion,
                target,
                record,
                job_id,
                archived_by,
                "retention hard delete",
            )
            .await?;
        }

        let mut qb = QueryBuilder::<Postgres>::new("DELETE FROM ");
        qb.push(target.table);
        qb.push(" WHERE id = ");
        qb.push_bind(record.id);
        if let Some(hold) = target.hold_column {
            qb.push(" AND (");
            qb.push(hold);
            qb.push(" IS NULL OR ");
            qb.push(hold);
            qb.push(" <= NOW())");
        }
        let deleted = qb.build().execute(&mut *tx).await?.rows_affected();

        if deleted == 0 {
            tx.rollback().await?;
            return Ok(false);
        }
        tx.commit().await?;
        Ok(true)
    }

    async fn soft_delete(&self, target: &TargetSpec, record_id: Uuid) -> DbResult<bool> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE ");
        qb.push(target.table);
        qb.push(" SET marked_for_deletion = TRUE, retention_until = NOW() WHERE id = ");
        qb.push_bind(record_id);
        qb.push(" AND NOT marked_for_deletion");
        let updated = qb.build().execute(&self.pool).await?.rows_affected();
        Ok(updated == 1)
    }

    async fn anonymize(
        &self,
        target: &TargetSpec,
        record: &EligibleRecord,
        job_id: CleanupJobId,
        archived_by: UserId,
    ) -> DbResult<bool> {
        let mut tx = self.pool.begin().await?;
        Self::reject_if_held(&mut tx, target, record.id).await?;

        // Scan exclusion plus the one-open-job-per-policy rule make a second
        // backup of the same record a no-op path, not a race.
        let already: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM data_archive
                WHERE source_table = $1 AND source_record_id = $2
                  AND archive_type = 'anonymization_backup'
            )
            "#,
        )
        .bind(target.table)
        .bind(record.id)
        .fetch_one(&mut *tx)
        .await?;
        if already {
            tx.rollback().await?;
            return Ok(false);
        }

        Self::insert_preimage(
            &mut tx,
            ArchiveType::AnonymizationBackup,
            target,
            record,
            job_id,
            archived_by,
            "retention anonymization",
        )
        .await?;

        let short_id = record.id.simple().to_string()[..8].to_string();
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE ");
        qb.push(target.table);
        qb.push(" SET ");
        let mut first = true;
        for column in target.pii {
            if !first {
                qb.push(", ");
            }
            first = false;
            qb.push(column.column);
            qb.push(" = ");
            qb.push_bind(column.placeholder.replace("{id}", &short_id));
        }
        qb.push(" WHERE id = ");
        qb.push_bind(record.id);
        let updated = qb.build().execute(&mut *tx).await?.rows_affected();

        if updated == 0 {
            tx.rollback().await?;
            return Ok(false);
        }
        tx.commit().await?;
        Ok(true)
    }

    async fn archive_move(
        &self,
        target: &TargetSpec,
        record: &EligibleRecord,
        job_id: CleanupJobId,
        archived_by: UserId,
    ) -> DbResult<bool> {
        let mut tx = self.pool.begin().await?;
        Self::reject_if_held(&mut tx, target, record.id).await?;
        Self::insert_preimage(
            &mut tx,
            ArchiveType::PreDeletion,
            target,
            record,
            job_id,
            archived_by,
            "retention archive",
        )
        .await?;

        let mut qb = QueryBuilder::<Postgres>::new("DELETE FROM ");
        qb.push(target.table);
        qb.push(" WHERE id = ");
        qb.push_bind(record.id);
        let deleted = qb.build().execute(&mut *tx).await?.rows_affected();

        if deleted == 0 {
            tx.rollback().await?;
            return Ok(false);
        }
        tx.commit().await?;
        Ok(true)
    }
}
