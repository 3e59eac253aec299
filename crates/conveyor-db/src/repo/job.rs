//! Job ledger: lifecycle mutations and run template counters.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conveyor_core::exitcode::{ExitCodePolicy, ExitOutcome, ExitSeverity, classify};
use conveyor_core::job::{Job, JobStatus, Launcher, NewJob};
use conveyor_core::{AppId, CompanyId, JobId, TemplateId};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{DbError, DbResult};

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    app_id: Uuid,
    company_id: Uuid,
    runtemplate_id: Uuid,
    status: String,
    env: serde_json::Value,
    launcher: serde_json::Value,
    begin_at: DateTime<Utc>,
    end_at: Option<DateTime<Utc>>,
    exitcode: Option<i32>,
    created_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for Job {
    type Error = DbError;

    fn try_from(row: JobRow) -> DbResult<Self> {
        let status = JobStatus::parse(&row.status)
            .ok_or_else(|| DbError::Decode(format!("unknown job status {:?}", row.status)))?;
        let env: BTreeMap<String, String> = serde_json::from_value(row.env)
            .map_err(|e| DbError::Decode(format!("bad env: {e}")))?;
        let launcher: Launcher = serde_json::from_value(row.launcher)
            .map_err(|e| DbError::Decode(format!("bad launcher: {e}")))?;
        Ok(Job {
            id: JobId::from_uuid(row.id),
            app_id: AppId::from_uuid(row.app_id),
            company_id: CompanyId::from_uuid(row.company_id),
            runtemplate_id: TemplateId::from_uuid(row.runtemplate_id),
            status,
            env,
            launcher,
            begin_at: row.begin_at,
            end_at: row.end_at,
            exitcode: row.exitcode,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ExitPolicyRow {
    severity: String,
    retry: bool,
}

/// A terminal job together with how it was counted.
#[derive(Debug, Clone)]
pub struct CompletedJob {
    pub job: Job,
    pub outcome: ExitOutcome,
}

#[async_trait]
pub trait JobRepo: Send + Sync {
    /// Create a pending job. Used identically by the event dispatcher (via
    /// the batch commit path) and external schedulers (via this method).
    async fn create(&self, job: NewJob) -> DbResult<Job>;

    /// Mark a job running and stamp its begin time.
    async fn begin(&self, id: JobId) -> DbResult<Job>;

    /// Finish a job: end time, exit code and status change in the same
    /// transaction as the owning template's counter increment. Completing a
    /// job twice is rejected.
    async fn complete(&self, id: JobId, exitcode: i32) -> DbResult<CompletedJob>;

    async fn get(&self, id: JobId) -> DbResult<Job>;
    async fn list_recent(&self, limit: i64) -> DbResult<Vec<Job>>;

    /// Whether a change with this (source, sequence) was already dispatched.
    async fn event_job_exists(
        &self,
        source_id: conveyor_core::SourceId,
        sequence: i64,
    ) -> DbResult<bool>;
}

/// PostgreSQL implementation of JobRepo.
pub struct PgJobRepo {
    pool: PgPool,
}

impl PgJobRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRepo for PgJobRepo {
    async fn create(&self, job: NewJob) -> DbResult<Job> {
        let env = serde_json::to_value(&job.env).map_err(|e| DbError::Decode(e.to_string()))?;
        let launcher =
            serde_json::to_value(&job.launcher).map_err(|e| DbError::Decode(e.to_string()))?;
        let origin = job.launcher.event_origin();

        let row = sqlx::query_as::<_, JobRow>(
            r#"
            INSERT INTO jobs
                (id, app_id, company_id, runtemplate_id, status, env,
                 launcher, event_source_id, event_sequence)
            VALUES ($1, $2, $3, $4, 'pending', $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::from(JobId::new()))
        .bind(Uuid::from(job.app_id))
        .bind(Uuid::from(job.company_id))
        .bind(Uuid::from(job.runtemplate_id))
        .bind(env)
        .bind(launcher)
        .bind(origin.map(|(source_id, _)| Uuid::from(source_id)))
        .bind(origin.map(|(_, sequence)| sequence))
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn begin(&self, id: JobId) -> DbResult<Job> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE jobs
            SET status = 'running', begin_at = NOW()
            WHERE id = $1 AND end_at IS NULL
            RETURNING *
            "#,
        )
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("startable job {id}")))?;
        row.try_into()
    }

    async fn complete(&self, id: JobId, exitcode: i32) -> DbResult<CompletedJob> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE jobs
            SET status = 'completed', end_at = NOW(), exitcode = $2
            WHERE id = $1 AND end_at IS NULL
            RETURNING *
            "#,
        )
        .bind(Uuid::from(id))
        .bind(exitcode)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM jobs WHERE id = $1)")
                    .bind(Uuid::from(id))
                    .fetch_one(&mut *tx)
                    .await?;
            return Err(if exists {
                DbError::Duplicate(format!("job {id} already completed"))
            } else {
                DbError::NotFound(format!("job {id}"))
            });
        };

        let policy = sqlx::query_as::<_, ExitPolicyRow>(
            "SELECT severity, retry FROM app_exit_codes WHERE app_id = $1 AND exit_code = $2",
        )
        .bind(row.app_id)
        .bind(exitcode)
        .fetch_optional(&mut *tx)
        .await?;
        let policy = policy
            .map(|p| -> DbResult<ExitCodePolicy> {
                let severity = ExitSeverity::parse(&p.severity)
                    .ok_or_else(|| DbError::Decode(format!("unknown severity {:?}", p.severity)))?;
                Ok(ExitCodePolicy {
                    app_id: AppId::from_uuid(row.app_id),
                    exit_code: exitcode,
                    severity,
                    retry: p.retry,
                    description: String::new(),
                })
            })
            .transpose()?;
        let outcome = classify(exitcode, policy.as_ref());

        let counter = if outcome.success {
            "successful_jobs_count"
        } else {
            "failed_jobs_count"
        };
        sqlx::query(&format!(
            "UPDATE run_templates SET {counter} = {counter} + 1, updated_at = NOW() WHERE id = $1"
        ))
        .bind(row.runtemplate_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(CompletedJob {
            job: row.try_into()?,
            outcome,
        })
    }

    async fn get(&self, id: JobId) -> DbResult<Job> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = $1")
            .bind(Uuid::from(id))
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("job {id}")))?;
        row.try_into()
    }

    async fn list_recent(&self, limit: i64) -> DbResult<Vec<Job>> {
        let rows =
            sqlx::query_as::<_, JobRow>("SELECT * FROM jobs ORDER BY created_at DESC LIMIT $1")
                .bind(limit)
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn event_job_exists(
        &self,
        source_id: conveyor_core::SourceId,
        sequence: i64,
    ) -> DbResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM jobs WHERE event_source_id = $1 AND event_sequence = $2)",
        )
        .bind(Uuid::from(source_id))
        .bind(sequence)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }
}
