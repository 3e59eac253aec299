//! Run template repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conveyor_core::template::{Interval, RunTemplate};
use conveyor_core::{AppId, CompanyId, TemplateId};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{DbError, DbResult};

#[derive(Debug, sqlx::FromRow)]
struct RunTemplateRow {
    id: Uuid,
    name: String,
    app_id: Uuid,
    company_id: Uuid,
    interv: String,
    executor: String,
    enabled: bool,
    successful_jobs_count: i64,
    failed_jobs_count: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RunTemplateRow> for RunTemplate {
    type Error = DbError;

    fn try_from(row: RunTemplateRow) -> DbResult<Self> {
        let code = row.interv.chars().next().unwrap_or('n');
        let interval = Interval::from_code(code)
            .ok_or_else(|| DbError::Decode(format!("unknown interval code {code:?}")))?;
        Ok(RunTemplate {
            id: TemplateId::from_uuid(row.id),
            name: row.name,
            app_id: AppId::from_uuid(row.app_id),
            company_id: CompanyId::from_uuid(row.company_id),
            interval,
            executor: row.executor,
            enabled: row.enabled,
            successful_jobs_count: row.successful_jobs_count,
            failed_jobs_count: row.failed_jobs_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Parameters for configuring a template.
#[derive(Debug, Clone)]
pub struct NewRunTemplate {
    pub name: String,
    pub app_id: AppId,
    pub company_id: CompanyId,
    pub interval: Interval,
    pub executor: String,
    pub enabled: bool,
}

#[async_trait]
pub trait RunTemplateRepo: Send + Sync {
    async fn create(&self, template: NewRunTemplate) -> DbResult<RunTemplate>;
    async fn get(&self, id: TemplateId) -> DbResult<RunTemplate>;
    async fn find(&self, id: TemplateId) -> DbResult<Option<RunTemplate>>;
    async fn list(&self) -> DbResult<Vec<RunTemplate>>;

    /// Deleting a template with live jobs is an integrity violation; the
    /// foreign key restriction surfaces as `DbError::IntegrityViolation`.
    async fn delete(&self, id: TemplateId) -> DbResult<()>;
}

/// PostgreSQL implementation of RunTemplateRepo.
pub struct PgRunTemplateRepo {
    pool: PgPool,
}

impl PgRunTemplateRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RunTemplateRepo for PgRunTemplateRepo {
    async fn create(&self, template: NewRunTemplate) -> DbResult<RunTemplate> {
        let row = sqlx::query_as::<_, RunTemplateRow>(
            r#"
            INSERT INTO run_templates
                (id, name, app_id, company_id, interv, executor, enabled)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::from(TemplateId::new()))
        .bind(&template.name)
        .bind(Uuid::from(template.app_id))
        .bind(Uuid::from(template.company_id))
        .bind(template.interval.code().to_string())
        .bind(&template.executor)
        .bind(template.enabled)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn get(&self, id: TemplateId) -> DbResult<RunTemplate> {
        self.find(id)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("run template {id}")))
    }

    async fn find(&self, id: TemplateId) -> DbResult<Option<RunTemplate>> {
        let row =
            sqlx::query_as::<_, RunTemplateRow>("SELECT * FROM run_templates WHERE id = $1")
                .bind(Uuid::from(id))
                .fetch_optional(&self.pool)
                .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list(&self) -> DbResult<Vec<RunTemplate>> {
        let rows =
            sqlx::query_as::<_, RunTemplateRow>("SELECT * FROM run_templates ORDER BY name")
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn delete(&self, id: TemplateId) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM run_templates WHERE id = $1")
            .bind(Uuid::from(id))
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("run template {id}")));
        }
        Ok(())
    }
}
