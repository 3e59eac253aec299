//! Per-app exit code table.

use async_trait::async_trait;
use conveyor_core::AppId;
use conveyor_core::exitcode::{ExitCodePolicy, ExitSeverity};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{DbError, DbResult};

#[derive(Debug, sqlx::FromRow)]
struct ExitCodeRow {
    app_id: Uuid,
    exit_code: i32,
    severity: String,
    retry: bool,
    description: String,
}

impl TryFrom<ExitCodeRow> for ExitCodePolicy {
    type Error = DbError;

    fn try_from(row: ExitCodeRow) -> DbResult<Self> {
        let severity = ExitSeverity::parse(&row.severity)
            .ok_or_else(|| DbError::Decode(format!("unknown severity {:?}", row.severity)))?;
        Ok(ExitCodePolicy {
            app_id: AppId::from_uuid(row.app_id),
            exit_code: row.exit_code,
            severity,
            retry: row.retry,
            description: row.description,
        })
    }
}

#[async_trait]
pub trait ExitCodeRepo: Send + Sync {
    async fn upsert(&self, policy: ExitCodePolicy) -> DbResult<()>;
    async fn find(&self, app_id: AppId, exit_code: i32) -> DbResult<Option<ExitCodePolicy>>;
    async fn list_for_app(&self, app_id: AppId) -> DbResult<Vec<ExitCodePolicy>>;
}

/// PostgreSQL implementation of ExitCodeRepo.
pub struct PgExitCodeRepo {
    pool: PgPool,
}

impl PgExitCodeRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExitCodeRepo for PgExitCodeRepo {
    async fn upsert(&self, policy: ExitCodePolicy) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO app_exit_codes (app_id, exit_code, severity, retry, description)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (app_id, exit_code)
                DO UPDATE SET severity = $3, retry = $4, description = $5
            "#,
        )
        .bind(Uuid::from(policy.app_id))
        .bind(policy.exit_code)
        .bind(policy.severity.as_str())
        .bind(policy.retry)
        .bind(&policy.description)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find(&self, app_id: AppId, exit_code: i32) -> DbResult<Option<ExitCodePolicy>> {
        let row = sqlx::query_as::<_, ExitCodeRow>(
            "SELECT * FROM app_exit_codes WHERE app_id = $1 AND exit_code = $2",
        )
        .bind(Uuid::from(app_id))
        .bind(exit_code)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list_for_app(&self, app_id: AppId) -> DbResult<Vec<ExitCodePolicy>> {
        let rows = sqlx::query_as::<_, ExitCodeRow>(
            "SELECT * FROM app_exit_codes WHERE app_id = $1 ORDER BY exit_code",
        )
        .bind(Uuid::from(app_id))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}
