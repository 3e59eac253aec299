//! Event source registry: feed configuration, cursors and poll leases.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conveyor_core::job::NewJob;
use conveyor_core::source::{ConnectionSpec, DbDriver, EventSource};
use conveyor_core::{JobId, SourceId};
use sqlx::{Connection, PgConnection, PgPool};
use uuid::Uuid;

use crate::{DbError, DbResult};

#[derive(Debug, sqlx::FromRow)]
struct EventSourceRow {
    id: Uuid,
    name: String,
    adapter_type: String,
    db_driver: String,
    db_host: String,
    db_port: i32,
    db_database: String,
    db_username: Option<String>,
    db_password: Option<String>,
    enabled: bool,
    last_processed_id: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<EventSourceRow> for EventSource {
    type Error = DbError;

    fn try_from(row: EventSourceRow) -> DbResult<Self> {
        let driver = DbDriver::parse(&row.db_driver)
            .ok_or_else(|| DbError::Decode(format!("unknown db driver {:?}", row.db_driver)))?;
        Ok(EventSource {
            id: SourceId::from_uuid(row.id),
            name: row.name,
            adapter_type: row.adapter_type,
            connection: ConnectionSpec {
                driver,
                host: row.db_host,
                port: row.db_port as u16,
                database: row.db_database,
                username: row.db_username,
                password: row.db_password,
            },
            enabled: row.enabled,
            last_processed_id: row.last_processed_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Parameters for registering a source.
#[derive(Debug, Clone)]
pub struct NewEventSource {
    pub name: String,
    pub adapter_type: String,
    pub connection: ConnectionSpec,
    pub enabled: bool,
}

/// Outcome of one dispatch commit.
#[derive(Debug, Clone, Copy)]
pub struct DispatchCommit {
    /// Jobs actually inserted.
    pub created: usize,
    /// Jobs skipped because their (source, sequence) was already dispatched.
    pub duplicates: usize,
    /// False when another worker had already advanced past the new cursor.
    pub cursor_advanced: bool,
}

/// Exclusive right to poll one source. Dropping a lease without releasing
/// it still frees the underlying lock.
#[async_trait]
pub trait PollGuard: Send {
    async fn release(self: Box<Self>);
}

/// Postgres poll lease: a session-level advisory lock on a dedicated
/// connection, so mutual exclusion holds across processes. Dropping the
/// lease closes the connection, which releases the lock server-side.
pub struct PollLease {
    conn: PgConnection,
    key: i64,
}

#[async_trait]
impl PollGuard for PollLease {
    async fn release(mut self: Box<Self>) {
        let _ = sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(self.key)
            .execute(&mut self.conn)
            .await;
        let _ = self.conn.close().await;
    }
}

#[async_trait]
pub trait EventSourceRepo: Send + Sync {
    async fn create(&self, source: NewEventSource) -> DbResult<EventSource>;
    async fn get(&self, id: SourceId) -> DbResult<EventSource>;
    async fn get_by_name(&self, name: &str) -> DbResult<EventSource>;
    async fn list(&self) -> DbResult<Vec<EventSource>>;
    async fn list_enabled(&self) -> DbResult<Vec<EventSource>>;

    /// Try to take the per-source poll lease. `None` means another worker
    /// holds it; skip this source, don't wait.
    async fn acquire_poll_lease(&self, id: SourceId) -> DbResult<Option<Box<dyn PollGuard>>>;

    /// Commit one batch: insert the dispatched jobs and advance the cursor,
    /// atomically. The insert is idempotent on (source, sequence), and the
    /// cursor update is guarded so it can only move forward; a failure
    /// anywhere rolls the whole batch back with the cursor unmoved.
    async fn commit_dispatch(
        &self,
        id: SourceId,
        new_cursor: i64,
        jobs: &[NewJob],
    ) -> DbResult<DispatchCommit>;
}

/// PostgreSQL implementation of EventSourceRepo.
pub struct PgEventSourceRepo {
    pool: PgPool,
}

impl PgEventSourceRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventSourceRepo for PgEventSourceRepo {
    async fn create(&self, source: NewEventSource) -> DbResult<EventSource> {
        let row = sqlx::query_as::<_, EventSourceRow>(
            r#"
            INSERT INTO event_sources
                (id, name, adapter_type, db_driver, db_host, db_port,
                 db_database, db_username, db_password, enabled)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(Uuid::from(SourceId::new()))
        .bind(&source.name)
        .bind(&source.adapter_type)
        .bind(source.connection.driver.as_str())
        .bind(&source.connection.host)
        .bind(i32::from(source.connection.port))
        .bind(&source.connection.database)
        .bind(&source.connection.username)
        .bind(&source.connection.password)
        .bind(source.enabled)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn get(&self, id: SourceId) -> DbResult<EventSource> {
        let row = sqlx::query_as::<_, EventSourceRow>("SELECT * FROM event_sources WHERE id = $1")
            .bind(Uuid::from(id))
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("event source {id}")))?;
        row.try_into()
    }

    async fn get_by_name(&self, name: &str) -> DbResult<EventSource> {
        let row =
            sqlx::query_as::<_, EventSourceRow>("SELECT * FROM event_sources WHERE name = $1")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| DbError::NotFound(format!("event source {name:?}")))?;
        row.try_into()
    }

    async fn list(&self) -> DbResult<Vec<EventSource>> {
        let rows =
            sqlx::query_as::<_, EventSourceRow>("SELECT * FROM event_sources ORDER BY name")
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_enabled(&self) -> DbResult<Vec<EventSource>> {
        let rows = sqlx::query_as::<_, EventSourceRow>(
            "SELECT * FROM event_sources WHERE enabled ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn acquire_poll_lease(&self, id: SourceId) -> DbResult<Option<Box<dyn PollGuard>>> {
        let mut conn = self.pool.acquire().await?.detach();
        let key = id.lock_key();
        let locked: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock($1)")
            .bind(key)
            .fetch_one(&mut conn)
            .await?;
        if locked {
            Ok(Some(Box::new(PollLease { conn, key })))
        } else {
            let _ = conn.close().await;
            Ok(None)
        }
    }

    async fn commit_dispatch(
        &self,
        id: SourceId,
        new_cursor: i64,
        jobs: &[NewJob],
    ) -> DbResult<DispatchCommit> {
        let mut tx = self.pool.begin().await?;
        let mut created = 0;
        let mut duplicates = 0;

        for job in jobs {
            let (source_id, sequence) = job.launcher.event_origin().ok_or_else(|| {
                DbError::Decode("dispatch commit requires event-launched jobs".to_string())
            })?;
            let env = serde_json::to_value(&job.env)
                .map_err(|e| DbError::Decode(e.to_string()))?;
            let launcher = serde_json::to_value(&job.launcher)
                .map_err(|e| DbError::Decode(e.to_string()))?;

            let result = sqlx::query(
                r#"
                INSERT INTO jobs
                    (id, app_id, company_id, runtemplate_id, status, env,
                     launcher, event_source_id, event_sequence)
                VALUES ($1, $2, $3, $4, 'pending', $5, $6, $7, $8)
                ON CONFLICT (event_source_id, event_sequence)
                    WHERE event_source_id IS NOT NULL
                    DO NOTHING
                "#,
            )
            .bind(Uuid::from(JobId::new()))
            .bind(Uuid::from(job.app_id))
            .bind(Uuid::from(job.company_id))
            .bind(Uuid::from(job.runtemplate_id))
            .bind(env)
            .bind(launcher)
            .bind(Uuid::from(source_id))
            .bind(sequence)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 1 {
                created += 1;
            } else {
                duplicates += 1;
            }
        }

        let moved = sqlx::query(
            r#"
            UPDATE event_sources
            SET last_processed_id = $2, updated_at = NOW()
            WHERE id = $1 AND last_processed_id < $2
            "#,
        )
        .bind(Uuid::from(id))
        .bind(new_cursor)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(DispatchCommit {
            created,
            duplicates,
            cursor_advanced: moved.rows_affected() == 1,
        })
    }
}
