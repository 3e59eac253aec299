//! Database layer for Conveyor.
//!
//! Provides repository traits and PostgreSQL implementations for the tables
//! this subsystem owns, plus the transactional units the dispatch and
//! retention pipelines depend on.

pub mod error;
pub mod repo;

pub use error::{DbError, DbResult};
pub use repo::*;
pub use sqlx::PgPool;

use sqlx::postgres::PgPoolOptions;

/// Create a new database connection pool.
pub async fn create_pool(database_url: &str) -> DbResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Run database migrations.
pub async fn run_migrations(pool: &PgPool) -> DbResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
