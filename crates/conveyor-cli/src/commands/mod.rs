//! CLI command implementations.

pub mod list;
pub mod poll;
pub mod serve;
pub mod sweep;

use anyhow::Result;
use conveyor_db::PgPool;

pub(crate) async fn connect(database_url: &str) -> Result<PgPool> {
    Ok(conveyor_db::create_pool(database_url).await?)
}

pub async fn migrate(database_url: &str) -> Result<()> {
    let pool = connect(database_url).await?;
    conveyor_db::run_migrations(&pool).await?;
    println!("Migrations applied");
    Ok(())
}
