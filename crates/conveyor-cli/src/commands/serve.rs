//! The daemon: source pollers, retention scheduler and the API server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use conveyor_api::{AppState, routes};
use conveyor_db::{
    PgCleanupJobRepo, PgEventRuleRepo, PgEventSourceRepo, PgRetentionPolicyRepo, PgRetentionStore,
    PgRunTemplateRepo,
};
use conveyor_dispatch::PollerPool;
use conveyor_retention::CleanupRunner;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::connect;

pub async fn run(
    database_url: &str,
    listen: SocketAddr,
    poll_interval: u64,
    sweep_interval: u64,
) -> Result<()> {
    let pool = connect(database_url).await?;
    conveyor_db::run_migrations(&pool).await?;

    let sources = Arc::new(PgEventSourceRepo::new(pool.clone()));
    let rules = Arc::new(PgEventRuleRepo::new(pool.clone()));
    let templates = Arc::new(PgRunTemplateRepo::new(pool.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let poller_pool = PollerPool::new(sources, rules, templates)
        .with_poll_interval(Duration::from_secs(poll_interval));
    let mut workers = poller_pool.spawn(shutdown_rx.clone()).await?;

    let runner = CleanupRunner::new(
        Arc::new(PgRetentionStore::new(pool.clone())),
        Arc::new(PgRetentionPolicyRepo::new(pool.clone())),
        Arc::new(PgCleanupJobRepo::new(pool.clone())),
    )
    .with_sweep_interval(Duration::from_secs(sweep_interval));
    let retention_shutdown = shutdown_rx.clone();
    let retention = tokio::spawn(async move { runner.run(retention_shutdown).await });

    let app = routes::router(AppState::new(pool)).layer(TraceLayer::new_for_http());
    let listener = TcpListener::bind(listen).await?;
    info!(%listen, "API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    info!("shutting down workers");
    let _ = shutdown_tx.send(true);
    while workers.join_next().await.is_some() {}
    let _ = retention.await;

    Ok(())
}
