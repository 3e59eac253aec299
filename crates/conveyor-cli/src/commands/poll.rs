//! One-shot feed polls.

use std::sync::Arc;

use anyhow::Result;
use conveyor_db::{EventSourceRepo, PgEventRuleRepo, PgEventSourceRepo, PgRunTemplateRepo};
use conveyor_dispatch::PollerPool;

use super::connect;

pub async fn run(database_url: &str, source: Option<String>) -> Result<()> {
    let pool = connect(database_url).await?;
    let sources = Arc::new(PgEventSourceRepo::new(pool.clone()));
    let rules = Arc::new(PgEventRuleRepo::new(pool.clone()));
    let templates = Arc::new(PgRunTemplateRepo::new(pool.clone()));
    let poller_pool = PollerPool::new(sources.clone(), rules, templates);

    let names: Vec<String> = match source {
        Some(name) => vec![name],
        None => sources
            .list_enabled()
            .await?
            .into_iter()
            .map(|s| s.name)
            .collect(),
    };

    for name in names {
        match poller_pool.poll_source(&name).await {
            Ok(Some(stats)) => println!(
                "{name}: {} dispatched, {} duplicates, {} skipped in {} batches",
                stats.dispatched, stats.duplicates, stats.skipped, stats.batches
            ),
            Ok(None) => println!("{name}: poll lease held by another worker"),
            Err(e) => println!("{name}: poll failed: {e}"),
        }
    }
    Ok(())
}
