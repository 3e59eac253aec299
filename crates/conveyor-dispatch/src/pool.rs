//! Worker pool: one poller task per enabled source.

use std::sync::Arc;
use std::time::Duration;

use conveyor_db::{EventRuleRepo, EventSourceRepo, RunTemplateRepo};
use conveyor_feed::{ChangeFeed, SqlChangeFeed};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::error;

use crate::dispatcher::Dispatcher;
use crate::poller::{PollStats, SourcePoller};
use crate::DispatchResult;

/// Spawns and configures per-source poll workers.
///
/// Sources share nothing but the relational store; a misconfigured adapter
/// keeps only its own source out of the pool.
pub struct PollerPool {
    sources: Arc<dyn EventSourceRepo>,
    rules: Arc<dyn EventRuleRepo>,
    templates: Arc<dyn RunTemplateRepo>,
    batch_size: i64,
    poll_interval: Duration,
}

impl PollerPool {
    pub fn new(
        sources: Arc<dyn EventSourceRepo>,
        rules: Arc<dyn EventRuleRepo>,
        templates: Arc<dyn RunTemplateRepo>,
    ) -> Self {
        Self {
            sources,
            rules,
            templates,
            batch_size: 100,
            poll_interval: Duration::from_secs(30),
        }
    }

    pub fn with_batch_size(mut self, batch_size: i64) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Spawn one worker per enabled source. Workers run until the shutdown
    /// signal flips.
    pub async fn spawn(&self, shutdown: watch::Receiver<bool>) -> DispatchResult<JoinSet<()>> {
        let mut workers = JoinSet::new();
        for source in self.sources.list_enabled().await? {
            let feed: Arc<dyn ChangeFeed> = match SqlChangeFeed::connect(&source.connection).await
            {
                Ok(feed) => Arc::new(feed),
                Err(e) => {
                    error!(source = %source.name, error = %e, "adapter misconfigured, source skipped");
                    continue;
                }
            };
            let poller = SourcePoller::new(
                source,
                feed,
                self.sources.clone(),
                self.rules.clone(),
                Dispatcher::new(self.templates.clone()),
            )
            .with_batch_size(self.batch_size)
            .with_poll_interval(self.poll_interval);

            let shutdown = shutdown.clone();
            workers.spawn(async move { poller.run(shutdown).await });
        }
        Ok(workers)
    }

    /// One-shot poll of a single source by name.
    pub async fn poll_source(&self, name: &str) -> DispatchResult<Option<PollStats>> {
        let source = self.sources.get_by_name(name).await?;
        let feed = Arc::new(SqlChangeFeed::connect(&source.connection).await?);
        let poller = SourcePoller::new(
            source,
            feed,
            self.sources.clone(),
            self.rules.clone(),
            Dispatcher::new(self.templates.clone()),
        )
        .with_batch_size(self.batch_size);
        poller.poll_once().await
    }
}
