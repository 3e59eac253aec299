//! Per-source poll worker.
//!
//! One poller owns one event source. Each cycle takes the source's poll
//! lease, drains the feed in batches, and commits every batch as a single
//! unit: jobs inserted + cursor advanced, or neither.

use std::sync::Arc;
use std::time::Duration;

use conveyor_core::source::EventSource;
use conveyor_db::{EventRuleRepo, EventSourceRepo};
use conveyor_feed::ChangeFeed;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::dispatcher::{DispatchPlan, Dispatcher, SkipReason};
use crate::DispatchResult;

/// Outcome counters for one poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStats {
    pub batches: u32,
    pub dispatched: usize,
    /// Records whose (source, sequence) had already been dispatched.
    pub duplicates: usize,
    /// Records consumed without a job (no rule, missing/disabled template).
    pub skipped: usize,
}

/// Worker that polls one event source and dispatches its changes.
pub struct SourcePoller {
    source: EventSource,
    feed: Arc<dyn ChangeFeed>,
    sources: Arc<dyn EventSourceRepo>,
    rules: Arc<dyn EventRuleRepo>,
    dispatcher: Dispatcher,
    batch_size: i64,
    poll_interval: Duration,
    backoff: Duration,
}

impl SourcePoller {
    pub fn new(
        source: EventSource,
        feed: Arc<dyn ChangeFeed>,
        sources: Arc<dyn EventSourceRepo>,
        rules: Arc<dyn EventRuleRepo>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            source,
            feed,
            sources,
            rules,
            dispatcher,
            batch_size: 100,
            poll_interval: Duration::from_secs(30),
            backoff: Duration::from_secs(5),
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

    /// One poll cycle. `Ok(None)` means another worker holds the source's
    /// lease and this cycle was skipped.
    pub async fn poll_once(&self) -> DispatchResult<Option<PollStats>> {
        self.cycle(None).await
    }

    async fn cycle(
        &self,
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> DispatchResult<Option<PollStats>> {
        let Some(lease) = self.sources.acquire_poll_lease(self.source.id).await? else {
            debug!(source = %self.source.name, "poll lease held elsewhere, skipping");
            return Ok(None);
        };
        let result = self.drain(shutdown).await;
        lease.release().await;
        result.map(Some)
    }

    async fn drain(&self, shutdown: Option<&watch::Receiver<bool>>) -> DispatchResult<PollStats> {
        let mut stats = PollStats::default();
        // Reload under the lease; another worker may have committed since
        // this poller's snapshot was taken.
        let mut cursor = self.sources.get(self.source.id).await?.last_processed_id;

        loop {
            let batch = self.feed.fetch_after(cursor, self.batch_size).await?;
            let Some(new_cursor) = batch.last_scanned else {
                break;
            };

            let rules = self.rules.list_enabled_for_source(self.source.id).await?;
            let mut jobs = Vec::new();
            for record in &batch.records {
                match self.dispatcher.plan(self.source.id, &rules, record).await? {
                    DispatchPlan::Job(job) => jobs.push(job),
                    DispatchPlan::Skipped(reason) => {
                        stats.skipped += 1;
                        match reason {
                            SkipReason::NoMatchingRule => {
                                debug!(
                                    source = %self.source.name,
                                    sequence = record.sequence,
                                    "change matched no rule"
                                );
                            }
                            reason => {
                                warn!(
                                    source = %self.source.name,
                                    sequence = record.sequence,
                                    %reason,
                                    "change skipped"
                                );
                            }
                        }
                    }
                }
            }

            let commit = self
                .sources
                .commit_dispatch(self.source.id, new_cursor, &jobs)
                .await?;
            cursor = new_cursor;
            stats.batches += 1;
            stats.dispatched += commit.created;
            stats.duplicates += commit.duplicates;

            if batch.scanned < self.batch_size as usize {
                break;
            }
            // Cooperative cancellation between batches; the cursor stays at
            // the last committed value.
            if shutdown.is_some_and(|rx| *rx.borrow()) {
                break;
            }
        }
        Ok(stats)
    }

    /// Run the worker loop until shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(source = %self.source.name, "starting source poller");
        loop {
            if *shutdown.borrow() {
                break;
            }
            let delay = match self.cycle(Some(&shutdown)).await {
                Ok(Some(stats)) if stats.dispatched > 0 => {
                    info!(
                        source = %self.source.name,
                        dispatched = stats.dispatched,
                        duplicates = stats.duplicates,
                        skipped = stats.skipped,
                        "poll cycle dispatched jobs"
                    );
                    self.poll_interval
                }
                Ok(_) => self.poll_interval,
                Err(e) if e.is_transient() => {
                    warn!(source = %self.source.name, error = %e, "transient poll failure");
                    self.backoff
                }
                Err(e) => {
                    error!(source = %self.source.name, error = %e, "poll cycle failed");
                    self.poll_interval
                }
            };
            tokio::select! {
                _ = sleep(delay) => {}
                _ = shutdown.changed() => {}
            }
        }
        info!(source = %self.source.name, "source poller stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use conveyor_core::change::{ChangeOp, ChangeRecord};
    use conveyor_core::job::NewJob;
    use conveyor_core::rule::{EventRule, OperationFilter};
    use conveyor_core::source::{ConnectionSpec, DbDriver};
    use conveyor_core::template::{Interval, RunTemplate};
    use conveyor_core::{AppId, CompanyId, RuleId, SourceId, TemplateId};
    use conveyor_db::{
        DbResult, DispatchCommit, NewEventSource, NewRunTemplate, PollGuard, RunTemplateRepo,
    };
    use serde_json::json;
    use std::collections::{BTreeMap, HashMap};
    use std::sync::Mutex;
    use uuid::Uuid;

    struct FakeState {
        cursor: i64,
        jobs: BTreeMap<(Uuid, i64), NewJob>,
        lease_held: bool,
    }

    struct FakeSourceRepo {
        source: EventSource,
        state: Arc<Mutex<FakeState>>,
    }

    struct FakeGuard {
        state: Arc<Mutex<FakeState>>,
    }

    #[async_trait]
    impl PollGuard for FakeGuard {
        async fn release(self: Box<Self>) {
            self.state.lock().unwrap().lease_held = false;
        }
    }

    #[async_trait]
    impl EventSourceRepo for FakeSourceRepo {
        async fn create(&self, _source: NewEventSource) -> DbResult<EventSource> {
            unimplemented!()
        }

        async fn get(&self, _id: SourceId) -> DbResult<EventSource> {
            let mut source = self.source.clone();
            source.last_processed_id = self.state.lock().unwrap().cursor;
            Ok(source)
        }

        async fn get_by_name(&self, _name: &str) -> DbResult<EventSource> {
            unimplemented!()
        }

        async fn list(&self) -> DbResult<Vec<EventSource>> {
            unimplemented!()
        }

        async fn list_enabled(&self) -> DbResult<Vec<EventSource>> {
            Ok(vec![self.source.clone()])
        }

        async fn acquire_poll_lease(&self, _id: SourceId) -> DbResult<Option<Box<dyn PollGuard>>> {
            let mut state = self.state.lock().unwrap();
            if state.lease_held {
                return Ok(None);
            }
            state.lease_held = true;
            Ok(Some(Box::new(FakeGuard {
                state: self.state.clone(),
            })))
        }

        async fn commit_dispatch(
            &self,
            id: SourceId,
            new_cursor: i64,
            jobs: &[NewJob],
        ) -> DbResult<DispatchCommit> {
            let mut state = self.state.lock().unwrap();
            let mut created = 0;
            let mut duplicates = 0;
            for job in jobs {
                let (source_id, sequence) = job.launcher.event_origin().unwrap();
                assert_eq!(source_id, id);
                let key = (Uuid::from(source_id), sequence);
                if state.jobs.contains_key(&key) {
                    duplicates += 1;
                } else {
                    state.jobs.insert(key, job.clone());
                    created += 1;
                }
            }
            let cursor_advanced = state.cursor < new_cursor;
            if cursor_advanced {
                state.cursor = new_cursor;
            }
            Ok(DispatchCommit {
                created,
                duplicates,
                cursor_advanced,
            })
        }
    }

    struct FakeRuleRepo {
        rules: Vec<EventRule>,
    }

    #[async_trait]
    impl EventRuleRepo for FakeRuleRepo {
        async fn create(&self, _rule: conveyor_db::NewEventRule) -> DbResult<EventRule> {
            unimplemented!()
        }

        async fn list_for_source(&self, _source_id: SourceId) -> DbResult<Vec<EventRule>> {
            Ok(self.rules.clone())
        }

        async fn list_enabled_for_source(&self, _source_id: SourceId) -> DbResult<Vec<EventRule>> {
            Ok(self.rules.iter().filter(|r| r.enabled).cloned().collect())
        }
    }

    struct FakeTemplateRepo {
        templates: HashMap<TemplateId, RunTemplate>,
    }

    #[async_trait]
    impl RunTemplateRepo for FakeTemplateRepo {
        async fn create(&self, _template: NewRunTemplate) -> DbResult<RunTemplate> {
            unimplemented!()
        }

        async fn get(&self, _id: TemplateId) -> DbResult<RunTemplate> {
            unimplemented!()
        }

        async fn find(&self, id: TemplateId) -> DbResult<Option<RunTemplate>> {
            Ok(self.templates.get(&id).cloned())
        }

        async fn list(&self) -> DbResult<Vec<RunTemplate>> {
            unimplemented!()
        }

        async fn delete(&self, _id: TemplateId) -> DbResult<()> {
            unimplemented!()
        }
    }

    fn source() -> EventSource {
        EventSource {
            id: SourceId::new(),
            name: "erp-main".into(),
            adapter_type: "erp-changes".into(),
            connection: ConnectionSpec {
                driver: DbDriver::Sqlite,
                host: String::new(),
                port: 0,
                database: ":memory:".into(),
                username: None,
                password: None,
            },
            enabled: true,
            last_processed_id: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn template(enabled: bool) -> RunTemplate {
        RunTemplate {
            id: TemplateId::new(),
            name: "import-invoices".into(),
            app_id: AppId::new(),
            company_id: CompanyId::new(),
            interval: Interval::None,
            executor: "Native".into(),
            enabled,
            successful_jobs_count: 0,
            failed_jobs_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn rule(source_id: SourceId, template: TemplateId, priority: i32) -> EventRule {
        EventRule {
            id: RuleId::new(),
            source_id,
            evidence: None,
            operation: OperationFilter::Any,
            runtemplate_id: template,
            env_mapping: BTreeMap::from([("INVOICE_CODE".into(), "code".into())]),
            enabled: true,
            priority,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn record(sequence: i64) -> ChangeRecord {
        ChangeRecord {
            sequence,
            evidence: "invoice".into(),
            operation: ChangeOp::Create,
            fields: json!({"code": format!("INV-{sequence}")}),
            occurred_at: Utc::now(),
        }
    }


    struct Harness {
        poller: SourcePoller,
        state: Arc<Mutex<FakeState>>,
        feed: Arc<conveyor_feed::MemoryFeed>,
    }

    fn harness(
        records: Vec<ChangeRecord>,
        tpl: RunTemplate,
        rules_for: impl Fn(SourceId) -> Vec<EventRule>,
    ) -> Harness {
        let source = source();
        let state = Arc::new(Mutex::new(FakeState {
            cursor: 0,
            jobs: BTreeMap::new(),
            lease_held: false,
        }));
        let sources = Arc::new(FakeSourceRepo {
            source: source.clone(),
            state: state.clone(),
        });
        let feed = Arc::new(conveyor_feed::MemoryFeed::new(records));
        let rules = Arc::new(FakeRuleRepo {
            rules: rules_for(source.id),
        });
        let templates = Arc::new(FakeTemplateRepo {
            templates: HashMap::from([(tpl.id, tpl)]),
        });
        let poller = SourcePoller::new(
            source,
            feed.clone(),
            sources,
            rules,
            Dispatcher::new(templates),
        )
        .with_batch_size(2);
        Harness {
            poller,
            state,
            feed,
        }
    }

    #[tokio::test]
    async fn dispatches_each_change_exactly_once() {
        let tpl = template(true);
        let tpl_id = tpl.id;
        let h = harness(vec![record(1), record(2), record(3)], tpl, |source_id| {
            vec![rule(source_id, tpl_id, 5)]
        });

        let stats = h.poller.poll_once().await.unwrap().unwrap();
        assert_eq!(stats.dispatched, 3);
        assert_eq!(stats.duplicates, 0);
        {
            let state = h.state.lock().unwrap();
            assert_eq!(state.cursor, 3);
            assert_eq!(state.jobs.len(), 3);
        }

        // Nothing new: the committed cursor guards the next poll.
        let stats = h.poller.poll_once().await.unwrap().unwrap();
        assert_eq!(stats.dispatched, 0);
        assert_eq!(stats.batches, 0);
    }

    #[tokio::test]
    async fn replayed_batch_never_duplicates_jobs() {
        let tpl = template(true);
        let tpl_id = tpl.id;
        let h = harness(vec![record(1), record(2)], tpl, |source_id| {
            vec![rule(source_id, tpl_id, 5)]
        });

        h.poller.poll_once().await.unwrap().unwrap();
        assert_eq!(h.state.lock().unwrap().jobs.len(), 2);

        // Simulate at-least-once redelivery: force the cursor back.
        h.state.lock().unwrap().cursor = 0;
        let stats = h.poller.poll_once().await.unwrap().unwrap();
        assert_eq!(stats.dispatched, 0);
        assert_eq!(stats.duplicates, 2);
        assert_eq!(h.state.lock().unwrap().jobs.len(), 2);
    }

    #[tokio::test]
    async fn unmatched_changes_are_consumed_without_jobs() {
        let tpl = template(true);
        let tpl_id = tpl.id;
        let h = harness(vec![record(1)], tpl, |source_id| {
            let mut r = rule(source_id, tpl_id, 5);
            r.evidence = Some("order".into());
            vec![r]
        });

        let stats = h.poller.poll_once().await.unwrap().unwrap();
        assert_eq!(stats.dispatched, 0);
        assert_eq!(stats.skipped, 1);
        // The record is consumed; the cursor moved past it.
        assert_eq!(h.state.lock().unwrap().cursor, 1);
    }

    #[tokio::test]
    async fn disabled_template_is_skip_with_reason() {
        let tpl = template(false);
        let tpl_id = tpl.id;
        let h = harness(vec![record(1)], tpl, |source_id| {
            vec![rule(source_id, tpl_id, 5)]
        });

        let stats = h.poller.poll_once().await.unwrap().unwrap();
        assert_eq!(stats.dispatched, 0);
        assert_eq!(stats.skipped, 1);
        assert_eq!(h.state.lock().unwrap().cursor, 1);
    }

    #[tokio::test]
    async fn held_lease_skips_the_cycle() {
        let tpl = template(true);
        let tpl_id = tpl.id;
        let h = harness(vec![record(1)], tpl, |source_id| {
            vec![rule(source_id, tpl_id, 5)]
        });
        h.state.lock().unwrap().lease_held = true;

        assert!(h.poller.poll_once().await.unwrap().is_none());
        // Nothing consumed while the other worker holds the source.
        assert_eq!(h.state.lock().unwrap().cursor, 0);
    }

    #[tokio::test]
    async fn transient_failure_leaves_cursor_unmoved() {
        let tpl = template(true);
        let tpl_id = tpl.id;
        let h = harness(vec![record(1)], tpl, |source_id| {
            vec![rule(source_id, tpl_id, 5)]
        });

        h.feed.fail_next();
        let err = h.poller.poll_once().await.unwrap_err();
        assert!(err.is_transient());
        {
            let state = h.state.lock().unwrap();
            assert_eq!(state.cursor, 0);
            // The lease was released despite the error.
            assert!(!state.lease_held);
        }

        let stats = h.poller.poll_once().await.unwrap().unwrap();
        assert_eq!(stats.dispatched, 1);
    }

    #[tokio::test]
    async fn env_is_materialized_from_the_change_fields() {
        let tpl = template(true);
        let tpl_id = tpl.id;
        let h = harness(vec![record(7)], tpl, |source_id| {
            vec![rule(source_id, tpl_id, 5)]
        });

        h.poller.poll_once().await.unwrap().unwrap();
        let state = h.state.lock().unwrap();
        let job = state.jobs.values().next().unwrap();
        assert_eq!(job.env["INVOICE_CODE"], "INV-7");
        assert_eq!(job.runtemplate_id, tpl_id);
    }
}
