//! Cleanup job runner: one sweep per policy invocation.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use conveyor_core::retention::{
    CleanupCounts, CleanupJobType, CleanupStatus, DeletionAction, RecordError, RetentionPolicy,
    TargetSpec,
};
use conveyor_core::{CleanupJobId, UserId};
use conveyor_db::{
    CleanupJobRepo, DbError, DbResult, EligibleRecord, RetentionPolicyRepo, RetentionStore,
};
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::targets;
use crate::{RetentionError, RetentionResult};

/// Result of one sweep, mirrored into the cleanup job row.
#[derive(Debug, Clone, Copy)]
pub struct SweepReport {
    pub job_id: CleanupJobId,
    pub status: CleanupStatus,
    pub counts: CleanupCounts,
    pub error_count: usize,
}

enum SweepEnd {
    Drained,
    Cancelled,
}

/// Executes retention sweeps and keeps their ledger rows current.
pub struct CleanupRunner {
    store: Arc<dyn RetentionStore>,
    policies: Arc<dyn RetentionPolicyRepo>,
    jobs: Arc<dyn CleanupJobRepo>,
    batch_size: i64,
    sweep_interval: Duration,
}

impl CleanupRunner {
    pub fn new(
        store: Arc<dyn RetentionStore>,
        policies: Arc<dyn RetentionPolicyRepo>,
        jobs: Arc<dyn CleanupJobRepo>,
    ) -> Self {
        Self {
            store,
            policies,
            jobs,
            batch_size: 100,
            sweep_interval: Duration::from_secs(3600),
        }
    }

    pub fn with_batch_size(mut self, batch_size: i64) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Run one sweep for a policy.
    ///
    /// The sweep finishes `completed` once it has scanned all eligible
    /// records, even with per-record errors; `failed` only when it could not
    /// run at all (unknown table, unsupported action, scan failure); and
    /// `cancelled` when the cooperative cancel flag was observed between
    /// batches, with already-applied actions left intact.
    pub async fn sweep(
        &self,
        policy: &RetentionPolicy,
        job_type: CleanupJobType,
        started_by: Option<UserId>,
    ) -> RetentionResult<SweepReport> {
        let job = self.jobs.create(policy.id, job_type, started_by).await?;
        self.jobs.mark_running(job.id).await?;

        let mut counts = CleanupCounts::default();
        let mut errors = Vec::new();
        let outcome = self
            .process(policy, job.id, &mut counts, &mut errors)
            .await;

        let (status, summary) = match outcome {
            Ok(SweepEnd::Drained) => (CleanupStatus::Completed, summarize(policy, counts, &errors)),
            Ok(SweepEnd::Cancelled) => (
                CleanupStatus::Cancelled,
                format!("cancelled; {}", summarize(policy, counts, &errors)),
            ),
            Err(ref e) => (CleanupStatus::Failed, format!("sweep failed: {e}")),
        };
        self.jobs
            .finalize(job.id, status, counts, &errors, &summary)
            .await?;

        match status {
            CleanupStatus::Failed => {
                error!(policy = %policy.policy_name, job_id = %job.id, %summary, "retention sweep failed")
            }
            _ => {
                info!(policy = %policy.policy_name, job_id = %job.id, %summary, "retention sweep finished")
            }
        }
        Ok(SweepReport {
            job_id: job.id,
            status,
            counts,
            error_count: errors.len(),
        })
    }

    async fn process(
        &self,
        policy: &RetentionPolicy,
        job_id: CleanupJobId,
        counts: &mut CleanupCounts,
        errors: &mut Vec<RecordError>,
    ) -> RetentionResult<SweepEnd> {
        let target = targets::find(&policy.table_name)
            .ok_or_else(|| RetentionError::UnknownTable(policy.table_name.clone()))?;
        target
            .supports(policy.action)
            .map_err(RetentionError::Misconfigured)?;

        let threshold = policy.eligibility_threshold(Utc::now());
        // Records whose action failed or no-opped; excluded from rescans so
        // the sweep always drains.
        let mut skip: Vec<Uuid> = Vec::new();

        loop {
            if self.jobs.cancel_requested(job_id).await? {
                return Ok(SweepEnd::Cancelled);
            }

            let batch = self
                .store
                .scan_eligible(target, policy.action, threshold, &skip, self.batch_size)
                .await?;
            if batch.is_empty() {
                return Ok(SweepEnd::Drained);
            }

            for record in &batch {
                match self.apply(target, policy.action, record, job_id).await {
                    Ok(true) => counts.record(policy.action),
                    Ok(false) => {
                        debug!(record_id = %record.id, "record already actioned, skipping");
                        skip.push(record.id);
                    }
                    Err(e) => {
                        warn!(
                            policy = %policy.policy_name,
                            record_id = %record.id,
                            error = %e,
                            "record action failed, sweep continues"
                        );
                        errors.push(RecordError {
                            record_id: record.id,
                            message: e.to_string(),
                        });
                        skip.push(record.id);
                    }
                }
            }
            self.jobs.update_progress(job_id, *counts).await?;
        }
    }

    async fn apply(
        &self,
        target: &TargetSpec,
        action: DeletionAction,
        record: &EligibleRecord,
        job_id: CleanupJobId,
    ) -> DbResult<bool> {
        let actor = UserId::system();
        match action {
            DeletionAction::HardDelete => {
                self.store.hard_delete(target, record, job_id, actor).await
            }
            DeletionAction::SoftDelete => self.store.soft_delete(target, record.id).await,
            DeletionAction::Anonymize => self.store.anonymize(target, record, job_id, actor).await,
            DeletionAction::Archive => {
                self.store.archive_move(target, record, job_id, actor).await
            }
        }
    }

    /// Sweep every enabled policy once. A policy whose sweep cannot start
    /// (open job already, storage trouble) is logged and skipped; it never
    /// blocks the others.
    pub async fn sweep_all(&self, job_type: CleanupJobType) -> RetentionResult<Vec<SweepReport>> {
        let policies = self.policies.list_enabled().await?;
        let mut reports = Vec::with_capacity(policies.len());
        for policy in &policies {
            match self.sweep(policy, job_type, None).await {
                Ok(report) => reports.push(report),
                Err(RetentionError::Db(DbError::Duplicate(_))) => {
                    debug!(policy = %policy.policy_name, "cleanup job already open, skipping");
                }
                Err(e) => {
                    error!(policy = %policy.policy_name, error = %e, "sweep could not start");
                }
            }
        }
        Ok(reports)
    }

    /// Run scheduled sweeps until shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("starting retention scheduler");
        loop {
            if *shutdown.borrow() {
                break;
            }
            if let Err(e) = self.sweep_all(CleanupJobType::ScheduledCleanup).await {
                error!(error = %e, "scheduled retention pass failed");
            }
            tokio::select! {
                _ = sleep(self.sweep_interval) => {}
                _ = shutdown.changed() => {}
            }
        }
        info!("retention scheduler stopped");
    }
}

fn summarize(policy: &RetentionPolicy, counts: CleanupCounts, errors: &[RecordError]) -> String {
    format!(
        "{} on {}: processed {}, deleted {}, anonymized {}, archived {}, errors {}",
        policy.action.as_str(),
        policy.table_name,
        counts.processed,
        counts.deleted,
        counts.anonymized,
        counts.archived,
        errors.len(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration as ChronoDuration};
    use conveyor_core::retention::{ArchiveType, CleanupJob};
    use conveyor_core::PolicyId;
    use serde_json::json;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Clone)]
    struct MemRecord {
        id: Uuid,
        age: DateTime<Utc>,
        marked: bool,
        hold_until: Option<DateTime<Utc>>,
        deleted: bool,
        anonymized: bool,
    }

    fn days_old(days: i64) -> MemRecord {
        MemRecord {
            id: Uuid::now_v7(),
            age: Utc::now() - ChronoDuration::days(days),
            marked: false,
            hold_until: None,
            deleted: false,
            anonymized: false,
        }
    }

    #[derive(Debug, PartialEq, Eq, Clone, Copy)]
    enum Op {
        Archive(Uuid, ArchiveType),
        Delete(Uuid),
        Mark(Uuid),
        Anonymize(Uuid),
    }

    #[derive(Default)]
    struct MemStore {
        records: Mutex<Vec<MemRecord>>,
        ops: Mutex<Vec<Op>>,
        fail: HashSet<Uuid>,
    }

    impl MemStore {
        fn new(records: Vec<MemRecord>) -> Self {
            Self {
                records: Mutex::new(records),
                ops: Mutex::new(Vec::new()),
                fail: HashSet::new(),
            }
        }

        fn held(record: &MemRecord) -> bool {
            record.hold_until.is_some_and(|until| until > Utc::now())
        }

        fn check_failure(&self, id: Uuid) -> DbResult<()> {
            if self.fail.contains(&id) {
                return Err(DbError::Decode("simulated data error".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl RetentionStore for MemStore {
        async fn scan_eligible(
            &self,
            _target: &TargetSpec,
            action: DeletionAction,
            threshold: DateTime<Utc>,
            exclude: &[Uuid],
            limit: i64,
        ) -> DbResult<Vec<EligibleRecord>> {
            let records = self.records.lock().unwrap();
            let mut eligible: Vec<&MemRecord> = records
                .iter()
                .filter(|r| !r.deleted && r.age < threshold)
                .filter(|r| !exclude.contains(&r.id))
                .filter(|r| !Self::held(r))
                .filter(|r| match action {
                    DeletionAction::SoftDelete => !r.marked,
                    DeletionAction::Anonymize => !r.anonymized,
                    _ => true,
                })
                .collect();
            eligible.sort_by_key(|r| r.age);
            Ok(eligible
                .into_iter()
                .take(limit as usize)
                .map(|r| EligibleRecord {
                    id: r.id,
                    data: json!({"id": r.id}),
                })
                .collect())
        }

        async fn hard_delete(
            &self,
            target: &TargetSpec,
            record: &EligibleRecord,
            _job_id: CleanupJobId,
            _archived_by: UserId,
        ) -> DbResult<bool> {
            self.check_failure(record.id)?;
            let mut records = self.records.lock().unwrap();
            let Some(row) = records.iter_mut().find(|r| r.id == record.id && !r.deleted)
            else {
                return Ok(false);
            };
            if Self::held(row) {
                return Err(DbError::IntegrityViolation("record under legal hold".into()));
            }
            let mut ops = self.ops.lock().unwrap();
            if target.archives_preimage() {
                ops.push(Op::Archive(record.id, ArchiveType::PreDeletion));
            }
            row.deleted = true;
            ops.push(Op::Delete(record.id));
            Ok(true)
        }

        async fn soft_delete(&self, _target: &TargetSpec, record_id: Uuid) -> DbResult<bool> {
            self.check_failure(record_id)?;
            let mut records = self.records.lock().unwrap();
            let Some(row) = records
                .iter_mut()
                .find(|r| r.id == record_id && !r.deleted && !r.marked)
            else {
                return Ok(false);
            };
            row.marked = true;
            self.ops.lock().unwrap().push(Op::Mark(record_id));
            Ok(true)
        }

        async fn anonymize(
            &self,
            _target: &TargetSpec,
            record: &EligibleRecord,
            _job_id: CleanupJobId,
            _archived_by: UserId,
        ) -> DbResult<bool> {
            self.check_failure(record.id)?;
            let mut records = self.records.lock().unwrap();
            let Some(row) = records
                .iter_mut()
                .find(|r| r.id == record.id && !r.deleted && !r.anonymized)
            else {
                return Ok(false);
            };
            if Self::held(row) {
                return Err(DbError::IntegrityViolation("record under legal hold".into()));
            }
            let mut ops = self.ops.lock().unwrap();
            ops.push(Op::Archive(record.id, ArchiveType::AnonymizationBackup));
            row.anonymized = true;
            ops.push(Op::Anonymize(record.id));
            Ok(true)
        }

        async fn archive_move(
            &self,
            _target: &TargetSpec,
            record: &EligibleRecord,
            _job_id: CleanupJobId,
            _archived_by: UserId,
        ) -> DbResult<bool> {
            self.check_failure(record.id)?;
            let mut records = self.records.lock().unwrap();
            let Some(row) = records.iter_mut().find(|r| r.id == record.id && !r.deleted)
            else {
                return Ok(false);
            };
            if Self::held(row) {
                return Err(DbError::IntegrityViolation("record under legal hold".into()));
            }
            let mut ops = self.ops.lock().unwrap();
            ops.push(Op::Archive(record.id, ArchiveType::PreDeletion));
            row.deleted = true;
            ops.push(Op::Delete(record.id));
            Ok(true)
        }
    }

    struct JobState {
        policy_id: PolicyId,
        job_type: CleanupJobType,
        status: CleanupStatus,
        counts: CleanupCounts,
        errors: Vec<RecordError>,
        summary: Option<String>,
        cancel_requested: bool,
    }

    #[derive(Default)]
    struct FakeJobRepo {
        jobs: Mutex<HashMap<CleanupJobId, JobState>>,
        cancel_after_checks: Option<usize>,
        checks: AtomicUsize,
    }

    impl FakeJobRepo {
        fn snapshot(state: &JobState, id: CleanupJobId) -> CleanupJob {
            CleanupJob {
                id,
                policy_id: state.policy_id,
                job_type: state.job_type,
                status: state.status,
                started_by: None,
                started_at: None,
                completed_at: None,
                counts: state.counts,
                errors: state.errors.clone(),
                summary: state.summary.clone(),
                created_at: Utc::now(),
            }
        }
    }

    #[async_trait]
    impl CleanupJobRepo for FakeJobRepo {
        async fn create(
            &self,
            policy_id: PolicyId,
            job_type: CleanupJobType,
            _started_by: Option<UserId>,
        ) -> DbResult<CleanupJob> {
            let mut jobs = self.jobs.lock().unwrap();
            if jobs
                .values()
                .any(|j| j.policy_id == policy_id && !j.status.is_terminal())
            {
                return Err(DbError::Duplicate("open cleanup job".to_string()));
            }
            let id = CleanupJobId::new();
            let state = JobState {
                policy_id,
                job_type,
                status: CleanupStatus::Pending,
                counts: CleanupCounts::default(),
                errors: Vec::new(),
                summary: None,
                cancel_requested: false,
            };
            let job = Self::snapshot(&state, id);
            jobs.insert(id, state);
            Ok(job)
        }

        async fn mark_running(&self, id: CleanupJobId) -> DbResult<()> {
            self.jobs.lock().unwrap().get_mut(&id).unwrap().status = CleanupStatus::Running;
            Ok(())
        }

        async fn request_cancel(&self, id: CleanupJobId) -> DbResult<()> {
            self.jobs.lock().unwrap().get_mut(&id).unwrap().cancel_requested = true;
            Ok(())
        }

        async fn cancel_requested(&self, id: CleanupJobId) -> DbResult<bool> {
            let checks = self.checks.fetch_add(1, Ordering::SeqCst) + 1;
            if self.cancel_after_checks.is_some_and(|n| checks > n) {
                return Ok(true);
            }
            Ok(self.jobs.lock().unwrap()[&id].cancel_requested)
        }

        async fn update_progress(&self, id: CleanupJobId, counts: CleanupCounts) -> DbResult<()> {
            self.jobs.lock().unwrap().get_mut(&id).unwrap().counts = counts;
            Ok(())
        }

        async fn finalize(
            &self,
            id: CleanupJobId,
            status: CleanupStatus,
            counts: CleanupCounts,
            errors: &[RecordError],
            summary: &str,
        ) -> DbResult<()> {
            let mut jobs = self.jobs.lock().unwrap();
            let state = jobs.get_mut(&id).unwrap();
            state.status = status;
            state.counts = counts;
            state.errors = errors.to_vec();
            state.summary = Some(summary.to_string());
            Ok(())
        }

        async fn get(&self, id: CleanupJobId) -> DbResult<CleanupJob> {
            let jobs = self.jobs.lock().unwrap();
            Ok(Self::snapshot(&jobs[&id], id))
        }

        async fn list_recent(&self, _limit: i64) -> DbResult<Vec<CleanupJob>> {
            unimplemented!()
        }
    }

    struct FakePolicyRepo;

    #[async_trait]
    impl RetentionPolicyRepo for FakePolicyRepo {
        async fn get(&self, _id: PolicyId) -> DbResult<RetentionPolicy> {
            unimplemented!()
        }

        async fn get_by_name(&self, _name: &str) -> DbResult<RetentionPolicy> {
            unimplemented!()
        }

        async fn list(&self) -> DbResult<Vec<RetentionPolicy>> {
            unimplemented!()
        }

        async fn list_enabled(&self) -> DbResult<Vec<RetentionPolicy>> {
            Ok(Vec::new())
        }
    }

    fn policy(table: &str, action: DeletionAction, retention: i32, grace: i32) -> RetentionPolicy {
        RetentionPolicy {
            id: PolicyId::new(),
            policy_name: format!("{table}_{}", action.as_str()),
            data_type: "test_data".into(),
            table_name: table.into(),
            retention_period_days: retention,
            grace_period_days: grace,
            action,
            legal_basis: None,
            description: None,
            enabled: true,
            created_by: UserId::system(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn runner(store: Arc<MemStore>, jobs: Arc<FakeJobRepo>) -> CleanupRunner {
        CleanupRunner::new(store, Arc::new(FakePolicyRepo), jobs).with_batch_size(10)
    }

    #[tokio::test]
    async fn sweep_continues_past_record_errors() {
        let mut records: Vec<MemRecord> = (0..100).map(|_| days_old(400)).collect();
        let failing = records[57].id;
        let mut store = MemStore::new(records.drain(..).collect());
        store.fail.insert(failing);
        let store = Arc::new(store);
        let jobs = Arc::new(FakeJobRepo::default());

        let report = runner(store.clone(), jobs.clone())
            .sweep(
                &policy("logs", DeletionAction::HardDelete, 30, 7),
                CleanupJobType::ManualCleanup,
                None,
            )
            .await
            .unwrap();

        assert_eq!(report.status, CleanupStatus::Completed);
        assert_eq!(report.counts.processed, 99);
        assert_eq!(report.counts.deleted, 99);
        assert_eq!(report.error_count, 1);

        let job = jobs.get(report.job_id).await.unwrap();
        assert_eq!(job.errors.len(), 1);
        assert_eq!(job.errors[0].record_id, failing);
        // The failing record is still there for the next sweep.
        let remaining = store.records.lock().unwrap();
        assert!(remaining.iter().any(|r| r.id == failing && !r.deleted));
    }

    #[tokio::test]
    async fn archive_is_written_before_the_destructive_action() {
        let store = Arc::new(MemStore::new((0..20).map(|_| days_old(400)).collect()));
        let jobs = Arc::new(FakeJobRepo::default());

        runner(store.clone(), jobs)
            .sweep(
                &policy("logs", DeletionAction::HardDelete, 30, 7),
                CleanupJobType::ManualCleanup,
                None,
            )
            .await
            .unwrap();

        let ops = store.ops.lock().unwrap();
        for (idx, op) in ops.iter().enumerate() {
            if let Op::Delete(id) = op {
                let archive_idx = ops
                    .iter()
                    .position(|o| matches!(o, Op::Archive(a, ArchiveType::PreDeletion) if a == id))
                    .expect("pre-image archived");
                assert!(archive_idx < idx);
            }
        }
    }

    #[tokio::test]
    async fn legal_hold_exempts_records_regardless_of_age() {
        let mut held = days_old(4000);
        held.hold_until = Some(Utc::now() + ChronoDuration::days(30));
        let held_id = held.id;
        let store = Arc::new(MemStore::new(vec![held, days_old(400)]));
        let jobs = Arc::new(FakeJobRepo::default());

        let report = runner(store.clone(), jobs)
            .sweep(
                &policy("logs", DeletionAction::HardDelete, 30, 7),
                CleanupJobType::ManualCleanup,
                None,
            )
            .await
            .unwrap();

        assert_eq!(report.status, CleanupStatus::Completed);
        assert_eq!(report.counts.processed, 1);
        let records = store.records.lock().unwrap();
        assert!(records.iter().any(|r| r.id == held_id && !r.deleted));
    }

    #[tokio::test]
    async fn destructive_actions_wait_out_the_grace_period() {
        // retention 365 + grace 30: 400d eligible, 370d not (< 395), 396d
        // eligible for hard delete; soft delete needs only 365.
        let records = vec![days_old(400), days_old(370), days_old(396)];
        let jobs = Arc::new(FakeJobRepo::default());
        let store = Arc::new(MemStore::new(records.clone()));
        let report = runner(store, jobs.clone())
            .sweep(
                &policy("logs", DeletionAction::HardDelete, 365, 30),
                CleanupJobType::ManualCleanup,
                None,
            )
            .await
            .unwrap();
        assert_eq!(report.counts.processed, 2);

        let store = Arc::new(MemStore::new(records));
        let jobs = Arc::new(FakeJobRepo::default());
        let report = runner(store, jobs)
            .sweep(
                &policy("jobs", DeletionAction::SoftDelete, 365, 30),
                CleanupJobType::ManualCleanup,
                None,
            )
            .await
            .unwrap();
        assert_eq!(report.counts.processed, 3);
        // Soft deletes mark rows; nothing is removed or archived.
        assert_eq!(report.counts.deleted, 0);
    }

    #[tokio::test]
    async fn cancellation_between_batches_keeps_partial_work() {
        let store = Arc::new(MemStore::new((0..25).map(|_| days_old(400)).collect()));
        let jobs = Arc::new(FakeJobRepo {
            cancel_after_checks: Some(1),
            ..FakeJobRepo::default()
        });

        let report = runner(store.clone(), jobs)
            .sweep(
                &policy("logs", DeletionAction::HardDelete, 30, 7),
                CleanupJobType::ScheduledCleanup,
                None,
            )
            .await
            .unwrap();

        assert_eq!(report.status, CleanupStatus::Cancelled);
        // Exactly one batch went through before the flag was observed.
        assert_eq!(report.counts.processed, 10);
        let records = store.records.lock().unwrap();
        assert_eq!(records.iter().filter(|r| r.deleted).count(), 10);
    }

    #[tokio::test]
    async fn unknown_table_fails_the_sweep() {
        let store = Arc::new(MemStore::new(vec![]));
        let jobs = Arc::new(FakeJobRepo::default());

        let report = runner(store, jobs.clone())
            .sweep(
                &policy("user_sessions", DeletionAction::HardDelete, 30, 7),
                CleanupJobType::ManualCleanup,
                None,
            )
            .await
            .unwrap();

        assert_eq!(report.status, CleanupStatus::Failed);
        let job = jobs.get(report.job_id).await.unwrap();
        assert!(job.summary.unwrap().contains("unknown retention target"));
    }

    #[tokio::test]
    async fn unsupported_action_fails_the_sweep() {
        let store = Arc::new(MemStore::new(vec![]));
        let jobs = Arc::new(FakeJobRepo::default());

        // jobs has no registered identifying columns
        let report = runner(store, jobs)
            .sweep(
                &policy("jobs", DeletionAction::Anonymize, 30, 7),
                CleanupJobType::ManualCleanup,
                None,
            )
            .await
            .unwrap();
        assert_eq!(report.status, CleanupStatus::Failed);
    }

    #[tokio::test]
    async fn repeated_sweeps_are_idempotent() {
        let store = Arc::new(MemStore::new((0..5).map(|_| days_old(400)).collect()));
        let jobs = Arc::new(FakeJobRepo::default());
        let runner = runner(store, jobs);
        let p = policy("jobs", DeletionAction::SoftDelete, 30, 7);

        let first = runner
            .sweep(&p, CleanupJobType::ManualCleanup, None)
            .await
            .unwrap();
        assert_eq!(first.counts.processed, 5);

        let second = runner
            .sweep(&p, CleanupJobType::ManualCleanup, None)
            .await
            .unwrap();
        assert_eq!(second.status, CleanupStatus::Completed);
        assert_eq!(second.counts.processed, 0);
    }

    #[tokio::test]
    async fn anonymize_backs_up_the_preimage_first() {
        let store = Arc::new(MemStore::new((0..3).map(|_| days_old(2000)).collect()));
        let jobs = Arc::new(FakeJobRepo::default());

        let report = runner(store.clone(), jobs)
            .sweep(
                &policy("users", DeletionAction::Anonymize, 1095, 30),
                CleanupJobType::ScheduledCleanup,
                None,
            )
            .await
            .unwrap();

        assert_eq!(report.counts.processed, 3);
        assert_eq!(report.counts.anonymized, 3);
        let ops = store.ops.lock().unwrap();
        let backups = ops
            .iter()
            .filter(|o| matches!(o, Op::Archive(_, ArchiveType::AnonymizationBackup)))
            .count();
        assert_eq!(backups, 3);
    }
}
