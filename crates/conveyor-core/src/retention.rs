//! Retention policies, cleanup jobs and archives.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ArchiveId, CleanupJobId, PolicyId, UserId};

/// A data-lifecycle policy for one target table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub id: PolicyId,
    /// Unique policy identifier, e.g. "job_execution_logs".
    pub policy_name: String,
    pub data_type: String,
    pub table_name: String,
    pub retention_period_days: i32,
    /// Additional time after nominal expiry before destructive action is
    /// permitted.
    pub grace_period_days: i32,
    pub action: DeletionAction,
    pub legal_basis: Option<String>,
    pub description: Option<String>,
    pub enabled: bool,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RetentionPolicy {
    /// Rows whose age timestamp is strictly before this instant are eligible
    /// for this policy's action. Destructive actions wait out the grace
    /// period on top of the retention period.
    pub fn eligibility_threshold(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let mut days = i64::from(self.retention_period_days);
        if self.action.is_destructive() {
            days += i64::from(self.grace_period_days);
        }
        now - Duration::days(days)
    }

    /// Whether a record with the given age timestamp is eligible at `now`.
    /// Monotonic in `now`: once eligible, always eligible.
    pub fn eligible(&self, record_ts: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        record_ts < self.eligibility_threshold(now)
    }
}

/// What happens to a record once its retention expires.
///
/// Closed set on purpose: adding an action is a compile-time exhaustiveness
/// requirement on every handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionAction {
    /// Irreversible row removal. Pre-image archived first.
    HardDelete,
    /// Marks the row; it stays queryable for audit tools.
    SoftDelete,
    /// Overwrites identifying columns. Pre-image archived first.
    Anonymize,
    /// Moves the row into the archive and removes it from the live table.
    Archive,
}

impl DeletionAction {
    /// Destructive actions require the grace period and an archived
    /// pre-image before they commit.
    pub fn is_destructive(&self) -> bool {
        match self {
            DeletionAction::HardDelete | DeletionAction::Anonymize | DeletionAction::Archive => {
                true
            }
            DeletionAction::SoftDelete => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeletionAction::HardDelete => "hard_delete",
            DeletionAction::SoftDelete => "soft_delete",
            DeletionAction::Anonymize => "anonymize",
            DeletionAction::Archive => "archive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "hard_delete" => Some(DeletionAction::HardDelete),
            "soft_delete" => Some(DeletionAction::SoftDelete),
            "anonymize" => Some(DeletionAction::Anonymize),
            "archive" => Some(DeletionAction::Archive),
            _ => None,
        }
    }
}

/// One run of retention enforcement for a policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupJob {
    pub id: CleanupJobId,
    pub policy_id: PolicyId,
    pub job_type: CleanupJobType,
    pub status: CleanupStatus,
    pub started_by: Option<UserId>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub counts: CleanupCounts,
    /// Per-record failures. These never abort the sweep.
    pub errors: Vec<RecordError>,
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupJobType {
    ScheduledCleanup,
    ManualCleanup,
    GracePeriodCleanup,
}

impl CleanupJobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CleanupJobType::ScheduledCleanup => "scheduled_cleanup",
            CleanupJobType::ManualCleanup => "manual_cleanup",
            CleanupJobType::GracePeriodCleanup => "grace_period_cleanup",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduled_cleanup" => Some(CleanupJobType::ScheduledCleanup),
            "manual_cleanup" => Some(CleanupJobType::ManualCleanup),
            "grace_period_cleanup" => Some(CleanupJobType::GracePeriodCleanup),
            _ => None,
        }
    }
}

/// Cleanup job state machine: pending → running → completed | failed |
/// cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CleanupStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl CleanupStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CleanupStatus::Completed | CleanupStatus::Failed | CleanupStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CleanupStatus::Pending => "pending",
            CleanupStatus::Running => "running",
            CleanupStatus::Completed => "completed",
            CleanupStatus::Failed => "failed",
            CleanupStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(CleanupStatus::Pending),
            "running" => Some(CleanupStatus::Running),
            "completed" => Some(CleanupStatus::Completed),
            "failed" => Some(CleanupStatus::Failed),
            "cancelled" => Some(CleanupStatus::Cancelled),
            _ => None,
        }
    }
}

/// Per-action counters for a sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupCounts {
    pub processed: i64,
    pub deleted: i64,
    pub anonymized: i64,
    pub archived: i64,
}

impl CleanupCounts {
    pub fn record(&mut self, action: DeletionAction) {
        self.processed += 1;
        match action {
            DeletionAction::HardDelete => self.deleted += 1,
            DeletionAction::SoftDelete => {}
            DeletionAction::Anonymize => self.anonymized += 1,
            DeletionAction::Archive => self.archived += 1,
        }
    }
}

/// An attributable per-record failure inside a sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordError {
    pub record_id: Uuid,
    pub message: String,
}

/// Why an archive row exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveType {
    PreDeletion,
    AnonymizationBackup,
    LegalHold,
}

impl ArchiveType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveType::PreDeletion => "pre_deletion",
            ArchiveType::AnonymizationBackup => "anonymization_backup",
            ArchiveType::LegalHold => "legal_hold",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pre_deletion" => Some(ArchiveType::PreDeletion),
            "anonymization_backup" => Some(ArchiveType::AnonymizationBackup),
            "legal_hold" => Some(ArchiveType::LegalHold),
            _ => None,
        }
    }
}

/// Immutable snapshot of a record's prior state, written before any
/// destructive or anonymizing action. Outlives the record it archives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveEntry {
    pub id: ArchiveId,
    pub archive_type: ArchiveType,
    pub source_table: String,
    pub source_record_id: Uuid,
    pub archived_data: serde_json::Value,
    pub retention_job_id: Option<CleanupJobId>,
    pub archived_reason: Option<String>,
    /// While in the future, both this copy and the source record are exempt
    /// from any cleanup.
    pub legal_hold_until: Option<DateTime<Utc>>,
    pub archived_by: UserId,
    pub archived_at: DateTime<Utc>,
}

impl ArchiveEntry {
    pub fn hold_active(&self, now: DateTime<Utc>) -> bool {
        self.legal_hold_until.is_some_and(|until| until > now)
    }
}

/// Static description of a table retention may act on.
///
/// Policies name tables by string; only tables present in the compiled-in
/// registry are actionable, which is also what keeps identifiers out of
/// dynamically built SQL.
#[derive(Debug, Clone, Copy)]
pub struct TargetSpec {
    pub table: &'static str,
    /// Column whose timestamp defines the record's age.
    pub age_column: &'static str,
    /// Whether the table carries `marked_for_deletion` / `retention_until`.
    pub has_deletion_marker: bool,
    /// Column holding the table's own legal-hold expiry, if any
    /// (the archive table exempts its held rows from secondary cleanup).
    pub hold_column: Option<&'static str>,
    /// Identifying columns overwritten by anonymization, with their
    /// placeholders. `{id}` in a placeholder is replaced by the record id.
    pub pii: &'static [AnonymizeColumn],
}

#[derive(Debug, Clone, Copy)]
pub struct AnonymizeColumn {
    pub column: &'static str,
    pub placeholder: &'static str,
}

/// The archive table's own name; its rows never get pre-images of
/// themselves.
pub const ARCHIVE_TABLE: &str = "data_archive";

impl TargetSpec {
    /// Whether this target can carry the given action. A policy pairing an
    /// action with an unsupporting table is a fatal misconfiguration.
    pub fn supports(&self, action: DeletionAction) -> std::result::Result<(), String> {
        match action {
            DeletionAction::SoftDelete if !self.has_deletion_marker => Err(format!(
                "table {} has no deletion marker columns",
                self.table
            )),
            DeletionAction::Anonymize if self.pii.is_empty() => Err(format!(
                "table {} has no registered identifying columns",
                self.table
            )),
            DeletionAction::Archive if self.table == ARCHIVE_TABLE => {
                Err("archive rows cannot be archived again".to_string())
            }
            _ => Ok(()),
        }
    }

    /// Destructive actions write a pre-image first, except on the archive
    /// table itself, where the row already is the pre-image.
    pub fn archives_preimage(&self) -> bool {
        self.table != ARCHIVE_TABLE
    }
}
