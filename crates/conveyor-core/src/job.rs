//! Job lifecycle types.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AppId, CompanyId, JobId, SourceId, TemplateId, UserId};

/// One execution of an application for a company.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub app_id: AppId,
    pub company_id: CompanyId,
    pub runtemplate_id: TemplateId,
    pub status: JobStatus,
    /// Materialized environment handed to the executor.
    pub env: BTreeMap<String, String>,
    pub launcher: Launcher,
    pub begin_at: DateTime<Utc>,
    /// Set together with the exit code; a job with `end_at` but no exit code
    /// is unrepresentable in storage.
    pub end_at: Option<DateTime<Utc>>,
    pub exitcode: Option<i32>,
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn is_terminal(&self) -> bool {
        self.end_at.is_some()
    }
}

/// Request to create a job, used identically by external schedulers and the
/// event dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    pub app_id: AppId,
    pub company_id: CompanyId,
    pub runtemplate_id: TemplateId,
    pub env: BTreeMap<String, String>,
    pub launcher: Launcher,
}

/// Job lifecycle. Terminal once completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "running" => Some(JobStatus::Running),
            "completed" => Some(JobStatus::Completed),
            _ => None,
        }
    }
}

/// The identity that launched a job.
///
/// Event-triggered jobs carry their (source, sequence) origin, which doubles
/// as the idempotence key for dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Launcher {
    User { user_id: UserId },
    Scheduler,
    Event { source_id: SourceId, sequence: i64 },
}

impl Launcher {
    /// The dispatch idempotence key, present only for event-triggered jobs.
    pub fn event_origin(&self) -> Option<(SourceId, i64)> {
        match self {
            Launcher::Event {
                source_id,
                sequence,
            } => Some((*source_id, *sequence)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launcher_serializes_tagged() {
        let launcher = Launcher::Event {
            source_id: SourceId::new(),
            sequence: 42,
        };
        let value = serde_json::to_value(&launcher).unwrap();
        assert_eq!(value["kind"], "event");
        assert_eq!(value["sequence"], 42);

        let back: Launcher = serde_json::from_value(value).unwrap();
        assert_eq!(back, launcher);
    }

    #[test]
    fn only_event_jobs_have_an_origin() {
        assert!(Launcher::Scheduler.event_origin().is_none());
        let source_id = SourceId::new();
        let launcher = Launcher::Event {
            source_id,
            sequence: 7,
        };
        assert_eq!(launcher.event_origin(), Some((source_id, 7)));
    }
}
