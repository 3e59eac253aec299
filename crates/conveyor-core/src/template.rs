//! Run templates: configured recipes a job instantiates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AppId, CompanyId, TemplateId};

/// A configured app + company execution recipe.
///
/// Templates are never deleted while jobs reference them; the storage layer
/// rejects such deletes as integrity violations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunTemplate {
    pub id: TemplateId,
    pub name: String,
    pub app_id: AppId,
    pub company_id: CompanyId,
    pub interval: Interval,
    /// Preferred executor type (Native, Docker, ...). Consumed by the
    /// external execution layer.
    pub executor: String,
    pub enabled: bool,
    /// Maintained by the job ledger on completion. Monotonic.
    pub successful_jobs_count: i64,
    pub failed_jobs_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Scheduling interval codes, matching the platform's scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    /// Not periodically scheduled; event- or manually-triggered only.
    None,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl Interval {
    pub fn code(&self) -> char {
        match self {
            Interval::None => 'n',
            Interval::Minute => 'i',
            Interval::Hour => 'h',
            Interval::Day => 'd',
            Interval::Week => 'w',
            Interval::Month => 'm',
            Interval::Year => 'y',
        }
    }

    pub fn from_code(c: char) -> Option<Self> {
        match c {
            'n' => Some(Interval::None),
            'i' => Some(Interval::Minute),
            'h' => Some(Interval::Hour),
            'd' => Some(Interval::Day),
            'w' => Some(Interval::Week),
            'm' => Some(Interval::Month),
            'y' => Some(Interval::Year),
            _ => None,
        }
    }
}
