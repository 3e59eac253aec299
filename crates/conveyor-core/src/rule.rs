//! Event rules: which changes trigger which run templates.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::change::{ChangeOp, ChangeRecord};
use crate::{RuleId, SourceId, TemplateId};

/// A dispatch rule attached to one event source.
///
/// For a given source, rules are totally ordered by (priority desc, id asc);
/// ids are UUIDv7, so "id asc" is the order the rules were configured in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRule {
    pub id: RuleId,
    pub source_id: SourceId,
    /// Entity kind filter. `None` matches any evidence.
    pub evidence: Option<String>,
    pub operation: OperationFilter,
    /// The run template to instantiate when this rule wins.
    pub runtemplate_id: TemplateId,
    /// Env var name → field path, resolved against the change record's
    /// fields at dispatch time.
    pub env_mapping: BTreeMap<String, String>,
    pub enabled: bool,
    /// Higher priority is evaluated first.
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EventRule {
    /// Whether this rule's filters accept the record. Candidate selection
    /// only; priority ordering is the matcher's concern.
    pub fn accepts(&self, record: &ChangeRecord) -> bool {
        let evidence_ok = match &self.evidence {
            Some(kind) => kind == &record.evidence,
            None => true,
        };
        evidence_ok && self.operation.accepts(record.operation)
    }
}

/// Operation filter on a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationFilter {
    /// Matches every operation.
    Any,
    Create,
    Update,
    Delete,
}

impl OperationFilter {
    pub fn accepts(&self, op: ChangeOp) -> bool {
        match self {
            OperationFilter::Any => true,
            OperationFilter::Create => op == ChangeOp::Create,
            OperationFilter::Update => op == ChangeOp::Update,
            OperationFilter::Delete => op == ChangeOp::Delete,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationFilter::Any => "any",
            OperationFilter::Create => "create",
            OperationFilter::Update => "update",
            OperationFilter::Delete => "delete",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "any" => Some(OperationFilter::Any),
            "create" => Some(OperationFilter::Create),
            "update" => Some(OperationFilter::Update),
            "delete" => Some(OperationFilter::Delete),
            _ => None,
        }
    }
}
