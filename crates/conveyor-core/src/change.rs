//! Change records produced by external change feeds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One detected change on a business entity in an external system.
///
/// Records are not persisted by this subsystem; they exist between a feed
/// poll and the dispatch commit. Sequence ids are strictly increasing within
/// one source, which is what makes the cursor protocol work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Position in the source's change log. Exclusive lower bound for the
    /// next poll once committed.
    pub sequence: i64,
    /// Entity kind the change applies to (e.g. "invoice", "address").
    pub evidence: String,
    pub operation: ChangeOp,
    /// Field name → value snapshot carried by the change, as a JSON object.
    pub fields: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

/// The operation a change record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOp {
    Create,
    Update,
    Delete,
}

impl ChangeOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeOp::Create => "create",
            ChangeOp::Update => "update",
            ChangeOp::Delete => "delete",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(ChangeOp::Create),
            "update" => Some(ChangeOp::Update),
            "delete" => Some(ChangeOp::Delete),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChangeOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
