//! Exit code classification.
//!
//! Apps may register per-exit-code severities and a retry flag; without an
//! entry the default applies: 0 is success, anything else is an error.

use serde::{Deserialize, Serialize};

use crate::AppId;

/// A registered meaning for one app's exit code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitCodePolicy {
    pub app_id: AppId,
    pub exit_code: i32,
    pub severity: ExitSeverity,
    /// Whether the external scheduler should re-dispatch on this code. The
    /// ledger only exposes the flag; it never retries itself.
    pub retry: bool,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExitSeverity {
    Success,
    Info,
    Warning,
    Error,
    Critical,
}

impl ExitSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitSeverity::Success => "success",
            ExitSeverity::Info => "info",
            ExitSeverity::Warning => "warning",
            ExitSeverity::Error => "error",
            ExitSeverity::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(ExitSeverity::Success),
            "info" => Some(ExitSeverity::Info),
            "warning" => Some(ExitSeverity::Warning),
            "error" => Some(ExitSeverity::Error),
            "critical" => Some(ExitSeverity::Critical),
            _ => None,
        }
    }
}

/// How a finished job is counted and whether it may be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitOutcome {
    pub severity: ExitSeverity,
    pub success: bool,
    pub retry: bool,
}

/// Classify an exit code against an optional per-app policy entry.
///
/// Success and info severities count towards the template's success counter;
/// warning and above count as failures.
pub fn classify(code: i32, policy: Option<&ExitCodePolicy>) -> ExitOutcome {
    match policy {
        Some(p) => ExitOutcome {
            severity: p.severity,
            success: matches!(p.severity, ExitSeverity::Success | ExitSeverity::Info),
            retry: p.retry,
        },
        None => {
            let severity = if code == 0 {
                ExitSeverity::Success
            } else {
                ExitSeverity::Error
            };
            ExitOutcome {
                severity,
                success: code == 0,
                retry: false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(code: i32, severity: ExitSeverity, retry: bool) -> ExitCodePolicy {
        ExitCodePolicy {
            app_id: AppId::new(),
            exit_code: code,
            severity,
            retry,
            description: String::new(),
        }
    }

    #[test]
    fn default_zero_is_success() {
        let outcome = classify(0, None);
        assert!(outcome.success);
        assert!(!outcome.retry);
        assert_eq!(outcome.severity, ExitSeverity::Success);
    }

    #[test]
    fn default_nonzero_is_error() {
        let outcome = classify(3, None);
        assert!(!outcome.success);
        assert_eq!(outcome.severity, ExitSeverity::Error);
    }

    #[test]
    fn policy_overrides_default() {
        // Exit code 2 registered as a retryable warning.
        let p = policy(2, ExitSeverity::Warning, true);
        let outcome = classify(2, Some(&p));
        assert!(!outcome.success);
        assert!(outcome.retry);
    }

    #[test]
    fn info_severity_counts_as_success() {
        let p = policy(1, ExitSeverity::Info, false);
        assert!(classify(1, Some(&p)).success);
    }
}
