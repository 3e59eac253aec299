//! Compiled-in registry of tables retention may act on.
//!
//! A policy's `table_name` is only ever matched against this registry;
//! the registry is what gets identifiers into SQL, so stored configuration
//! never does.

use conveyor_core::retention::{AnonymizeColumn, TargetSpec};

const TARGETS: &[TargetSpec] = &[
    TargetSpec {
        table: "jobs",
        age_column: "begin_at",
        has_deletion_marker: true,
        hold_column: None,
        pii: &[],
    },
    TargetSpec {
        table: "logs",
        age_column: "created_at",
        has_deletion_marker: true,
        hold_column: None,
        pii: &[],
    },
    TargetSpec {
        table: "users",
        age_column: "last_activity_at",
        has_deletion_marker: true,
        hold_column: None,
        pii: &[
            AnonymizeColumn {
                column: "username",
                placeholder: "removed-{id}",
            },
            AnonymizeColumn {
                column: "email",
                placeholder: "removed-{id}@invalid",
            },
            AnonymizeColumn {
                column: "full_name",
                placeholder: "Removed User",
            },
        ],
    },
    TargetSpec {
        table: "companies",
        age_column: "updated_at",
        has_deletion_marker: true,
        hold_column: None,
        pii: &[
            AnonymizeColumn {
                column: "name",
                placeholder: "Removed Company {id}",
            },
            AnonymizeColumn {
                column: "email",
                placeholder: "removed-{id}@invalid",
            },
        ],
    },
    // Secondary cleanup of the archive itself; held copies are exempt via
    // their own hold column.
    TargetSpec {
        table: "data_archive",
        age_column: "archived_at",
        has_deletion_marker: false,
        hold_column: Some("legal_hold_until"),
        pii: &[],
    },
];

/// Look a policy's target table up in the registry.
pub fn find(table_name: &str) -> Option<&'static TargetSpec> {
    TARGETS.iter().find(|t| t.table == table_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use conveyor_core::retention::DeletionAction;

    #[test]
    fn known_tables_resolve() {
        assert!(find("jobs").is_some());
        assert!(find("data_archive").is_some());
        assert!(find("user_sessions").is_none());
    }

    #[test]
    fn jobs_cannot_be_anonymized() {
        let target = find("jobs").unwrap();
        assert!(target.supports(DeletionAction::Anonymize).is_err());
        assert!(target.supports(DeletionAction::SoftDelete).is_ok());
    }

    #[test]
    fn archive_rows_are_not_rearchived() {
        let target = find("data_archive").unwrap();
        assert!(target.supports(DeletionAction::Archive).is_err());
        assert!(target.supports(DeletionAction::HardDelete).is_ok());
        assert!(!target.archives_preimage());
    }
}
