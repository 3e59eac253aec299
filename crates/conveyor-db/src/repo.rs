//! Repository traits and implementations.

pub mod exitcode;
pub mod job;
pub mod retention;
pub mod retention_store;
pub mod rule;
pub mod source;
pub mod template;

pub use exitcode::{ExitCodeRepo, PgExitCodeRepo};
pub use job::{CompletedJob, JobRepo, PgJobRepo};
pub use retention::{
    ArchiveRepo, CleanupJobRepo, NewArchiveEntry, PgArchiveRepo, PgCleanupJobRepo,
    PgRetentionPolicyRepo, RetentionPolicyRepo,
};
pub use retention_store::{EligibleRecord, PgRetentionStore, RetentionStore};
pub use rule::{EventRuleRepo, NewEventRule, PgEventRuleRepo};
pub use source::{
    DispatchCommit, EventSourceRepo, NewEventSource, PgEventSourceRepo, PollGuard, PollLease,
};
pub use template::{NewRunTemplate, PgRunTemplateRepo, RunTemplateRepo};
