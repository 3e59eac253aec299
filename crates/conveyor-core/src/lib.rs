//! Core domain types for the Conveyor job platform.
//!
//! This crate contains:
//! - Typed resource identifiers
//! - Change records and the shape of external change feeds
//! - Event source and event rule configuration
//! - Run templates and job lifecycle types
//! - Exit code classification
//! - Retention policies, cleanup jobs and archives

pub mod change;
pub mod error;
pub mod exitcode;
pub mod id;
pub mod job;
pub mod retention;
pub mod rule;
pub mod source;
pub mod template;

pub use error::{Error, Result};
pub use id::{
    AppId, ArchiveId, CleanupJobId, CompanyId, JobId, PolicyId, RuleId, SourceId, TemplateId,
    UserId,
};
