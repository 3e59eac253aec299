//! Retention policy engine and cleanup job runner for Conveyor.
//!
//! Evaluates configured policies against their target tables, archives
//! pre-images, applies the configured action per record, and records every
//! sweep in the cleanup job ledger.

pub mod runner;
pub mod targets;

pub use runner::{CleanupRunner, SweepReport};

use conveyor_db::DbError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RetentionError {
    /// The policy names a table outside the compiled-in target registry.
    #[error("unknown retention target table {0:?}")]
    UnknownTable(String),

    /// The policy pairs an action with a table that cannot carry it.
    #[error("policy misconfigured: {0}")]
    Misconfigured(String),

    #[error(transparent)]
    Db(#[from] DbError),
}

pub type RetentionResult<T> = std::result::Result<T, RetentionError>;
