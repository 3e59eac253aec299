//! Error types shared across the platform.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// A mutation was rejected at a transaction boundary, e.g. deleting a
    /// run template with live jobs or purging a record under legal hold.
    #[error("integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
