//! Database error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate: {0}")]
    Duplicate(String),

    /// Rejected at a transaction boundary, e.g. deleting a run template
    /// that still has jobs.
    #[error("integrity violation: {0}")]
    IntegrityViolation(String),

    /// A stored value no longer parses into its domain type.
    #[error("corrupt row: {0}")]
    Decode(String),

    #[error("database error: {0}")]
    Database(sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            match db.code().as_deref() {
                // unique_violation
                Some("23505") => return DbError::Duplicate(db.message().to_string()),
                // foreign_key_violation / restrict
                Some("23503") => return DbError::IntegrityViolation(db.message().to_string()),
                _ => {}
            }
        }
        DbError::Database(err)
    }
}

pub type DbResult<T> = std::result::Result<T, DbError>;
