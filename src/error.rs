use std::path::PathBuf;

use rusqlite::ErrorCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A UNIQUE or CHECK constraint rejected the write.
    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Database error: {0}")]
    Database(#[source] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database not initialized at {}. Run 'jobboard init' first.", .0.display())]
    NotInitialized(PathBuf),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref failure, ref msg)
                if failure.code == ErrorCode::ConstraintViolation =>
            {
                let detail = msg.clone().unwrap_or_else(|| failure.to_string());
                StoreError::Constraint(detail)
            }
            other => StoreError::Database(other),
        }
    }
}

impl StoreError {
    pub fn is_constraint(&self) -> bool {
        matches!(self, StoreError::Constraint(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_failure_is_mapped() {
        let sqlite_err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE),
            Some("UNIQUE constraint failed: users.email".to_string()),
        );
        let err = StoreError::from(sqlite_err);
        assert!(err.is_constraint());
        assert_eq!(
            err.to_string(),
            "Constraint violation: UNIQUE constraint failed: users.email"
        );
    }

    #[test]
    fn test_other_failures_stay_database_errors() {
        let err = StoreError::from(rusqlite::Error::QueryReturnedNoRows);
        assert!(!err.is_constraint());
        assert!(err.to_string().contains("Database error"));
    }

    #[test]
    fn test_database_error_exposes_source() {
        let err = StoreError::from(rusqlite::Error::QueryReturnedNoRows);
        let source = std::error::Error::source(&err).expect("source should be set");
        assert_eq!(source.to_string(), rusqlite::Error::QueryReturnedNoRows.to_string());

        let chained = anyhow::Error::new(err).context("loading user");
        assert_eq!(chained.chain().count(), 3);
    }

    #[test]
    fn test_not_initialized_display() {
        let err = StoreError::NotInitialized(PathBuf::from("/tmp/jobboard.db"));
        assert_eq!(
            err.to_string(),
            "Database not initialized at /tmp/jobboard.db. Run 'jobboard init' first."
        );
    }
}
