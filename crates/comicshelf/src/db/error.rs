//! Database error types.

use std::path::PathBuf;

use rusqlite::ErrorCode;
use thiserror::Error;

/// Errors from catalog operations.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// SQLite error from rusqlite.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error when creating directories or files.
    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A migration failed to apply.
    #[error("Migration failed at version {version}: {reason}")]
    Migration { version: u32, reason: String },

    /// A stored value could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The database lock was poisoned.
    #[error("Database lock poisoned")]
    LockPoisoned,
}

impl DatabaseError {
    /// True when SQLite reported transient lock contention (BUSY or LOCKED).
    pub fn is_contention(&self) -> bool {
        match self {
            DatabaseError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }

    /// True when the error is a UNIQUE/CHECK/FOREIGN KEY constraint violation.
    pub fn is_constraint_violation(&self) -> bool {
        match self {
            DatabaseError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => {
                e.code == ErrorCode::ConstraintViolation
            }
            _ => false,
        }
    }
}

impl From<serde_json::Error> for DatabaseError {
    fn from(e: serde_json::Error) -> Self {
        DatabaseError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_failure(code: i32) -> DatabaseError {
        DatabaseError::Sqlite(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(code),
            None,
        ))
    }

    #[test]
    fn test_busy_and_locked_are_contention() {
        assert!(sqlite_failure(rusqlite::ffi::SQLITE_BUSY).is_contention());
        assert!(sqlite_failure(rusqlite::ffi::SQLITE_LOCKED).is_contention());
        assert!(!sqlite_failure(rusqlite::ffi::SQLITE_CONSTRAINT).is_contention());
        assert!(!DatabaseError::LockPoisoned.is_contention());
    }

    #[test]
    fn test_constraint_violation() {
        assert!(sqlite_failure(rusqlite::ffi::SQLITE_CONSTRAINT).is_constraint_violation());
        assert!(!sqlite_failure(rusqlite::ffi::SQLITE_BUSY).is_constraint_violation());
    }
}
