//! Error types for ledger operations.

use std::path::PathBuf;

use thiserror::Error;

use crate::db::DbErrorKind;

/// Errors that can occur while reading or writing processing records.
#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    /// Database operation failed.
    #[error("database error ({kind}): {message}")]
    Database {
        /// Typed classification of the failure.
        kind: DbErrorKind,
        /// Human-readable database error text.
        message: String,
    },

    /// Record not found.
    #[error(
        "processing record not found: id {0}\n  Suggestion: Run 'bookshelf unlocated <DEST>' to list valid record ids"
    )]
    RecordNotFound(i64),

    /// A transition the record lifecycle does not allow.
    #[error("invalid transition for record {id}: {reason}\n  Suggestion: {suggestion}")]
    InvalidTransition {
        /// Record id
        id: i64,
        /// What was attempted
        reason: String,
        /// How to proceed
        suggestion: String,
    },

    /// Writing a log or index file failed.
    #[error("cannot write {path}: {reason}\n  Suggestion: Check that the destination folder is writable")]
    Export {
        /// File being written
        path: PathBuf,
        /// Underlying failure
        reason: String,
    },
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database {
            kind: DbErrorKind::from_sqlx(&err),
            message: err.to_string(),
        }
    }
}

impl LedgerError {
    /// Creates an `InvalidTransition` error.
    #[must_use]
    pub fn invalid_transition(id: i64, reason: &str, suggestion: &str) -> Self {
        Self::InvalidTransition {
            id,
            reason: reason.to_string(),
            suggestion: suggestion.to_string(),
        }
    }

    /// Creates an `Export` error.
    #[must_use]
    pub fn export(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Export {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns the typed database error kind, when this is a database error.
    #[must_use]
    pub fn database_kind(&self) -> Option<DbErrorKind> {
        match self {
            Self::Database { kind, .. } => Some(*kind),
            Self::RecordNotFound(_) | Self::InvalidTransition { .. } | Self::Export { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_not_found_message() {
        let msg = LedgerError::RecordNotFound(42).to_string();
        assert!(msg.contains("42"));
        assert!(msg.contains("Suggestion"));
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = LedgerError::invalid_transition(7, "record is already finalized", "Start a new run");
        let msg = err.to_string();
        assert!(msg.contains("record 7"));
        assert!(msg.contains("already finalized"));
        assert_eq!(err.database_kind(), None);
    }

    #[test]
    fn test_sqlx_error_is_classified() {
        let err = LedgerError::from(sqlx::Error::PoolClosed);
        assert_eq!(err.database_kind(), Some(DbErrorKind::PoolClosed));
    }
}
