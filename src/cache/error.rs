//! Error types for lookup cache operations.

use thiserror::Error;

use crate::db::{DbError, DbErrorKind};

/// Errors that can occur while reading or writing the lookup cache.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// Database operation failed.
    #[error("cache database error ({kind}): {message}")]
    Database {
        /// Typed classification of the failure.
        kind: DbErrorKind,
        /// Human-readable database error text.
        message: String,
    },

    /// A stored payload could not be decoded.
    #[error(
        "corrupt cache entry '{signature}': {reason}\n  Suggestion: The entry is ignored and rewritten on the next lookup; run 'bookshelf cache invalidate' to drop it now"
    )]
    Corruption {
        /// Signature of the unreadable entry
        signature: String,
        /// Decoder message
        reason: String,
    },

    /// Candidates could not be encoded for storage.
    #[error("failed to encode cache payload for '{signature}': {reason}")]
    Encode {
        /// Signature being written
        signature: String,
        /// Encoder message
        reason: String,
    },
}

impl From<sqlx::Error> for CacheError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database {
            kind: DbErrorKind::from_sqlx(&err),
            message: err.to_string(),
        }
    }
}

impl From<DbError> for CacheError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Connection(inner) => inner.into(),
            DbError::Migration(inner) => Self::Database {
                kind: DbErrorKind::Other,
                message: inner.to_string(),
            },
        }
    }
}

impl CacheError {
    /// Creates a `Corruption` error.
    #[must_use]
    pub fn corruption(signature: &str, reason: impl Into<String>) -> Self {
        Self::Corruption {
            signature: signature.to_string(),
            reason: reason.into(),
        }
    }

    /// True for a malformed stored payload.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Corruption { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corruption_message() {
        let err = CacheError::corruption("isbn:9780306406157", "expected value at line 1");
        let msg = err.to_string();
        assert!(msg.contains("isbn:9780306406157"));
        assert!(msg.contains("Suggestion"));
        assert!(err.is_corruption());
    }

    #[test]
    fn test_from_sqlx_row_not_found() {
        let err = CacheError::from(sqlx::Error::RowNotFound);
        assert!(matches!(
            err,
            CacheError::Database {
                kind: DbErrorKind::RowNotFound,
                ..
            }
        ));
        assert!(!err.is_corruption());
    }
}
