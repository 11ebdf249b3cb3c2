//! Diagnostics produced while reading container metadata.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Why embedded metadata could not be read.
///
/// These never abort a run: the reader reports them next to an empty
/// candidate set.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReadError {
    /// The container is corrupt, truncated or not the format its extension claims.
    #[error(
        "unreadable file '{path}': {reason}\n  Suggestion: Check that the file is a complete, uncorrupted {format} file"
    )]
    UnreadableFile {
        /// File that failed to parse
        path: PathBuf,
        /// Container format that was attempted
        format: String,
        /// What went wrong
        reason: String,
    },

    /// The document is password-protected.
    #[error(
        "encrypted file '{path}': metadata is not readable\n  Suggestion: Remove the password or supply metadata manually"
    )]
    Encrypted {
        /// File that is encrypted
        path: PathBuf,
    },
}

impl ReadError {
    /// Creates an `UnreadableFile` diagnostic.
    #[must_use]
    pub fn unreadable(path: &Path, format: &str, reason: impl Into<String>) -> Self {
        Self::UnreadableFile {
            path: path.to_path_buf(),
            format: format.to_string(),
            reason: reason.into(),
        }
    }

    /// Creates an `Encrypted` diagnostic.
    #[must_use]
    pub fn encrypted(path: &Path) -> Self {
        Self::Encrypted {
            path: path.to_path_buf(),
        }
    }

    /// Short label used in ledger notes and log fields.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnreadableFile { .. } => "unreadable",
            Self::Encrypted { .. } => "encrypted",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreadable_message_has_suggestion() {
        let err = ReadError::unreadable(Path::new("/lib/a.epub"), "epub", "missing OPF");
        let msg = err.to_string();
        assert!(msg.contains("/lib/a.epub"));
        assert!(msg.contains("missing OPF"));
        assert!(msg.contains("Suggestion"));
        assert_eq!(err.code(), "unreadable");
    }

    #[test]
    fn test_encrypted_code() {
        let err = ReadError::encrypted(Path::new("/lib/a.pdf"));
        assert_eq!(err.code(), "encrypted");
        assert!(err.to_string().contains("password"));
    }
}
