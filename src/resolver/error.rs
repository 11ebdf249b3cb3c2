//! Error types for remote metadata lookups.
//!
//! Every variant is a soft failure: the registry turns it into an empty
//! candidate list plus a diagnostic, never an aborted run.

use thiserror::Error;

/// Errors that can occur while querying a remote metadata source.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    /// The source could not be reached or answered with an error.
    #[error("{resolver} unavailable for '{query}': {reason}\n  Suggestion: {suggestion}")]
    RemoteUnavailable {
        /// Name of the source
        resolver: String,
        /// Query being resolved
        query: String,
        /// Why the call failed
        reason: String,
        /// How to fix the issue
        suggestion: String,
    },

    /// The call did not finish within the configured timeout.
    #[error(
        "{resolver} timed out after {seconds}s for '{query}'\n  Suggestion: Check your network connection or raise the remote timeout"
    )]
    Timeout {
        /// Name of the source
        resolver: String,
        /// Query being resolved
        query: String,
        /// Timeout that elapsed
        seconds: u64,
    },

    /// The HTTP client for a source could not be constructed.
    #[error("{resolver} client setup failed: {reason}\n  Suggestion: Check proxy environment variables")]
    ClientSetup {
        /// Name of the source
        resolver: String,
        /// Why construction failed
        reason: String,
    },
}

impl ResolveError {
    /// Creates a `RemoteUnavailable` error for a network failure.
    #[must_use]
    pub fn network(resolver: &str, query: &str, reason: &str) -> Self {
        Self::RemoteUnavailable {
            resolver: resolver.to_string(),
            query: query.to_string(),
            reason: reason.to_string(),
            suggestion: "Check your network connection and try again".to_string(),
        }
    }

    /// Creates a `RemoteUnavailable` error from a non-success HTTP status.
    #[must_use]
    pub fn http_status(resolver: &str, query: &str, status: u16) -> Self {
        let (reason, suggestion) = match status {
            429 => (
                "rate limit exceeded (HTTP 429)".to_string(),
                "Wait a few minutes before the next run",
            ),
            403 => (
                "quota exhausted or key rejected (HTTP 403)".to_string(),
                "Check the API key or wait for the daily quota to reset",
            ),
            s if s >= 500 => (
                format!("service error (HTTP {s})"),
                "The service is having trouble; try again later",
            ),
            s => (format!("unexpected HTTP {s}"), "Check the configured base URL"),
        };
        Self::RemoteUnavailable {
            resolver: resolver.to_string(),
            query: query.to_string(),
            reason,
            suggestion: suggestion.to_string(),
        }
    }

    /// Creates a `RemoteUnavailable` error for a body that did not parse.
    #[must_use]
    pub fn malformed_body(resolver: &str, query: &str, reason: &str) -> Self {
        Self::RemoteUnavailable {
            resolver: resolver.to_string(),
            query: query.to_string(),
            reason: format!("unexpected response format: {reason}"),
            suggestion: "The API may have changed; report this if it persists".to_string(),
        }
    }

    /// Creates a `Timeout` error.
    #[must_use]
    pub fn timeout(resolver: &str, query: &str, seconds: u64) -> Self {
        Self::Timeout {
            resolver: resolver.to_string(),
            query: query.to_string(),
            seconds,
        }
    }

    /// Creates a `ClientSetup` error.
    #[must_use]
    pub fn client_setup(resolver: &str, reason: &str) -> Self {
        Self::ClientSetup {
            resolver: resolver.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Name of the source that failed.
    #[must_use]
    pub fn resolver(&self) -> &str {
        match self {
            Self::RemoteUnavailable { resolver, .. }
            | Self::Timeout { resolver, .. }
            | Self::ClientSetup { resolver, .. } => resolver,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_messages() {
        let err = ResolveError::http_status("google_books", "isbn:9780306406157", 429);
        let msg = err.to_string();
        assert!(msg.contains("google_books unavailable"));
        assert!(msg.contains("429"));
        assert!(msg.contains("Suggestion"));

        let err = ResolveError::http_status("open_library", "q", 503);
        assert!(err.to_string().contains("try again later"));

        let err = ResolveError::http_status("google_books", "q", 403);
        assert!(err.to_string().contains("quota"));
    }

    #[test]
    fn test_timeout_message() {
        let err = ResolveError::timeout("open_library", "ta:my book|jane doe", 15);
        let msg = err.to_string();
        assert!(msg.contains("15s"));
        assert!(msg.contains("ta:my book|jane doe"));
        assert_eq!(err.resolver(), "open_library");
    }

    #[test]
    fn test_clone_preserves_message() {
        let err = ResolveError::network("google_books", "q", "connection refused");
        assert_eq!(err.to_string(), err.clone().to_string());
    }
}
