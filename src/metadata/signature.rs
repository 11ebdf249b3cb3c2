//! Normalized lookup keys.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{isbn, text};

/// Cache and identity key for a bibliographic query.
///
/// `isbn:<ISBN-13>` when a valid ISBN is known, otherwise
/// `ta:<normalized title>|<normalized author>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuerySignature(String);

impl QuerySignature {
    /// Signature for an ISBN, or `None` when it does not validate.
    #[must_use]
    pub fn from_isbn(raw: &str) -> Option<Self> {
        isbn::to_isbn13(raw).map(|isbn13| Self(format!("isbn:{isbn13}")))
    }

    /// Signature for a title/author pair, or `None` when the title is blank.
    #[must_use]
    pub fn from_title_author(title: &str, author: &str) -> Option<Self> {
        let title = text::normalize_key(title);
        if title.is_empty() {
            return None;
        }
        Some(Self(format!("ta:{title}|{}", text::normalize_key(author))))
    }

    /// ISBN signature when possible, else title/author.
    #[must_use]
    pub fn derive(isbn: Option<&str>, title: &str, author: &str) -> Option<Self> {
        isbn.and_then(Self::from_isbn)
            .or_else(|| Self::from_title_author(title, author))
    }

    /// Wraps a stored signature string without re-normalizing it.
    #[must_use]
    pub fn from_stored(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_isbn(&self) -> bool {
        self.0.starts_with("isbn:")
    }
}

impl fmt::Display for QuerySignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isbn10_and_isbn13_share_a_signature() {
        let ten = QuerySignature::from_isbn("0-306-40615-2");
        let thirteen = QuerySignature::from_isbn("978-0-306-40615-7");
        assert_eq!(ten, thirteen);
        assert_eq!(
            thirteen.map(|s| s.to_string()).as_deref(),
            Some("isbn:9780306406157")
        );
    }

    #[test]
    fn test_title_author_signature_normalizes() {
        let sig = QuerySignature::from_title_author("  Les Misérables! ", "Victor HUGO").map(|s| s.to_string());
        assert_eq!(sig.as_deref(), Some("ta:les miserables|victor hugo"));
    }

    #[test]
    fn test_blank_title_has_no_signature() {
        assert!(QuerySignature::from_title_author(" ?! ", "Jane Doe").is_none());
    }

    #[test]
    fn test_derive_prefers_isbn() {
        let sig = QuerySignature::derive(Some("9780306406157"), "My Book", "Jane Doe");
        assert!(sig.is_some_and(|s| s.is_isbn()));

        let sig = QuerySignature::derive(Some("bad"), "My Book", "Jane Doe");
        assert_eq!(
            sig.map(|s| s.to_string()).as_deref(),
            Some("ta:my book|jane doe")
        );
    }
}
