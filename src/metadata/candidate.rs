//! Candidate and resolved metadata records.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::QuerySignature;

/// Where a candidate came from.
///
/// Ordering follows source priority: `Manual` first, `Filename` last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTag {
    /// Supplied by a user during manual correction.
    Manual,
    /// Primary remote source (Google Books).
    PrimaryApi,
    /// Secondary remote source (Open Library).
    SecondaryApi,
    /// Read from the file's own container metadata.
    Embedded,
    /// Derived from the bare filename.
    Filename,
}

impl SourceTag {
    /// Returns the stable string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::PrimaryApi => "primary_api",
            Self::SecondaryApi => "secondary_api",
            Self::Embedded => "embedded",
            Self::Filename => "filename",
        }
    }

    /// True for the two remote lookup sources.
    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::PrimaryApi | Self::SecondaryApi)
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One unmerged guess about a book's bibliographic identity.
///
/// Built once and never mutated; the `with_*` helpers consume and return
/// the value so construction reads as a chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateMetadata {
    /// Title, possibly empty.
    #[serde(default)]
    pub title: String,
    /// Authors in source order, possibly empty.
    #[serde(default)]
    pub authors: Vec<String>,
    /// Publication year.
    #[serde(default)]
    pub year: Option<i32>,
    /// Genre or subject.
    #[serde(default)]
    pub genre: Option<String>,
    /// Validated ISBN-10 or ISBN-13 (digits and `X` only).
    #[serde(default)]
    pub isbn: Option<String>,
    /// Cover image location reported by a remote source.
    #[serde(default)]
    pub cover_url: Option<String>,
    /// Which source produced this candidate.
    pub source: SourceTag,
    /// Source-local confidence in `[0, 1]`.
    pub confidence: f64,
}

impl CandidateMetadata {
    /// Creates an empty candidate for a source, clamping confidence to `[0, 1]`.
    #[must_use]
    pub fn new(source: SourceTag, confidence: f64) -> Self {
        Self {
            title: String::new(),
            authors: Vec::new(),
            year: None,
            genre: None,
            isbn: None,
            cover_url: None,
            source,
            confidence: clamp_unit(confidence),
        }
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = super::text::normalize_spaces(&title.into());
        self
    }

    /// Adds an author; blank names are ignored.
    #[must_use]
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        let author = super::text::normalize_spaces(&author.into());
        if !author.is_empty() {
            self.authors.push(author);
        }
        self
    }

    #[must_use]
    pub fn with_authors<I, S>(self, authors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        authors.into_iter().fold(self, Self::with_author)
    }

    #[must_use]
    pub fn with_year(mut self, year: Option<i32>) -> Self {
        self.year = year;
        self
    }

    #[must_use]
    pub fn with_genre(mut self, genre: Option<String>) -> Self {
        self.genre = genre
            .map(|g| super::text::normalize_spaces(&g))
            .filter(|g| !g.is_empty());
        self
    }

    /// Sets the ISBN when it validates; invalid values are dropped.
    #[must_use]
    pub fn with_isbn(mut self, isbn: Option<&str>) -> Self {
        self.isbn = isbn.and_then(super::isbn::normalize);
        self
    }

    #[must_use]
    pub fn with_cover_url(mut self, cover_url: Option<String>) -> Self {
        self.cover_url = cover_url.filter(|u| !u.trim().is_empty());
        self
    }

    /// First listed author, or an empty string.
    #[must_use]
    pub fn primary_author(&self) -> &str {
        self.authors.first().map_or("", String::as_str)
    }

    /// True when the candidate carries no title, author or ISBN.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.is_empty() && self.authors.is_empty() && self.isbn.is_none()
    }

    /// Signature this candidate would be looked up under, if it has enough signal.
    #[must_use]
    pub fn signature(&self) -> Option<QuerySignature> {
        QuerySignature::derive(self.isbn.as_deref(), &self.title, self.primary_author())
    }
}

/// Which source supplied one field of a resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldProvenance {
    pub field: String,
    pub source: SourceTag,
}

/// The single reconciled record for a book file.
///
/// `title` and `authors` are non-empty for every value the reconciler emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedMetadata {
    pub title: String,
    pub authors: Vec<String>,
    pub year: Option<i32>,
    pub genre: Option<String>,
    pub isbn: Option<String>,
    pub cover_url: Option<String>,
    /// Weighted aggregate confidence of the contributing candidates.
    pub confidence: f64,
    /// Per-field sources, in field order.
    pub provenance: Vec<FieldProvenance>,
}

impl ResolvedMetadata {
    /// First listed author.
    #[must_use]
    pub fn primary_author(&self) -> &str {
        self.authors.first().map_or("", String::as_str)
    }

    /// Identity key used by the duplicate detector.
    #[must_use]
    pub fn signature(&self) -> Option<QuerySignature> {
        QuerySignature::derive(self.isbn.as_deref(), &self.title, self.primary_author())
    }

    /// Compact `field:source` list, e.g. `title:secondary_api,author:filename`.
    #[must_use]
    pub fn provenance_summary(&self) -> String {
        self.provenance
            .iter()
            .map(|p| format!("{}:{}", p.field, p.source))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Distinct sources that contributed at least one field.
    #[must_use]
    pub fn sources(&self) -> Vec<SourceTag> {
        let mut sources: Vec<SourceTag> = self.provenance.iter().map(|p| p.source).collect();
        sources.sort();
        sources.dedup();
        sources
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}
