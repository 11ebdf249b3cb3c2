//! Remote metadata lookups against public book catalogues.
//!
//! # Architecture
//!
//! - [`Resolver`] - async trait each remote source implements
//! - [`ResolverRegistry`] - priority-ordered collection with fallback and timeouts
//! - [`GoogleBooksResolver`] - primary source
//! - [`OpenLibraryResolver`] - secondary source, no credential required
//! - [`MetadataLookup`] - cache-first lookup with per-signature coalescing
//!
//! Raw API shapes never leave this module: every resolver normalizes its
//! response into [`CandidateMetadata`] before returning.
//!
//! # Example
//!
//! ```no_run
//! use bookshelf_core::resolver::{BookQuery, build_default_resolver_registry};
//!
//! # async fn example() {
//! let registry = build_default_resolver_registry(None);
//! let query = BookQuery::isbn("978-0-306-40615-7").unwrap();
//! let resolution = registry.resolve(&query).await;
//! println!("{} candidates", resolution.candidates.len());
//! # }
//! ```

mod error;
mod google_books;
mod http_client;
mod lookup;
mod open_library;
pub(crate) mod registry;
mod scoring;

pub use error::ResolveError;
pub use google_books::GoogleBooksResolver;
pub use http_client::configure_resolver_http_timeouts;
pub use lookup::{LookupOutcome, MetadataLookup};
pub use open_library::OpenLibraryResolver;
pub use registry::{ConnectivityReport, DEFAULT_MIN_CONFIDENCE, DEFAULT_REMOTE_TIMEOUT, ResolverRegistry};

use std::fmt;

use async_trait::async_trait;
use tracing::warn;

use crate::metadata::{CandidateMetadata, QuerySignature, SourceTag, isbn};

/// A normalized question for a remote catalogue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookQuery {
    /// Validated bare ISBN (10 or 13 characters).
    Isbn(String),
    /// Free-text title with an optional author.
    TitleAuthor {
        /// Title to search for
        title: String,
        /// Author to narrow the search
        author: Option<String>,
    },
}

impl BookQuery {
    /// Builds an ISBN query, or `None` when the value is not a valid ISBN.
    #[must_use]
    pub fn isbn(raw: &str) -> Option<Self> {
        isbn::normalize(raw).map(Self::Isbn)
    }

    /// Builds a title query, or `None` when the title is blank.
    #[must_use]
    pub fn title_author(title: &str, author: Option<&str>) -> Option<Self> {
        let title = title.trim();
        if title.is_empty() {
            return None;
        }
        Some(Self::TitleAuthor {
            title: title.to_string(),
            author: author
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(ToString::to_string),
        })
    }

    /// Picks the best query that local candidates support.
    ///
    /// Any valid ISBN wins (embedded ones first); otherwise the
    /// highest-confidence candidate with a title supplies title and author.
    #[must_use]
    pub fn from_candidates(candidates: &[CandidateMetadata]) -> Option<Self> {
        let mut with_isbn: Vec<&CandidateMetadata> =
            candidates.iter().filter(|c| c.isbn.is_some()).collect();
        with_isbn.sort_by_key(|c| c.source != SourceTag::Embedded);
        if let Some(query) = with_isbn
            .iter()
            .find_map(|c| c.isbn.as_deref().and_then(Self::isbn))
        {
            return Some(query);
        }

        candidates
            .iter()
            .filter(|c| !c.title.trim().is_empty())
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
            .and_then(|c| {
                let author = c.primary_author();
                Self::title_author(&c.title, (!author.is_empty()).then_some(author))
            })
    }

    /// Cache and coalescing key for this query.
    #[must_use]
    pub fn signature(&self) -> Option<QuerySignature> {
        match self {
            Self::Isbn(value) => QuerySignature::from_isbn(value),
            Self::TitleAuthor { title, author } => {
                QuerySignature::from_title_author(title, author.as_deref().unwrap_or(""))
            }
        }
    }

    /// ISBN-13 form of an ISBN query.
    #[must_use]
    pub fn isbn13(&self) -> Option<String> {
        match self {
            Self::Isbn(value) => isbn::to_isbn13(value),
            Self::TitleAuthor { .. } => None,
        }
    }
}

impl fmt::Display for BookQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Isbn(value) => write!(f, "isbn {value}"),
            Self::TitleAuthor {
                title,
                author: Some(author),
            } => write!(f, "'{title}' by {author}"),
            Self::TitleAuthor { title, author: None } => write!(f, "'{title}'"),
        }
    }
}

/// Order in which the registry consults sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResolverPriority {
    /// Consulted first on every cache miss.
    Primary = 0,
    /// Consulted only when the primary source found nothing usable.
    Secondary = 1,
}

/// A remote catalogue that turns a [`BookQuery`] into candidates.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Stable short name used in logs and diagnostics.
    fn name(&self) -> &str;

    /// Position in the fallback order.
    fn priority(&self) -> ResolverPriority;

    /// Tag stamped on every candidate this resolver produces.
    fn source(&self) -> SourceTag;

    /// Queries the remote source.
    ///
    /// An empty vector is a successful "not found".
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] on network, status, quota or parse failures.
    async fn resolve(&self, query: &BookQuery) -> Result<Vec<CandidateMetadata>, ResolveError>;
}

/// Result of one registry pass over the remote sources.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Candidates from every source consulted, in priority order.
    pub candidates: Vec<CandidateMetadata>,
    /// True when at least one consulted source failed.
    pub degraded: bool,
    /// One entry per failed source.
    pub diagnostics: Vec<ResolveError>,
    /// Number of sources actually called.
    pub remote_calls: usize,
}

impl Resolution {
    /// A failed pass that found nothing is not an answer worth remembering.
    #[must_use]
    pub fn is_cacheable(&self) -> bool {
        !(self.degraded && self.candidates.is_empty())
    }
}

/// Builds the standard registry: Google Books, then Open Library.
///
/// A source whose HTTP client cannot be built is skipped with a warning.
#[must_use]
pub fn build_default_resolver_registry(google_api_key: Option<&str>) -> ResolverRegistry {
    let mut registry = ResolverRegistry::new();

    match GoogleBooksResolver::new(google_api_key.map(ToString::to_string)) {
        Ok(resolver) => registry.register(Box::new(resolver)),
        Err(error) => warn!(error = %error, "Skipping Google Books resolver"),
    }
    match OpenLibraryResolver::new() {
        Ok(resolver) => registry.register(Box::new(resolver)),
        Err(error) => warn!(error = %error, "Skipping Open Library resolver"),
    }

    registry
}
