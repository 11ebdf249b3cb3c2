//! Open Library resolver - the secondary metadata source.
//!
//! Uses the public `search.json` endpoint, which needs no credential.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::metadata::{CandidateMetadata, SourceTag, isbn};

use super::http_client::build_resolver_http_client;
use super::scoring::{self, SECONDARY_ISBN_CONFIDENCE};
use super::{BookQuery, ResolveError, Resolver, ResolverPriority};

/// Default Open Library base URL.
const DEFAULT_BASE_URL: &str = "https://openlibrary.org";

/// Cover image URL template; `{id}` is the numeric `cover_i`.
const COVER_URL_PREFIX: &str = "https://covers.openlibrary.org/b/id/";

const LIMIT: &str = "5";

const NAME: &str = "open_library";

// ==================== Open Library API Response Types ====================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SearchResponse {
    #[serde(default)]
    pub num_found: u64,
    #[serde(default)]
    pub docs: Vec<SearchDoc>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SearchDoc {
    pub title: Option<String>,
    #[serde(default)]
    pub author_name: Vec<String>,
    pub first_publish_year: Option<i32>,
    #[serde(default)]
    pub subject: Vec<String>,
    #[serde(default)]
    pub isbn: Vec<String>,
    pub cover_i: Option<i64>,
}

// ==================== OpenLibraryResolver ====================

/// Resolves book queries through Open Library search.
pub struct OpenLibraryResolver {
    client: Client,
    base_url: String,
}

impl OpenLibraryResolver {
    /// Creates a resolver against the public API.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] if HTTP client construction fails.
    pub fn new() -> Result<Self, ResolveError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Creates a resolver with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] if HTTP client construction fails.
    #[tracing::instrument(skip_all, fields(base_url))]
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, ResolveError> {
        let client = build_resolver_http_client(NAME)?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn request_url(&self, query: &BookQuery) -> Result<Url, ResolveError> {
        let mut params: Vec<(&str, String)> = match query {
            BookQuery::Isbn(value) => vec![("isbn", value.clone())],
            BookQuery::TitleAuthor { title, author } => {
                let mut params = vec![("title", title.clone())];
                if let Some(author) = author {
                    params.push(("author", author.clone()));
                }
                params
            }
        };
        params.push(("limit", LIMIT.to_string()));
        Url::parse_with_params(&format!("{}/search.json", self.base_url), &params)
            .map_err(|e| ResolveError::client_setup(NAME, &format!("invalid base URL: {e}")))
    }
}

impl std::fmt::Debug for OpenLibraryResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenLibraryResolver")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Resolver for OpenLibraryResolver {
    fn name(&self) -> &'static str {
        NAME
    }

    fn priority(&self) -> ResolverPriority {
        ResolverPriority::Secondary
    }

    fn source(&self) -> SourceTag {
        SourceTag::SecondaryApi
    }

    #[tracing::instrument(skip(self, query), fields(resolver = "open_library", query = %query))]
    async fn resolve(&self, query: &BookQuery) -> Result<Vec<CandidateMetadata>, ResolveError> {
        let label = query.to_string();
        let url = self.request_url(query)?;
        debug!(api_url = %url, "Calling Open Library API");

        let response = self.client.get(url).send().await.map_err(|e| {
            warn!(error = %e, "Open Library request failed");
            ResolveError::network(NAME, &label, &e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            debug!(status = status.as_u16(), "Open Library API error");
            return Err(ResolveError::http_status(NAME, &label, status.as_u16()));
        }

        let body = response.json::<SearchResponse>().await.map_err(|e| {
            warn!(error = %e, "Failed to parse Open Library response JSON");
            ResolveError::malformed_body(NAME, &label, &e.to_string())
        })?;

        debug!(num_found = body.num_found, "Open Library hits");
        let candidates: Vec<CandidateMetadata> = body
            .docs
            .into_iter()
            .filter_map(|doc| candidate_from_doc(doc, query))
            .collect();
        debug!(count = candidates.len(), "Open Library candidates");
        Ok(candidates)
    }
}

// ==================== Extraction Helpers ====================

fn candidate_from_doc(doc: SearchDoc, query: &BookQuery) -> Option<CandidateMetadata> {
    let title = doc.title.as_deref().unwrap_or("").trim().to_string();

    let (confidence, isbn) = match query {
        BookQuery::Isbn(value) => {
            let wanted = query.isbn13()?;
            // Search by ISBN may return docs without the isbn field; those are
            // still keyed by the query.
            let contradicts = !doc.isbn.is_empty()
                && !doc
                    .isbn
                    .iter()
                    .filter_map(|raw| isbn::to_isbn13(raw))
                    .any(|found| found == wanted);
            if contradicts {
                return None;
            }
            (SECONDARY_ISBN_CONFIDENCE, Some(value.clone()))
        }
        BookQuery::TitleAuthor { title: wanted, author } => {
            let score = scoring::relevance(wanted, author.as_deref(), &title, &doc.author_name);
            if !scoring::keep(score) {
                return None;
            }
            (score, best_isbn(&doc.isbn))
        }
    };

    Some(
        CandidateMetadata::new(SourceTag::SecondaryApi, confidence)
            .with_title(title)
            .with_authors(doc.author_name)
            .with_year(doc.first_publish_year)
            .with_genre(doc.subject.into_iter().next())
            .with_isbn(isbn.as_deref())
            .with_cover_url(doc.cover_i.filter(|id| *id > 0).map(cover_url)),
    )
}

fn best_isbn(values: &[String]) -> Option<String> {
    values
        .iter()
        .filter_map(|raw| isbn::normalize(raw))
        .find(|v| v.len() == 13)
        .or_else(|| values.iter().find_map(|raw| isbn::normalize(raw)))
}

fn cover_url(id: i64) -> String {
    format!("{COVER_URL_PREFIX}{id}-M.jpg")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_support::socket_guard::start_mock_server_or_skip;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, ResponseTemplate};

    fn doc_json() -> serde_json::Value {
        serde_json::json!({
            "title": "My Book",
            "author_name": ["Jane Doe"],
            "first_publish_year": 2019,
            "subject": ["Fiction", "Novels"],
            "isbn": ["0306406152", "9780306406157"],
            "cover_i": 12345
        })
    }

    #[test]
    fn test_search_response_deserialize() {
        let body: SearchResponse = serde_json::from_value(serde_json::json!({
            "numFound": 1,
            "docs": [doc_json()]
        }))
        .unwrap();
        assert_eq!(body.num_found, 1);
        assert_eq!(body.docs[0].cover_i, Some(12345));
    }

    #[test]
    fn test_title_doc_maps_all_fields() {
        let doc: SearchDoc = serde_json::from_value(doc_json()).unwrap();
        let query = BookQuery::title_author("My Book", Some("Jane Doe")).unwrap();
        let c = candidate_from_doc(doc, &query).unwrap();

        assert_eq!(c.title, "My Book");
        assert_eq!(c.primary_author(), "Jane Doe");
        assert_eq!(c.year, Some(2019));
        assert_eq!(c.genre.as_deref(), Some("Fiction"));
        assert_eq!(c.isbn.as_deref(), Some("9780306406157"));
        assert_eq!(
            c.cover_url.as_deref(),
            Some("https://covers.openlibrary.org/b/id/12345-M.jpg")
        );
        assert_eq!(c.source, SourceTag::SecondaryApi);
    }

    #[test]
    fn test_isbn_doc_confidence_and_mismatch() {
        let query = BookQuery::isbn("9780306406157").unwrap();
        let doc: SearchDoc = serde_json::from_value(doc_json()).unwrap();
        let c = candidate_from_doc(doc, &query).unwrap();
        assert!((c.confidence - SECONDARY_ISBN_CONFIDENCE).abs() < 1e-9);

        let other: SearchDoc = serde_json::from_value(serde_json::json!({
            "title": "Other",
            "isbn": ["9780804429573"]
        }))
        .unwrap();
        assert!(candidate_from_doc(other, &query).is_none());
    }

    #[tokio::test]
    async fn test_resolve_title_against_mock() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/search.json"))
            .and(query_param("title", "My Book"))
            .and(query_param("author", "Jane Doe"))
            .and(query_param("limit", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "numFound": 1,
                "docs": [doc_json()]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let resolver = OpenLibraryResolver::with_base_url(mock_server.uri()).unwrap();
        let query = BookQuery::title_author("My Book", Some("Jane Doe")).unwrap();
        let candidates = resolver.resolve(&query).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].year, Some(2019));
    }

    #[tokio::test]
    async fn test_resolve_server_error_is_unavailable() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/search.json"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&mock_server)
            .await;

        let resolver = OpenLibraryResolver::with_base_url(mock_server.uri()).unwrap();
        let query = BookQuery::isbn("9780306406157").unwrap();
        let err = resolver.resolve(&query).await.unwrap_err();
        assert_eq!(err.resolver(), "open_library");
        assert!(err.to_string().contains("502"));
    }
}
