//! Google Books resolver - the primary metadata source.
//!
//! Queries `GET {base}/volumes` with either `q=isbn:<isbn>` or
//! `q=intitle:"<title>" inauthor:"<author>"`. An API key is optional; without
//! one the anonymous quota applies and empty answers are common, which the
//! registry treats as a cue to consult the secondary source.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::format::year_from_date;
use crate::metadata::{CandidateMetadata, SourceTag, isbn};

use super::http_client::build_resolver_http_client;
use super::scoring::{self, PRIMARY_ISBN_CONFIDENCE};
use super::{BookQuery, ResolveError, Resolver, ResolverPriority};

/// Default Google Books API base URL.
const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/books/v1";

const MAX_RESULTS: &str = "5";

const NAME: &str = "google_books";

// ==================== Google Books API Response Types ====================

/// Top-level `volumes` search response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VolumesResponse {
    #[serde(default)]
    pub total_items: u64,
    #[serde(default)]
    pub items: Vec<Volume>,
}

/// One search hit.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Volume {
    pub volume_info: Option<VolumeInfo>,
}

/// Bibliographic block of a hit.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VolumeInfo {
    pub title: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    pub published_date: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub industry_identifiers: Vec<IndustryIdentifier>,
    pub image_links: Option<ImageLinks>,
}

/// An `ISBN_10` / `ISBN_13` / `OTHER` identifier.
#[derive(Debug, Deserialize)]
pub(crate) struct IndustryIdentifier {
    #[serde(rename = "type")]
    pub kind: String,
    pub identifier: String,
}

/// Cover thumbnails.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ImageLinks {
    pub thumbnail: Option<String>,
    pub small_thumbnail: Option<String>,
}

// ==================== GoogleBooksResolver ====================

/// Resolves book queries through the Google Books `volumes` endpoint.
pub struct GoogleBooksResolver {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl GoogleBooksResolver {
    /// Creates a resolver against the public API.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] if HTTP client construction fails.
    pub fn new(api_key: Option<String>) -> Result<Self, ResolveError> {
        Self::build(api_key, DEFAULT_BASE_URL.to_string())
    }

    /// Creates a resolver with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] if HTTP client construction fails.
    #[tracing::instrument(skip_all, fields(base_url))]
    pub fn with_base_url(
        api_key: Option<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, ResolveError> {
        Self::build(api_key, base_url.into())
    }

    fn build(api_key: Option<String>, base_url: String) -> Result<Self, ResolveError> {
        let client = build_resolver_http_client(NAME)?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    fn request_url(&self, query: &BookQuery) -> Result<Url, ResolveError> {
        let q = match query {
            BookQuery::Isbn(value) => format!("isbn:{value}"),
            BookQuery::TitleAuthor { title, author } => {
                let mut q = format!("intitle:\"{}\"", title.replace('"', ""));
                if let Some(author) = author {
                    q.push_str(&format!(" inauthor:\"{}\"", author.replace('"', "")));
                }
                q
            }
        };
        let mut params = vec![("q", q), ("maxResults", MAX_RESULTS.to_string())];
        if let Some(key) = &self.api_key {
            params.push(("key", key.clone()));
        }
        Url::parse_with_params(&format!("{}/volumes", self.base_url), &params)
            .map_err(|e| ResolveError::client_setup(NAME, &format!("invalid base URL: {e}")))
    }
}

impl std::fmt::Debug for GoogleBooksResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleBooksResolver")
            .field("base_url", &self.base_url)
            .field("has_api_key", &self.api_key.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Resolver for GoogleBooksResolver {
    fn name(&self) -> &'static str {
        NAME
    }

    fn priority(&self) -> ResolverPriority {
        ResolverPriority::Primary
    }

    fn source(&self) -> SourceTag {
        SourceTag::PrimaryApi
    }

    #[tracing::instrument(skip(self, query), fields(resolver = "google_books", query = %query))]
    async fn resolve(&self, query: &BookQuery) -> Result<Vec<CandidateMetadata>, ResolveError> {
        let label = query.to_string();
        let url = self.request_url(query)?;

        debug!(path = url.path(), has_key = self.api_key.is_some(), "Calling Google Books API");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Google Books request failed");
                ResolveError::network(NAME, &label, &e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            debug!(status = status.as_u16(), "Google Books API error");
            return Err(ResolveError::http_status(NAME, &label, status.as_u16()));
        }

        let body = response.json::<VolumesResponse>().await.map_err(|e| {
            warn!(error = %e, "Failed to parse Google Books response JSON");
            ResolveError::malformed_body(NAME, &label, &e.to_string())
        })?;

        let candidates = candidates_from_response(body, query);
        debug!(count = candidates.len(), "Google Books candidates");
        Ok(candidates)
    }
}

// ==================== Extraction Helpers ====================

fn candidates_from_response(body: VolumesResponse, query: &BookQuery) -> Vec<CandidateMetadata> {
    debug!(total_items = body.total_items, "Google Books hits");
    body.items
        .into_iter()
        .filter_map(|volume| volume.volume_info)
        .filter_map(|info| candidate_from_volume(info, query))
        .collect()
}

fn candidate_from_volume(info: VolumeInfo, query: &BookQuery) -> Option<CandidateMetadata> {
    let title = info.title.as_deref().unwrap_or("").trim().to_string();
    let volume_isbn = best_isbn(&info.industry_identifiers);

    let confidence = match query {
        BookQuery::Isbn(_) => {
            let wanted = query.isbn13()?;
            let matches = info
                .industry_identifiers
                .iter()
                .filter_map(|id| isbn::to_isbn13(&id.identifier))
                .any(|found| found == wanted);
            if !matches {
                return None;
            }
            PRIMARY_ISBN_CONFIDENCE
        }
        BookQuery::TitleAuthor { title: wanted, author } => {
            let score = scoring::relevance(wanted, author.as_deref(), &title, &info.authors);
            if !scoring::keep(score) {
                return None;
            }
            score
        }
    };

    let isbn = match query {
        BookQuery::Isbn(value) => Some(value.clone()),
        BookQuery::TitleAuthor { .. } => volume_isbn,
    };
    let cover = info
        .image_links
        .and_then(|links| links.thumbnail.or(links.small_thumbnail))
        .map(|link| secure_link(&link));

    Some(
        CandidateMetadata::new(SourceTag::PrimaryApi, confidence)
            .with_title(title)
            .with_authors(info.authors)
            .with_year(info.published_date.as_deref().and_then(year_from_date))
            .with_genre(info.categories.into_iter().next())
            .with_isbn(isbn.as_deref())
            .with_cover_url(cover),
    )
}

/// Prefers ISBN-13 over ISBN-10; ignores identifiers that fail validation.
fn best_isbn(identifiers: &[IndustryIdentifier]) -> Option<String> {
    let pick = |kind: &str| {
        identifiers
            .iter()
            .filter(|id| id.kind == kind)
            .find_map(|id| isbn::normalize(&id.identifier))
    };
    pick("ISBN_13").or_else(|| pick("ISBN_10"))
}

fn secure_link(link: &str) -> String {
    match link.strip_prefix("http://") {
        Some(rest) => format!("https://{rest}"),
        None => link.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_support::socket_guard::start_mock_server_or_skip;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, ResponseTemplate};

    fn volume_json(title: &str, author: &str, isbn13: &str) -> serde_json::Value {
        serde_json::json!({
            "volumeInfo": {
                "title": title,
                "authors": [author],
                "publishedDate": "2019-03-01",
                "categories": ["Fiction"],
                "industryIdentifiers": [
                    {"type": "ISBN_13", "identifier": isbn13},
                    {"type": "OTHER", "identifier": "XYZ:123"}
                ],
                "imageLinks": {"thumbnail": "http://books.google.com/cover.jpg"}
            }
        })
    }

    #[test]
    fn test_volumes_response_deserialize_minimal() {
        let body: VolumesResponse =
            serde_json::from_value(serde_json::json!({"kind": "books#volumes", "totalItems": 0}))
                .unwrap();
        assert!(body.items.is_empty());
    }

    #[test]
    fn test_isbn_query_keeps_only_exact_identifier_matches() {
        let body: VolumesResponse = serde_json::from_value(serde_json::json!({
            "totalItems": 2,
            "items": [
                volume_json("My Book", "Jane Doe", "9780306406157"),
                volume_json("Other Book", "John Roe", "9780804429573")
            ]
        }))
        .unwrap();
        let query = BookQuery::isbn("0306406152").unwrap();
        let candidates = candidates_from_response(body, &query);

        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        assert_eq!(c.title, "My Book");
        assert_eq!(c.year, Some(2019));
        assert_eq!(c.genre.as_deref(), Some("Fiction"));
        assert!((c.confidence - PRIMARY_ISBN_CONFIDENCE).abs() < 1e-9);
        assert_eq!(
            c.cover_url.as_deref(),
            Some("https://books.google.com/cover.jpg")
        );
        assert_eq!(c.source, SourceTag::PrimaryApi);
    }

    #[test]
    fn test_title_query_scores_and_filters() {
        let body: VolumesResponse = serde_json::from_value(serde_json::json!({
            "totalItems": 2,
            "items": [
                volume_json("My Book", "Jane Doe", "9780306406157"),
                volume_json("Cooking for Cats", "Someone Else", "9780804429573")
            ]
        }))
        .unwrap();
        let query = BookQuery::title_author("My Book", Some("Jane Doe")).unwrap();
        let candidates = candidates_from_response(body, &query);

        assert_eq!(candidates.len(), 1);
        assert!((candidates[0].confidence - 1.0).abs() < 1e-9);
        assert_eq!(candidates[0].isbn.as_deref(), Some("9780306406157"));
    }

    #[test]
    fn test_request_url_encodes_title_query_and_key() {
        let resolver =
            GoogleBooksResolver::with_base_url(Some("secret".to_string()), "http://localhost/")
                .unwrap();
        let query = BookQuery::title_author("My \"Book\"", Some("Jane Doe")).unwrap();
        let url = resolver.request_url(&query).unwrap();
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        assert_eq!(url.path(), "/volumes");
        assert!(pairs.contains(&(
            "q".to_string(),
            "intitle:\"My Book\" inauthor:\"Jane Doe\"".to_string()
        )));
        assert!(pairs.contains(&("maxResults".to_string(), "5".to_string())));
        assert!(pairs.contains(&("key".to_string(), "secret".to_string())));
        assert!(!format!("{resolver:?}").contains("secret"));
    }

    #[tokio::test]
    async fn test_resolve_isbn_against_mock() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/volumes"))
            .and(query_param("q", "isbn:9780306406157"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "totalItems": 1,
                "items": [volume_json("My Book", "Jane Doe", "9780306406157")]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let resolver = GoogleBooksResolver::with_base_url(None, mock_server.uri()).unwrap();
        let query = BookQuery::isbn("9780306406157").unwrap();
        let candidates = resolver.resolve(&query).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].authors, vec!["Jane Doe".to_string()]);
    }

    #[tokio::test]
    async fn test_resolve_maps_quota_status_to_unavailable() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/volumes"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&mock_server)
            .await;

        let resolver = GoogleBooksResolver::with_base_url(None, mock_server.uri()).unwrap();
        let query = BookQuery::title_author("My Book", None).unwrap();
        let err = resolver.resolve(&query).await.unwrap_err();
        assert!(matches!(err, ResolveError::RemoteUnavailable { .. }));
        assert!(err.to_string().contains("429"));
    }

    #[tokio::test]
    async fn test_resolve_malformed_body() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/volumes"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>nope</html>"))
            .mount(&mock_server)
            .await;

        let resolver = GoogleBooksResolver::with_base_url(None, mock_server.uri()).unwrap();
        let query = BookQuery::title_author("My Book", None).unwrap();
        let err = resolver.resolve(&query).await.unwrap_err();
        assert!(err.to_string().contains("unexpected response format"));
    }
}
