//! Resolver registry with the priority-ordered fallback loop.

use std::time::Duration;

use tracing::{debug, info, warn};

use super::{BookQuery, Resolution, ResolveError, Resolver};

/// Default per-call timeout for remote lookups.
pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(15);

/// Lowest candidate confidence that stops the fallback chain.
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.35;

/// ISBN used to probe source availability.
const PROBE_ISBN: &str = "9780306406157";

/// Availability of one remote source.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectivityReport {
    /// Source name
    pub resolver: String,
    /// Whether the probe query succeeded
    pub available: bool,
    /// Failure description when unavailable
    pub detail: Option<String>,
}

/// A priority-ordered collection of resolvers.
///
/// Within the same priority level, resolvers are tried in registration order.
pub struct ResolverRegistry {
    resolvers: Vec<Box<dyn Resolver>>,
    timeout: Duration,
    min_confidence: f64,
}

impl ResolverRegistry {
    /// Creates an empty resolver registry with default timeout and floor.
    #[must_use]
    pub fn new() -> Self {
        Self {
            resolvers: Vec::new(),
            timeout: DEFAULT_REMOTE_TIMEOUT,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
        }
    }

    /// Sets the per-call timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the confidence floor that satisfies a lookup.
    #[must_use]
    pub fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    /// Registers a resolver and keeps the list sorted by priority.
    #[tracing::instrument(skip(self, resolver), fields(resolver_name))]
    pub fn register(&mut self, resolver: Box<dyn Resolver>) {
        tracing::Span::current().record("resolver_name", resolver.name());
        debug!(
            name = resolver.name(),
            priority = ?resolver.priority(),
            "Registering resolver"
        );
        self.resolvers.push(resolver);
        // Stable sort keeps registration order within one priority.
        self.resolvers.sort_by_key(|r| r.priority());
    }

    /// Returns the number of registered resolvers.
    #[must_use]
    pub fn resolver_count(&self) -> usize {
        self.resolvers.len()
    }

    /// Returns true if no resolvers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }

    /// Resolver names in consultation order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.resolvers.iter().map(|r| r.name()).collect()
    }

    /// Runs the fallback chain for one query.
    ///
    /// Sources are consulted in priority order until one returns a candidate
    /// at or above the confidence floor. Failures and timeouts never
    /// propagate; they mark the resolution degraded and add a diagnostic.
    #[tracing::instrument(skip(self, query), fields(query = %query))]
    pub async fn resolve(&self, query: &BookQuery) -> Resolution {
        let mut resolution = Resolution::default();
        let query_label = query
            .signature()
            .map_or_else(|| query.to_string(), |s| s.to_string());

        for resolver in &self.resolvers {
            resolution.remote_calls += 1;
            debug!(resolver = resolver.name(), "Trying resolver");

            let outcome = tokio::time::timeout(self.timeout, resolver.resolve(query)).await;
            let candidates = match outcome {
                Ok(Ok(candidates)) => candidates,
                Ok(Err(error)) => {
                    warn!(resolver = resolver.name(), error = %error, "Resolver unavailable");
                    resolution.degraded = true;
                    resolution.diagnostics.push(error);
                    continue;
                }
                Err(_) => {
                    let error = ResolveError::timeout(
                        resolver.name(),
                        &query_label,
                        self.timeout.as_secs(),
                    );
                    warn!(resolver = resolver.name(), error = %error, "Resolver timed out");
                    resolution.degraded = true;
                    resolution.diagnostics.push(error);
                    continue;
                }
            };

            let satisfied = candidates
                .iter()
                .any(|c| c.confidence >= self.min_confidence);
            debug!(
                resolver = resolver.name(),
                count = candidates.len(),
                satisfied,
                "Resolver answered"
            );
            resolution.candidates.extend(candidates);
            if satisfied {
                info!(resolver = resolver.name(), "Remote lookup satisfied");
                break;
            }
        }

        resolution
    }

    /// Probes every source with a well-known ISBN.
    #[tracing::instrument(skip(self))]
    pub async fn check_connectivity(&self) -> Vec<ConnectivityReport> {
        let Some(probe) = BookQuery::isbn(PROBE_ISBN) else {
            return Vec::new();
        };

        let mut reports = Vec::with_capacity(self.resolvers.len());
        for resolver in &self.resolvers {
            let outcome = tokio::time::timeout(self.timeout, resolver.resolve(&probe)).await;
            let report = match outcome {
                Ok(Ok(_)) => ConnectivityReport {
                    resolver: resolver.name().to_string(),
                    available: true,
                    detail: None,
                },
                Ok(Err(error)) => ConnectivityReport {
                    resolver: resolver.name().to_string(),
                    available: false,
                    detail: Some(error.to_string()),
                },
                Err(_) => ConnectivityReport {
                    resolver: resolver.name().to_string(),
                    available: false,
                    detail: Some(
                        ResolveError::timeout(resolver.name(), PROBE_ISBN, self.timeout.as_secs())
                            .to_string(),
                    ),
                },
            };
            info!(
                resolver = %report.resolver,
                available = report.available,
                "Connectivity probe finished"
            );
            reports.push(report);
        }
        reports
    }
}

impl std::fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverRegistry")
            .field("resolver_count", &self.resolvers.len())
            .field("resolvers", &self.names())
            .field("timeout", &self.timeout)
            .field("min_confidence", &self.min_confidence)
            .finish()
    }
}

impl Default for ResolverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::metadata::{CandidateMetadata, SourceTag};
    use crate::resolver::ResolverPriority;

    /// Scripted resolver that counts calls.
    pub(crate) struct StubResolver {
        pub name: &'static str,
        pub priority: ResolverPriority,
        pub reply: Result<Vec<CandidateMetadata>, ResolveError>,
        pub delay: Option<Duration>,
        pub calls: Arc<AtomicUsize>,
    }

    impl StubResolver {
        pub(crate) fn answering(
            name: &'static str,
            priority: ResolverPriority,
            candidates: Vec<CandidateMetadata>,
        ) -> Self {
            Self {
                name,
                priority,
                reply: Ok(candidates),
                delay: None,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub(crate) fn failing(name: &'static str, priority: ResolverPriority) -> Self {
            Self {
                name,
                priority,
                reply: Err(ResolveError::http_status(name, "q", 503)),
                delay: None,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl Resolver for StubResolver {
        fn name(&self) -> &str {
            self.name
        }

        fn priority(&self) -> ResolverPriority {
            self.priority
        }

        fn source(&self) -> SourceTag {
            match self.priority {
                ResolverPriority::Primary => SourceTag::PrimaryApi,
                ResolverPriority::Secondary => SourceTag::SecondaryApi,
            }
        }

        async fn resolve(
            &self,
            _query: &BookQuery,
        ) -> Result<Vec<CandidateMetadata>, ResolveError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.reply.clone()
        }
    }

    fn candidate(source: SourceTag, confidence: f64) -> CandidateMetadata {
        CandidateMetadata::new(source, confidence)
            .with_title("My Book")
            .with_author("Jane Doe")
    }

    fn query() -> BookQuery {
        BookQuery::title_author("My Book", Some("Jane Doe")).unwrap()
    }

    #[test]
    fn test_register_sorts_by_priority() {
        let mut registry = ResolverRegistry::new();
        registry.register(Box::new(StubResolver::answering(
            "secondary",
            ResolverPriority::Secondary,
            vec![],
        )));
        registry.register(Box::new(StubResolver::answering(
            "primary",
            ResolverPriority::Primary,
            vec![],
        )));
        assert_eq!(registry.names(), vec!["primary", "secondary"]);
        assert!(format!("{registry:?}").contains("resolver_count: 2"));
    }

    #[tokio::test]
    async fn test_secondary_skipped_when_primary_satisfies() {
        let primary = StubResolver::answering(
            "primary",
            ResolverPriority::Primary,
            vec![candidate(SourceTag::PrimaryApi, 0.9)],
        );
        let secondary = StubResolver::answering("secondary", ResolverPriority::Secondary, vec![]);
        let secondary_calls = Arc::clone(&secondary.calls);

        let mut registry = ResolverRegistry::new();
        registry.register(Box::new(primary));
        registry.register(Box::new(secondary));

        let resolution = registry.resolve(&query()).await;
        assert_eq!(resolution.candidates.len(), 1);
        assert_eq!(resolution.remote_calls, 1);
        assert_eq!(secondary_calls.load(Ordering::SeqCst), 0);
        assert!(!resolution.degraded);
    }

    #[tokio::test]
    async fn test_secondary_consulted_when_primary_below_floor() {
        let primary = StubResolver::answering(
            "primary",
            ResolverPriority::Primary,
            vec![candidate(SourceTag::PrimaryApi, 0.2)],
        );
        let secondary = StubResolver::answering(
            "secondary",
            ResolverPriority::Secondary,
            vec![candidate(SourceTag::SecondaryApi, 0.8)],
        );

        let mut registry = ResolverRegistry::new();
        registry.register(Box::new(primary));
        registry.register(Box::new(secondary));

        let resolution = registry.resolve(&query()).await;
        assert_eq!(resolution.remote_calls, 2);
        assert_eq!(resolution.candidates.len(), 2);
        assert_eq!(resolution.candidates[1].source, SourceTag::SecondaryApi);
    }

    #[tokio::test]
    async fn test_failure_degrades_and_falls_through() {
        let primary = StubResolver::failing("primary", ResolverPriority::Primary);
        let secondary = StubResolver::answering(
            "secondary",
            ResolverPriority::Secondary,
            vec![candidate(SourceTag::SecondaryApi, 0.8)],
        );

        let mut registry = ResolverRegistry::new();
        registry.register(Box::new(primary));
        registry.register(Box::new(secondary));

        let resolution = registry.resolve(&query()).await;
        assert!(resolution.degraded);
        assert_eq!(resolution.diagnostics.len(), 1);
        assert_eq!(resolution.candidates.len(), 1);
        assert!(resolution.is_cacheable());
    }

    #[tokio::test]
    async fn test_timeout_is_soft() {
        let mut slow = StubResolver::answering(
            "slow",
            ResolverPriority::Primary,
            vec![candidate(SourceTag::PrimaryApi, 0.9)],
        );
        slow.delay = Some(Duration::from_millis(500));

        let mut registry = ResolverRegistry::new().with_timeout(Duration::from_millis(20));
        registry.register(Box::new(slow));

        let resolution = registry.resolve(&query()).await;
        assert!(resolution.candidates.is_empty());
        assert!(resolution.degraded);
        assert!(matches!(
            resolution.diagnostics[0],
            ResolveError::Timeout { .. }
        ));
        assert!(!resolution.is_cacheable());
    }

    #[tokio::test]
    async fn test_check_connectivity_reports_each_source() {
        let mut registry = ResolverRegistry::new();
        registry.register(Box::new(StubResolver::answering(
            "up",
            ResolverPriority::Primary,
            vec![],
        )));
        registry.register(Box::new(StubResolver::failing(
            "down",
            ResolverPriority::Secondary,
        )));

        let reports = registry.check_connectivity().await;
        assert_eq!(reports.len(), 2);
        assert!(reports[0].available);
        assert!(!reports[1].available);
        assert!(reports[1].detail.as_deref().unwrap().contains("503"));
    }
}
