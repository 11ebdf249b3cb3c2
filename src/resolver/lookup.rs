//! Cache-first metadata lookup with per-signature coalescing.
//!
//! One [`MetadataLookup`] lives for one run. Concurrent lookups for the same
//! [`QuerySignature`] share a single once-cell, so a signature is resolved
//! remotely at most once per run no matter how many files carry it.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::cache::LookupCache;
use crate::metadata::{CandidateMetadata, QuerySignature};

use super::{BookQuery, ResolveError, ResolverRegistry};

/// What a lookup produced and where it came from.
#[derive(Debug, Clone, Default)]
pub struct LookupOutcome {
    /// Normalized remote candidates (possibly empty).
    pub candidates: Vec<CandidateMetadata>,
    /// True when served from the persistent cache.
    pub from_cache: bool,
    /// True when a remote source failed during this lookup.
    pub degraded: bool,
    /// Remote failures, if any.
    pub diagnostics: Vec<ResolveError>,
}

/// Coordinates the lookup cache and the resolver registry.
#[derive(Debug)]
pub struct MetadataLookup {
    cache: LookupCache,
    registry: Arc<ResolverRegistry>,
    in_flight: DashMap<QuerySignature, Arc<OnceCell<LookupOutcome>>>,
    cache_hits: AtomicUsize,
    remote_lookups: AtomicUsize,
}

impl MetadataLookup {
    /// Creates a lookup for one run.
    #[must_use]
    pub fn new(cache: LookupCache, registry: Arc<ResolverRegistry>) -> Self {
        Self {
            cache,
            registry,
            in_flight: DashMap::new(),
            cache_hits: AtomicUsize::new(0),
            remote_lookups: AtomicUsize::new(0),
        }
    }

    /// Returns the underlying cache.
    #[must_use]
    pub fn cache(&self) -> &LookupCache {
        &self.cache
    }

    /// Signatures answered from the cache so far.
    #[must_use]
    pub fn cache_hits(&self) -> usize {
        self.cache_hits.load(Ordering::Relaxed)
    }

    /// Signatures that went to the remote sources so far.
    #[must_use]
    pub fn remote_lookups(&self) -> usize {
        self.remote_lookups.load(Ordering::Relaxed)
    }

    /// Looks up a query, coalescing concurrent requests for one signature.
    #[tracing::instrument(skip(self, query), fields(query = %query))]
    pub async fn lookup(&self, query: &BookQuery) -> LookupOutcome {
        let Some(signature) = query.signature() else {
            debug!("Query has no usable signature");
            return LookupOutcome::default();
        };

        // Clone the cell out so the map shard lock is not held across the await.
        let cell = self
            .in_flight
            .entry(signature.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        cell.get_or_init(|| self.resolve_uncoalesced(query, &signature))
            .await
            .clone()
    }

    async fn resolve_uncoalesced(
        &self,
        query: &BookQuery,
        signature: &QuerySignature,
    ) -> LookupOutcome {
        match self.cache.get(signature).await {
            Ok(Some(candidates)) => {
                self.cache_hits.fetch_add(1, Ordering::Relaxed);
                debug!(signature = %signature, count = candidates.len(), "Lookup cache hit");
                return LookupOutcome {
                    candidates,
                    from_cache: true,
                    degraded: false,
                    diagnostics: Vec::new(),
                };
            }
            Ok(None) => debug!(signature = %signature, "Lookup cache miss"),
            Err(error) => {
                warn!(signature = %signature, error = %error, "Lookup cache read failed; treating as miss");
            }
        }

        self.remote_lookups.fetch_add(1, Ordering::Relaxed);
        let resolution = self.registry.resolve(query).await;

        if resolution.is_cacheable() {
            if let Err(error) = self.cache.put(signature, &resolution.candidates).await {
                warn!(signature = %signature, error = %error, "Failed to store lookup result");
            }
        } else {
            info!(signature = %signature, "Remote sources unavailable; result not cached");
        }

        LookupOutcome {
            candidates: resolution.candidates,
            from_cache: false,
            degraded: resolution.degraded,
            diagnostics: resolution.diagnostics,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::db::Database;
    use crate::metadata::SourceTag;
    use crate::resolver::ResolverPriority;
    use crate::resolver::registry::tests::StubResolver;

    fn found() -> CandidateMetadata {
        CandidateMetadata::new(SourceTag::SecondaryApi, 0.9)
            .with_title("My Book")
            .with_author("Jane Doe")
    }

    async fn cache() -> LookupCache {
        LookupCache::new(Database::new_in_memory().await.unwrap())
    }

    fn query() -> BookQuery {
        BookQuery::title_author("My Book", Some("Jane Doe")).unwrap()
    }

    #[tokio::test]
    async fn test_concurrent_lookups_issue_one_remote_call() {
        let mut stub = StubResolver::answering("primary", ResolverPriority::Primary, vec![found()]);
        stub.delay = Some(Duration::from_millis(50));
        let calls = Arc::clone(&stub.calls);
        let mut registry = ResolverRegistry::new();
        registry.register(Box::new(stub));

        let lookup = Arc::new(MetadataLookup::new(cache().await, Arc::new(registry)));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let lookup = Arc::clone(&lookup);
            handles.push(tokio::spawn(async move { lookup.lookup(&query()).await }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().candidates.len(), 1);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(lookup.remote_lookups(), 1);
    }

    #[tokio::test]
    async fn test_cache_hit_short_circuits_resolvers_across_runs() {
        let shared_cache = cache().await;
        let stub = StubResolver::answering("primary", ResolverPriority::Primary, vec![found()]);
        let calls = Arc::clone(&stub.calls);
        let mut registry = ResolverRegistry::new();
        registry.register(Box::new(stub));
        let registry = Arc::new(registry);

        let first = MetadataLookup::new(shared_cache.clone(), Arc::clone(&registry));
        assert!(!first.lookup(&query()).await.from_cache);

        let second = MetadataLookup::new(shared_cache, registry);
        let outcome = second.lookup(&query()).await;
        assert!(outcome.from_cache);
        assert_eq!(outcome.candidates.len(), 1);
        assert_eq!(second.cache_hits(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_negative_result_is_cached() {
        let shared_cache = cache().await;
        let mut registry = ResolverRegistry::new();
        registry.register(Box::new(StubResolver::answering(
            "primary",
            ResolverPriority::Primary,
            vec![],
        )));
        let lookup = MetadataLookup::new(shared_cache.clone(), Arc::new(registry));

        let outcome = lookup.lookup(&query()).await;
        assert!(outcome.candidates.is_empty());
        let stored = shared_cache
            .get(&query().signature().unwrap())
            .await
            .unwrap();
        assert_eq!(stored, Some(Vec::new()));
    }

    #[tokio::test]
    async fn test_degraded_empty_result_is_not_cached() {
        let shared_cache = cache().await;
        let mut registry = ResolverRegistry::new();
        registry.register(Box::new(StubResolver::failing(
            "primary",
            ResolverPriority::Primary,
        )));
        let lookup = MetadataLookup::new(shared_cache.clone(), Arc::new(registry));

        let outcome = lookup.lookup(&query()).await;
        assert!(outcome.degraded);
        assert_eq!(outcome.diagnostics.len(), 1);
        assert!(
            shared_cache
                .get(&query().signature().unwrap())
                .await
                .unwrap()
                .is_none()
        );
    }
}
