//! Persistent lookup cache: query signature to remote candidate list.
//!
//! Entries never expire on their own; they are dropped only by
//! [`LookupCache::invalidate`] or [`LookupCache::clear`]. An empty candidate
//! list is a valid entry (a remembered negative result).
//!
//! A payload that no longer decodes is reported as a miss with a warning and
//! overwritten by the next [`LookupCache::put`] for the same signature.

mod error;

pub use error::CacheError;

use sqlx::Row;
use tracing::{debug, instrument, warn};

use crate::db::Database;
use crate::metadata::{CandidateMetadata, QuerySignature};

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

/// SQLite-backed cache shared by every worker of a run.
#[derive(Debug, Clone)]
pub struct LookupCache {
    db: Database,
}

impl LookupCache {
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Returns the cached candidates for a signature, refreshing its access stamp.
    ///
    /// Corrupt entries are logged and reported as `None`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Database`] if the query fails.
    #[instrument(skip(self), fields(signature = %signature))]
    pub async fn get(&self, signature: &QuerySignature) -> Result<Option<Vec<CandidateMetadata>>> {
        match self.get_checked(signature).await {
            Err(err) if err.is_corruption() => {
                warn!(error = %err, "ignoring corrupt cache entry");
                Ok(None)
            }
            other => other,
        }
    }

    /// Like [`get`](Self::get) but surfaces [`CacheError::Corruption`].
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Database`] if the query fails and
    /// [`CacheError::Corruption`] if the payload does not decode.
    pub async fn get_checked(
        &self,
        signature: &QuerySignature,
    ) -> Result<Option<Vec<CandidateMetadata>>> {
        let row = sqlx::query(
            r"UPDATE lookup_cache
              SET accessed_at = datetime('now')
              WHERE signature = ?
              RETURNING payload",
        )
        .bind(signature.as_str())
        .fetch_optional(self.db.pool())
        .await?;

        let Some(row) = row else {
            debug!("cache miss");
            return Ok(None);
        };
        let payload: String = row.get("payload");
        let candidates = serde_json::from_str::<Vec<CandidateMetadata>>(&payload)
            .map_err(|e| CacheError::corruption(signature.as_str(), e.to_string()))?;
        debug!(count = candidates.len(), "cache hit");
        Ok(Some(candidates))
    }

    /// Stores (or replaces) the candidates for a signature.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Encode`] if serialization fails or
    /// [`CacheError::Database`] if the upsert fails.
    #[instrument(skip(self, candidates), fields(signature = %signature, count = candidates.len()))]
    pub async fn put(&self, signature: &QuerySignature, candidates: &[CandidateMetadata]) -> Result<()> {
        let payload = serde_json::to_string(candidates).map_err(|e| CacheError::Encode {
            signature: signature.to_string(),
            reason: e.to_string(),
        })?;

        sqlx::query(
            r"INSERT INTO lookup_cache (signature, payload)
              VALUES (?, ?)
              ON CONFLICT(signature) DO UPDATE SET
                  payload = excluded.payload,
                  created_at = datetime('now'),
                  accessed_at = datetime('now')",
        )
        .bind(signature.as_str())
        .bind(payload)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    /// Drops one entry. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Database`] if the delete fails.
    #[instrument(skip(self), fields(signature = %signature))]
    pub async fn invalidate(&self, signature: &QuerySignature) -> Result<bool> {
        let result = sqlx::query("DELETE FROM lookup_cache WHERE signature = ?")
            .bind(signature.as_str())
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Drops every entry. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Database`] if the delete fails.
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM lookup_cache")
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected())
    }

    /// Number of stored entries.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Database`] if the query fails.
    pub async fn len(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM lookup_cache")
            .fetch_one(self.db.pool())
            .await?;
        Ok(count.0)
    }

    /// True when the cache holds no entries.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Database`] if the query fails.
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Flushes the write-ahead log at the end of a run.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Database`] if the checkpoint fails.
    pub async fn checkpoint(&self) -> Result<()> {
        self.db.checkpoint().await?;
        Ok(())
    }
}
