//! Processing ledger: one persisted record per discovered file.
//!
//! Records move forward through [`Stage`]s and are finalized exactly once
//! with a [`RecordStatus`]. The only later change is a demotion, when an
//! organized file is displaced by a better copy. Manual corrections never
//! mutate a record; they create a new one pointing back through `corrects`.
//!
//! # Example
//!
//! ```ignore
//! let ledger = Ledger::start_run(db);
//! let id = ledger.discover(&book).await?;
//! ledger.advance(id, Stage::Read).await?;
//! ledger.finalize(id, &Outcome::unlocated(path, ReasonCode::NoUsableSignal)).await?;
//! ```

mod error;
mod export;
mod record;

pub use error::LedgerError;
pub use export::{INDEX_FILE_NAME, LOG_FILE_NAME, append_processing_log, write_library_index};
pub use record::{ProcessingRecord, ReasonCode, RecordStatus, Stage};

use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use crate::db::Database;
use crate::metadata::{BookFile, QuerySignature, ResolvedMetadata};

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Final outcome written when a record is finalized.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub status: RecordStatus,
    pub final_path: Option<PathBuf>,
    pub reason: Option<ReasonCode>,
    pub metadata: Option<ResolvedMetadata>,
    pub signature: Option<QuerySignature>,
    pub cover_path: Option<PathBuf>,
}

impl Outcome {
    /// Canonical placement in the library.
    #[must_use]
    pub fn organized(final_path: PathBuf, metadata: ResolvedMetadata, cover_path: Option<PathBuf>) -> Self {
        Self {
            status: RecordStatus::Organized,
            final_path: Some(final_path),
            reason: None,
            signature: metadata.signature(),
            metadata: Some(metadata),
            cover_path,
        }
    }

    /// Recognized copy of a canonical entry.
    #[must_use]
    pub fn duplicate(final_path: Option<PathBuf>, reason: ReasonCode, metadata: ResolvedMetadata) -> Self {
        Self {
            status: RecordStatus::Duplicate,
            final_path,
            reason: Some(reason),
            signature: metadata.signature(),
            metadata: Some(metadata),
            cover_path: None,
        }
    }

    /// Metadata could not be resolved.
    #[must_use]
    pub fn unlocated(final_path: Option<PathBuf>, reason: ReasonCode) -> Self {
        Self {
            status: RecordStatus::Unlocated,
            final_path,
            reason: Some(reason),
            metadata: None,
            signature: None,
            cover_path: None,
        }
    }

    /// Skipped by extension or by the user.
    #[must_use]
    pub fn excluded(final_path: Option<PathBuf>, reason: ReasonCode) -> Self {
        Self {
            status: RecordStatus::Excluded,
            final_path,
            reason: Some(reason),
            metadata: None,
            signature: None,
            cover_path: None,
        }
    }
}

/// Ledger bound to one run.
#[derive(Debug, Clone)]
pub struct Ledger {
    db: Database,
    run_id: String,
}

impl Ledger {
    /// Opens a ledger for a fresh run with a timestamp-derived id.
    #[must_use]
    pub fn start_run(db: Database) -> Self {
        let run_id = chrono::Utc::now().format("%Y%m%dT%H%M%S%.6fZ").to_string();
        Self::with_run_id(db, run_id)
    }

    /// Opens a ledger with an explicit run id.
    #[must_use]
    pub fn with_run_id(db: Database, run_id: impl Into<String>) -> Self {
        Self {
            db,
            run_id: run_id.into(),
        }
    }

    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Creates a record at stage `Discovered`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Database`] if the insert fails.
    #[instrument(skip(self, book), fields(source = %book.path.display()))]
    pub async fn discover(&self, book: &BookFile) -> Result<i64> {
        self.insert(book, None).await
    }

    /// Creates a record that supersedes `corrects` (manual correction or exclusion).
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Database`] if the insert fails.
    #[instrument(skip(self, book), fields(source = %book.path.display()))]
    pub async fn discover_correction(&self, book: &BookFile, corrects: i64) -> Result<i64> {
        self.insert(book, Some(corrects)).await
    }

    async fn insert(&self, book: &BookFile, corrects: Option<i64>) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            r"INSERT INTO processing_records (
                run_id, discovery_index, source_path, format, size_bytes, fingerprint, stage, corrects
              )
              VALUES (?, ?, ?, ?, ?, ?, ?, ?)
              RETURNING id",
        )
        .bind(&self.run_id)
        .bind(i64::try_from(book.discovery_index).unwrap_or(i64::MAX))
        .bind(book.path.to_string_lossy().into_owned())
        .bind(book.format.as_str())
        .bind(i64::try_from(book.size).unwrap_or(i64::MAX))
        .bind(Some(book.fingerprint.as_str()).filter(|f| !f.is_empty()))
        .bind(Stage::Discovered.as_str())
        .bind(corrects)
        .fetch_one(self.db.pool())
        .await?;

        debug!(id, "Record discovered");
        Ok(id)
    }

    /// Moves a record forward to `stage`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::RecordNotFound`] for unknown ids and
    /// [`LedgerError::InvalidTransition`] when the record is not strictly
    /// behind `stage` (finalizing goes through [`Ledger::finalize`]).
    #[instrument(skip(self))]
    pub async fn advance(&self, id: i64, stage: Stage) -> Result<()> {
        if stage == Stage::Finalized {
            return Err(LedgerError::invalid_transition(
                id,
                "cannot advance directly to finalized",
                "Use finalize with an outcome",
            ));
        }
        let current = self.require(id).await?.stage();
        if current >= stage {
            return Err(LedgerError::invalid_transition(
                id,
                &format!("record is at {current}, cannot move to {stage}"),
                "Stages only move forward",
            ));
        }

        sqlx::query(
            r"UPDATE processing_records
              SET stage = ?, updated_at = datetime('now')
              WHERE id = ? AND stage = ?",
        )
        .bind(stage.as_str())
        .bind(id)
        .bind(current.as_str())
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    /// Finalizes a record with its outcome.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::RecordNotFound`] for unknown ids and
    /// [`LedgerError::InvalidTransition`] when already finalized.
    #[instrument(skip(self, outcome), fields(status = %outcome.status))]
    pub async fn finalize(&self, id: i64, outcome: &Outcome) -> Result<()> {
        let meta = outcome.metadata.as_ref();
        let result = sqlx::query(
            r"UPDATE processing_records
              SET stage = ?, status = ?, final_path = ?, reason = ?,
                  title = ?, author = ?, year = ?, genre = ?, isbn = ?,
                  confidence = ?, signature = ?, cover_path = ?, cover_url = ?,
                  provenance = ?, updated_at = datetime('now')
              WHERE id = ? AND stage != ?",
        )
        .bind(Stage::Finalized.as_str())
        .bind(outcome.status.as_str())
        .bind(path_text(outcome.final_path.as_deref()))
        .bind(outcome.reason.map(|r| r.as_str()))
        .bind(meta.map(|m| m.title.clone()))
        .bind(meta.map(|m| m.primary_author().to_string()))
        .bind(meta.and_then(|m| m.year))
        .bind(meta.and_then(|m| m.genre.clone()))
        .bind(meta.and_then(|m| m.isbn.clone()))
        .bind(meta.map(|m| m.confidence))
        .bind(outcome.signature.as_ref().map(|s| s.as_str().to_string()))
        .bind(path_text(outcome.cover_path.as_deref()))
        .bind(meta.and_then(|m| m.cover_url.clone()))
        .bind(meta.map(ResolvedMetadata::provenance_summary))
        .bind(id)
        .bind(Stage::Finalized.as_str())
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() == 0 {
            self.require(id).await?;
            return Err(LedgerError::invalid_transition(
                id,
                "record is already finalized",
                "Manual changes create a new record; use correct or exclude",
            ));
        }
        debug!(id, status = %outcome.status, "Record finalized");
        Ok(())
    }

    /// Demotes an organized record to duplicate after displacement.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidTransition`] unless the record is organized.
    #[instrument(skip(self, new_path))]
    pub async fn demote(&self, id: i64, new_path: &Path, reason: ReasonCode) -> Result<()> {
        let result = sqlx::query(
            r"UPDATE processing_records
              SET status = ?, final_path = ?, reason = ?, updated_at = datetime('now')
              WHERE id = ? AND status = ?",
        )
        .bind(RecordStatus::Duplicate.as_str())
        .bind(new_path.to_string_lossy().into_owned())
        .bind(reason.as_str())
        .bind(id)
        .bind(RecordStatus::Organized.as_str())
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() == 0 {
            self.require(id).await?;
            return Err(LedgerError::invalid_transition(
                id,
                "only organized records can be demoted",
                "Check the record status",
            ));
        }
        Ok(())
    }

    /// Finalized records of this run in discovery order.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn snapshot(&self) -> Result<Vec<ProcessingRecord>> {
        let records = sqlx::query_as::<_, ProcessingRecord>(
            r"SELECT * FROM processing_records
              WHERE run_id = ? AND stage = ?
              ORDER BY discovery_index ASC, id ASC",
        )
        .bind(&self.run_id)
        .bind(Stage::Finalized.as_str())
        .fetch_all(self.db.pool())
        .await?;
        Ok(records)
    }

    /// Unlocated records from any run that no later record supersedes.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn unlocated(&self) -> Result<Vec<ProcessingRecord>> {
        let records = sqlx::query_as::<_, ProcessingRecord>(
            r"SELECT r.* FROM processing_records r
              WHERE r.status = ?
                AND NOT EXISTS (
                    SELECT 1 FROM processing_records c WHERE c.corrects = r.id
                )
              ORDER BY r.id ASC",
        )
        .bind(RecordStatus::Unlocated.as_str())
        .fetch_all(self.db.pool())
        .await?;
        Ok(records)
    }

    /// Organized records from every run.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn organized(&self) -> Result<Vec<ProcessingRecord>> {
        let records = sqlx::query_as::<_, ProcessingRecord>(
            r"SELECT * FROM processing_records WHERE status = ? ORDER BY id ASC",
        )
        .bind(RecordStatus::Organized.as_str())
        .fetch_all(self.db.pool())
        .await?;
        Ok(records)
    }

    /// Looks up one record.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn get(&self, id: i64) -> Result<Option<ProcessingRecord>> {
        let record =
            sqlx::query_as::<_, ProcessingRecord>(r"SELECT * FROM processing_records WHERE id = ?")
                .bind(id)
                .fetch_optional(self.db.pool())
                .await?;
        Ok(record)
    }

    async fn require(&self, id: i64) -> Result<ProcessingRecord> {
        self.get(id).await?.ok_or(LedgerError::RecordNotFound(id))
    }
}

fn path_text(path: Option<&Path>) -> Option<String> {
    path.map(|p| p.to_string_lossy().into_owned())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::metadata::{BookFormat, FieldProvenance, SourceTag};

    fn book(name: &str, index: usize) -> BookFile {
        let path = PathBuf::from(format!("/src/{name}"));
        BookFile {
            format: BookFormat::from_path(&path),
            path,
            size: 10,
            fingerprint: format!("fp-{index}"),
            discovery_index: index,
        }
    }

    fn resolved() -> ResolvedMetadata {
        ResolvedMetadata {
            title: "My Book".to_string(),
            authors: vec!["Jane Doe".to_string()],
            year: Some(2019),
            genre: None,
            isbn: None,
            cover_url: None,
            confidence: 0.83,
            provenance: vec![FieldProvenance {
                field: "title".to_string(),
                source: SourceTag::SecondaryApi,
            }],
        }
    }

    async fn ledger() -> Ledger {
        Ledger::with_run_id(Database::new_in_memory().await.unwrap(), "run-1")
    }

    #[tokio::test]
    async fn test_lifecycle_and_snapshot_order() {
        let ledger = ledger().await;
        let second = ledger.discover(&book("b.epub", 1)).await.unwrap();
        let first = ledger.discover(&book("a.epub", 0)).await.unwrap();

        for stage in [Stage::Read, Stage::Resolved, Stage::Checked, Stage::Planned] {
            ledger.advance(first, stage).await.unwrap();
        }
        ledger
            .finalize(
                first,
                &Outcome::organized(PathBuf::from("/lib/Jane Doe/x.epub"), resolved(), None),
            )
            .await
            .unwrap();
        ledger
            .finalize(second, &Outcome::unlocated(None, ReasonCode::NoUsableSignal))
            .await
            .unwrap();

        let snapshot = ledger.snapshot().await.unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].id, first);
        assert_eq!(snapshot[0].status(), Some(RecordStatus::Organized));
        assert_eq!(snapshot[0].title.as_deref(), Some("My Book"));
        assert_eq!(snapshot[0].signature.as_deref(), Some("ta:my book|jane doe"));
        assert_eq!(snapshot[0].provenance.as_deref(), Some("title:secondary_api"));
        assert_eq!(snapshot[1].reason_code(), Some(ReasonCode::NoUsableSignal));
    }

    #[tokio::test]
    async fn test_advance_rejects_backward_and_repeat() {
        let ledger = ledger().await;
        let id = ledger.discover(&book("a.epub", 0)).await.unwrap();
        ledger.advance(id, Stage::Resolved).await.unwrap();

        assert!(matches!(
            ledger.advance(id, Stage::Read).await,
            Err(LedgerError::InvalidTransition { .. })
        ));
        assert!(ledger.advance(id, Stage::Resolved).await.is_err());
        assert!(ledger.advance(id, Stage::Finalized).await.is_err());
        assert!(matches!(
            ledger.advance(999, Stage::Read).await,
            Err(LedgerError::RecordNotFound(999))
        ));
    }

    #[tokio::test]
    async fn test_finalize_only_once() {
        let ledger = ledger().await;
        let id = ledger.discover(&book("a.epub", 0)).await.unwrap();
        let outcome = Outcome::excluded(None, ReasonCode::UnsupportedFileType);
        ledger.finalize(id, &outcome).await.unwrap();
        assert!(matches!(
            ledger.finalize(id, &outcome).await,
            Err(LedgerError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_demote_organized_record() {
        let ledger = ledger().await;
        let id = ledger.discover(&book("a.epub", 0)).await.unwrap();
        ledger
            .finalize(id, &Outcome::organized(PathBuf::from("/lib/a.epub"), resolved(), None))
            .await
            .unwrap();
        ledger
            .demote(id, Path::new("/lib/3. Duplicates/a.epub"), ReasonCode::IdenticalBytes)
            .await
            .unwrap();

        let record = ledger.get(id).await.unwrap().unwrap();
        assert_eq!(record.status(), Some(RecordStatus::Duplicate));
        assert_eq!(record.final_path.as_deref(), Some("/lib/3. Duplicates/a.epub"));
        assert!(ledger.demote(id, Path::new("/x"), ReasonCode::SameWork).await.is_err());
        assert!(ledger.organized().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unlocated_excludes_superseded_records_across_runs() {
        let db = Database::new_in_memory().await.unwrap();
        let run1 = Ledger::with_run_id(db.clone(), "run-1");
        let a = run1.discover(&book("a.pdf", 0)).await.unwrap();
        let b = run1.discover(&book("b.pdf", 1)).await.unwrap();
        for id in [a, b] {
            run1.finalize(id, &Outcome::unlocated(None, ReasonCode::BelowConfidenceFloor))
                .await
                .unwrap();
        }

        let run2 = Ledger::with_run_id(db, "run-2");
        let fix = run2.discover_correction(&book("a.pdf", 0), a).await.unwrap();
        run2.finalize(fix, &Outcome::organized(PathBuf::from("/lib/a.pdf"), resolved(), None))
            .await
            .unwrap();

        let open: Vec<i64> = run2.unlocated().await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(open, vec![b]);
        assert_eq!(run2.get(fix).await.unwrap().unwrap().corrects, Some(a));
        assert_eq!(run2.snapshot().await.unwrap().len(), 1);
    }
}
