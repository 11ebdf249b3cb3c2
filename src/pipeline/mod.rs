//! The organize run: discovery, resolution, duplicate checks and moves.
//!
//! [`Pipeline`] drives every discovered file through
//! read → lookup → reconcile → duplicate check → plan → move → record,
//! with at most `concurrency` files in flight. Per-file failures are
//! recorded in the ledger and never stop the batch.
//!
//! # Concurrency Model
//!
//! - Each file runs in its own Tokio task
//! - A semaphore permit is acquired before a file is dispatched
//! - Cancelling the token stops dispatching; running files finish their move
//! - Lookups coalesce per signature and duplicate checks lock per bucket
//!
//! # Example
//!
//! ```no_run
//! use bookshelf_core::{Config, Pipeline};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::new("/books/library").with_source("/books/inbox");
//! let pipeline = Pipeline::open(config).await?;
//! let stats = pipeline.organize().await?;
//! println!("{stats}");
//! # Ok(())
//! # }
//! ```

mod discovery;
mod error;
mod mover;
mod stats;

pub use discovery::{DiscoveredFile, discover};
pub use error::PipelineError;
pub use mover::relocate;
pub use stats::RunStats;

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{Mutex, OnceCell, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::cache::LookupCache;
use crate::config::{Config, ConfigError};
use crate::db::Database;
use crate::dedup::{BucketGuard, CanonicalEntry, DuplicateCheck, DuplicateDetector};
use crate::format;
use crate::heuristics;
use crate::ledger::{
    Ledger, LedgerError, Outcome, ProcessingRecord, ReasonCode, RecordStatus, Stage,
    append_processing_log,
    write_library_index,
};
use crate::metadata::{
    BookFile, BookFormat, CandidateMetadata, QuerySignature, ResolvedMetadata, SourceTag, text,
};
use crate::planner::{PathPlanner, PlanOutcome};
use crate::reconcile::{Reconciliation, reconcile};
use crate::resolver::{BookQuery, MetadataLookup, ResolverRegistry, build_default_resolver_registry};

/// Result type for pipeline commands.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// State shared by every file task of one run.
struct Shared {
    config: Config,
    ledger: Ledger,
    lookup: MetadataLookup,
    detector: DuplicateDetector,
    planner: PathPlanner,
    seeded: OnceCell<()>,
    failed: AtomicUsize,
    /// Status each record had when it was last written to the processing log.
    logged: Mutex<HashMap<i64, Option<RecordStatus>>>,
}

/// Organizes a source folder into a library and applies manual fixes.
pub struct Pipeline {
    shared: Arc<Shared>,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("destination", &self.shared.config.destination)
            .field("run_id", &self.shared.ledger.run_id())
            .field("concurrency", &self.shared.config.concurrency)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Validates the library, opens its database and builds the default
    /// resolvers (Google Books, then Open Library).
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] for invalid settings or an
    /// unwritable destination, and [`PipelineError::Database`] when the
    /// database cannot be opened.
    #[instrument(skip(config), fields(destination = %config.destination.display()))]
    pub async fn open(config: Config) -> Result<Self> {
        config.validate_library()?;
        let db = Database::new(&config.database_path()).await?;
        let registry = build_default_resolver_registry(config.google_api_key.as_deref())
            .with_timeout(config.remote_timeout)
            .with_min_confidence(config.resolver_min_confidence);
        Self::new(config, db, registry)
    }

    /// Builds a pipeline over an open database and a prepared registry.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] for invalid settings.
    pub fn new(config: Config, db: Database, registry: ResolverRegistry) -> Result<Self> {
        config.validate_settings()?;
        let pattern = config.naming_pattern()?;
        let root = std::path::absolute(&config.destination)
            .unwrap_or_else(|_| config.destination.clone());
        let planner = PathPlanner::new(root, config.mode, pattern)
            .with_covers(config.covers, config.dirs.covers.clone());

        debug!(
            concurrency = config.concurrency,
            resolvers = ?registry.names(),
            dry_run = config.dry_run,
            "creating pipeline"
        );

        let semaphore = Arc::new(Semaphore::new(config.concurrency));
        let shared = Shared {
            ledger: Ledger::start_run(db.clone()),
            lookup: MetadataLookup::new(LookupCache::new(db), Arc::new(registry)),
            detector: DuplicateDetector::new(),
            planner,
            seeded: OnceCell::new(),
            logged: Mutex::new(HashMap::new()),
            failed: AtomicUsize::new(0),
            config,
        };
        Ok(Self {
            shared: Arc::new(shared),
            semaphore,
            cancel: CancellationToken::new(),
        })
    }

    /// Token that stops the dispatch of further files when cancelled.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    #[must_use]
    pub fn ledger(&self) -> &Ledger {
        &self.shared.ledger
    }

    /// Processes every file under the source folder.
    ///
    /// Individual file failures do not make this method fail; they are
    /// recorded and counted in the returned stats.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] when no usable source is configured,
    /// [`PipelineError::Discovery`] when it cannot be listed, and ledger or
    /// cache errors from the bookkeeping at the start and end of the run.
    #[instrument(skip(self), fields(run_id = %self.shared.ledger.run_id()))]
    pub async fn organize(&self) -> Result<RunStats> {
        let config = &self.shared.config;
        let source = config.source.clone().ok_or(ConfigError::NoSource)?;
        config.validate()?;

        let files = discover(&source, config)?;
        self.shared.seed().await?;
        info!(
            files = files.len(),
            source = %source.display(),
            dry_run = config.dry_run,
            "starting run"
        );

        let total = files.len();
        let mut handles = Vec::with_capacity(total);
        for file in files {
            if self.cancel.is_cancelled() {
                warn!(
                    dispatched = handles.len(),
                    remaining = total - handles.len(),
                    "run cancelled; no further files dispatched"
                );
                break;
            }

            // Acquire a permit, unless cancellation arrives first.
            let permit = tokio::select! {
                biased;
                () = self.cancel.cancelled() => continue,
                permit = Arc::clone(&self.semaphore).acquire_owned() => {
                    permit.map_err(|_| PipelineError::SemaphoreClosed)?
                }
            };

            let shared = Arc::clone(&self.shared);
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                shared.process(file).await;
            }));
        }

        debug!(task_count = handles.len(), "waiting for files to finish");
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "file task panicked");
                self.shared.failed.fetch_add(1, Ordering::SeqCst);
            }
        }

        self.finish().await
    }

    /// Unlocated records awaiting correction, across runs.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Ledger`] if the query fails.
    pub async fn unlocated(&self) -> Result<Vec<ProcessingRecord>> {
        Ok(self.shared.ledger.unlocated().await?)
    }

    /// Re-processes an unlocated record with user-supplied metadata.
    ///
    /// The candidate is tagged [`SourceTag::Manual`] and reconciled together
    /// with whatever the lookup (cache first) returns for it. The outcome is
    /// a new record that supersedes `record_id`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::IncompleteCorrection`] without a title and
    /// author, [`PipelineError::NotAdjustable`] unless the record is an open
    /// unlocated one, and [`PipelineError::FileMissing`] when its file is gone.
    #[instrument(skip(self, candidate), fields(title = %candidate.title))]
    pub async fn correct(
        &self,
        record_id: i64,
        candidate: CandidateMetadata,
    ) -> Result<ProcessingRecord> {
        if candidate.title.trim().is_empty() || candidate.primary_author().trim().is_empty() {
            return Err(PipelineError::IncompleteCorrection);
        }
        let shared = &self.shared;
        let (record, path) = shared.adjustable(record_id).await?;
        shared.seed().await?;

        let book = inspect_for_record(&record, &path).await?;
        let id = shared.ledger.discover_correction(&book, record_id).await?;

        let mut candidates = vec![CandidateMetadata {
            source: SourceTag::Manual,
            ..candidate
        }];
        shared.ledger.advance(id, Stage::Read).await?;
        if let Some(query) = BookQuery::from_candidates(&candidates) {
            let outcome = shared.lookup.lookup(&query).await;
            debug!(
                from_cache = outcome.from_cache,
                count = outcome.candidates.len(),
                "lookup for corrected metadata"
            );
            candidates.extend(outcome.candidates);
        }
        shared.ledger.advance(id, Stage::Resolved).await?;
        shared.settle(id, &book, &candidates).await?;

        self.finish().await?;
        let corrected = shared
            .ledger
            .get(id)
            .await?
            .ok_or(LedgerError::RecordNotFound(id))?;
        info!(record = record_id, new_record = id, status = ?corrected.status(), "correction applied");
        Ok(corrected)
    }

    /// Moves an unlocated file to the excluded area and records it as
    /// excluded by the user.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NotAdjustable`] unless the record is an open
    /// unlocated one, and [`PipelineError::FileMissing`] when its file is gone.
    #[instrument(skip(self))]
    pub async fn exclude(&self, record_id: i64) -> Result<ProcessingRecord> {
        let shared = &self.shared;
        let (record, path) = shared.adjustable(record_id).await?;
        let book = inspect_for_record(&record, &path).await?;
        let id = shared.ledger.discover_correction(&book, record_id).await?;

        let outcome = match shared
            .move_into(&path, &shared.config.excluded_dir(), &file_name(&path))
            .await
        {
            Ok(target) => Outcome::excluded(Some(target), ReasonCode::ExcludedByUser),
            Err(error) => {
                warn!(path = %path.display(), error = %error, "could not move excluded file");
                Outcome::unlocated(None, ReasonCode::MoveFailed)
            }
        };
        shared.ledger.finalize(id, &outcome).await?;

        self.finish().await?;
        Ok(shared
            .ledger
            .get(id)
            .await?
            .ok_or(LedgerError::RecordNotFound(id))?)
    }

    /// Writes the log and index files and checkpoints the database.
    async fn finish(&self) -> Result<RunStats> {
        let shared = &self.shared;
        let records = shared.ledger.snapshot().await?;
        let logs_dir = shared.config.logs_dir();
        {
            let mut logged = shared.logged.lock().await;
            let fresh: Vec<ProcessingRecord> = records
                .iter()
                .filter(|record| logged.get(&record.id) != Some(&record.status()))
                .cloned()
                .collect();
            append_processing_log(&logs_dir, &fresh)?;
            logged.extend(fresh.iter().map(|record| (record.id, record.status())));
        }
        write_library_index(
            &logs_dir,
            shared.planner.root(),
            &shared.ledger.organized().await?,
        )?;
        shared.lookup.cache().checkpoint().await?;

        let mut stats = RunStats::from_records(&records);
        stats.failed = shared.failed.load(Ordering::SeqCst);
        stats.cache_hits = shared.lookup.cache_hits();
        stats.remote_lookups = shared.lookup.remote_lookups();
        info!(
            organized = stats.organized,
            duplicate = stats.duplicate,
            unlocated = stats.unlocated,
            excluded = stats.excluded,
            failed = stats.failed,
            cache_hits = stats.cache_hits,
            remote_lookups = stats.remote_lookups,
            "run complete"
        );
        Ok(stats)
    }
}

impl Shared {
    /// Registers canonical files organized by earlier runs, once.
    async fn seed(&self) -> std::result::Result<(), LedgerError> {
        self.seeded
            .get_or_try_init(|| async {
                let entries: Vec<CanonicalEntry> = self
                    .ledger
                    .organized()
                    .await?
                    .into_iter()
                    .filter_map(prior_canonical)
                    .collect();
                for entry in &entries {
                    self.planner.reserve_existing(&entry.path);
                }
                self.detector.seed(entries);
                Ok::<(), LedgerError>(())
            })
            .await
            .map(|_| ())
    }

    async fn process(&self, file: DiscoveredFile) {
        if let Err(error) = self.process_file(&file).await {
            warn!(path = %file.path.display(), error = %error, "file could not be recorded");
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[instrument(skip(self, file), fields(path = %file.path.display(), index = file.index))]
    async fn process_file(&self, file: &DiscoveredFile) -> std::result::Result<(), LedgerError> {
        if file.excluded {
            let size = tokio::fs::metadata(&file.path).await.map_or(0, |m| m.len());
            let id = self.ledger.discover(&unhashed_book(file, size)).await?;
            debug!("excluded by extension");
            return self
                .ledger
                .finalize(id, &Outcome::excluded(None, ReasonCode::UnsupportedFileType))
                .await;
        }

        let book = match BookFile::inspect(&file.path, file.index).await {
            Ok(book) => book,
            Err(error) => {
                warn!(error = %error, "cannot read file");
                let id = self.ledger.discover(&unhashed_book(file, 0)).await?;
                return self
                    .ledger
                    .finalize(id, &Outcome::unlocated(None, ReasonCode::NoUsableSignal))
                    .await;
            }
        };
        let id = self.ledger.discover(&book).await?;

        let read = format::read_embedded(&book).await;
        for diagnostic in &read.diagnostics {
            debug!(diagnostic = %diagnostic, "embedded metadata unavailable");
        }
        let mut candidates = read.candidates;
        candidates.extend(heuristics::parse_filename(&book.stem()));
        self.ledger.advance(id, Stage::Read).await?;

        if let Some(query) = BookQuery::from_candidates(&candidates) {
            let outcome = self.lookup.lookup(&query).await;
            if outcome.degraded {
                for diagnostic in &outcome.diagnostics {
                    warn!(diagnostic = %diagnostic, "remote source unavailable");
                }
            }
            candidates.extend(outcome.candidates);
        }
        self.ledger.advance(id, Stage::Resolved).await?;

        self.settle(id, &book, &candidates).await
    }

    /// Reconciler onwards: classification, duplicate check, plan, move.
    async fn settle(
        &self,
        id: i64,
        book: &BookFile,
        candidates: &[CandidateMetadata],
    ) -> std::result::Result<(), LedgerError> {
        match reconcile(candidates, &self.config.policy) {
            Reconciliation::Unresolved(reason) => {
                debug!(reason = %reason, "unresolved");
                self.finish_unlocated(id, book, reason).await
            }
            Reconciliation::Resolved(meta) => {
                let meta = self.normalize(meta);
                self.place(id, book, meta).await
            }
        }
    }

    async fn place(
        &self,
        id: i64,
        book: &BookFile,
        meta: ResolvedMetadata,
    ) -> std::result::Result<(), LedgerError> {
        let entry = CanonicalEntry {
            record_id: Some(id),
            fingerprint: book.fingerprint.clone(),
            signature: meta.signature(),
            confidence: meta.confidence,
            size: book.size,
            discovery_index: Some(book.discovery_index),
            path: book.path.clone(),
        };
        let check = self.detector.check(&entry).await;
        self.ledger.advance(id, Stage::Checked).await?;

        match check {
            DuplicateCheck::Duplicate { reason, canonical } => {
                info!(canonical = %canonical.path.display(), reason = %reason, "duplicate");
                self.finish_duplicate(id, book, reason, meta).await
            }
            DuplicateCheck::Pass(guard) => {
                self.organize_file(id, book, meta, entry, &[], &guard).await
            }
            DuplicateCheck::Displace { displaced, guard } => {
                let mut moved = Vec::with_capacity(displaced.len());
                for found in &displaced {
                    if !self.displace(&found.incumbent, found.reason).await? {
                        // The stuck incumbent keeps its slot; this file becomes its duplicate.
                        self.detector.release(&moved);
                        return self.finish_duplicate(id, book, found.reason, meta).await;
                    }
                    moved.push(found.incumbent.clone());
                }
                self.organize_file(id, book, meta, entry, &moved, &guard)
                    .await
            }
        }
    }

    /// Moves a displaced canonical file to the duplicates area and demotes its record.
    async fn displace(
        &self,
        incumbent: &CanonicalEntry,
        reason: ReasonCode,
    ) -> std::result::Result<bool, LedgerError> {
        let target = match self
            .move_into(
                &incumbent.path,
                &self.config.duplicates_dir(),
                &file_name(&incumbent.path),
            )
            .await
        {
            Ok(target) => target,
            Err(error) => {
                warn!(path = %incumbent.path.display(), error = %error, "could not displace canonical file");
                return Ok(false);
            }
        };
        self.planner.release(&incumbent.path);
        if let Some(record_id) = incumbent.record_id {
            self.ledger.demote(record_id, &target, reason).await?;
        }
        info!(
            displaced = %incumbent.path.display(),
            to = %target.display(),
            reason = %reason,
            "canonical file displaced by a better copy"
        );
        Ok(true)
    }

    async fn organize_file(
        &self,
        id: i64,
        book: &BookFile,
        meta: ResolvedMetadata,
        mut entry: CanonicalEntry,
        displaced: &[CanonicalEntry],
        guard: &BucketGuard,
    ) -> std::result::Result<(), LedgerError> {
        let planned = match self.planner.plan(&meta, book) {
            Ok(PlanOutcome::Planned(planned)) => planned,
            Ok(PlanOutcome::AlreadyPresent(existing)) => {
                info!(existing = %existing.display(), "identical file already in library");
                self.detector.release(displaced);
                return self
                    .finish_duplicate(id, book, ReasonCode::IdenticalBytes, meta)
                    .await;
            }
            Err(error) => {
                warn!(error = %error, "no destination available");
                self.detector.release(displaced);
                return self.finish_move_failed(id).await;
            }
        };
        self.ledger.advance(id, Stage::Planned).await?;

        if !self.config.dry_run
            && let Err(error) = relocate(&book.path, &planned.path).await
        {
            warn!(destination = %planned.path.display(), error = %error, "move failed");
            self.planner.release(&planned.path);
            self.detector.release(displaced);
            return self.finish_move_failed(id).await;
        }

        entry.path.clone_from(&planned.path);
        self.ledger
            .finalize(
                id,
                &Outcome::organized(planned.path.clone(), meta, planned.cover.clone()),
            )
            .await?;
        self.detector.claim(entry, displaced, guard);
        info!(destination = %planned.path.display(), "organized");
        Ok(())
    }

    async fn finish_duplicate(
        &self,
        id: i64,
        book: &BookFile,
        reason: ReasonCode,
        meta: ResolvedMetadata,
    ) -> std::result::Result<(), LedgerError> {
        let duplicates = self.config.duplicates_dir();
        match self.move_into(&book.path, &duplicates, &file_name(&book.path)).await {
            Ok(target) => {
                self.ledger
                    .finalize(id, &Outcome::duplicate(Some(target), reason, meta))
                    .await
            }
            Err(error) => {
                warn!(error = %error, "could not move duplicate");
                self.finish_move_failed(id).await
            }
        }
    }

    async fn finish_unlocated(
        &self,
        id: i64,
        book: &BookFile,
        reason: ReasonCode,
    ) -> std::result::Result<(), LedgerError> {
        let name = heuristics::unlocated_name(&book.stem(), &book.extension());
        match self.move_into(&book.path, &self.config.unlocated_dir(), &name).await {
            Ok(target) => {
                info!(reason = %reason, to = %target.display(), "unlocated");
                self.ledger
                    .finalize(id, &Outcome::unlocated(Some(target), reason))
                    .await
            }
            Err(error) => {
                warn!(error = %error, "could not move unlocated file");
                self.finish_move_failed(id).await
            }
        }
    }

    async fn finish_move_failed(&self, id: i64) -> std::result::Result<(), LedgerError> {
        self.ledger
            .finalize(id, &Outcome::unlocated(None, ReasonCode::MoveFailed))
            .await
    }

    /// Reserves `dir/name` (suffixed if taken) and moves `from` there.
    ///
    /// A file already inside `dir` stays where it is.
    async fn move_into(&self, from: &Path, dir: &Path, name: &str) -> io::Result<PathBuf> {
        if from.parent() == Some(dir) {
            return Ok(from.to_path_buf());
        }
        let target = self.planner.reserve_in(dir, name).map_err(io::Error::other)?;
        if self.config.dry_run {
            return Ok(target);
        }
        if let Err(error) = relocate(from, &target).await {
            self.planner.release(&target);
            return Err(error);
        }
        Ok(target)
    }

    fn normalize(&self, mut meta: ResolvedMetadata) -> ResolvedMetadata {
        if !self.config.normalize_text {
            return meta;
        }
        let normalized = |value: &str| {
            let display = text::normalize_display(value);
            if display.trim().is_empty() {
                value.to_string()
            } else {
                display
            }
        };
        meta.title = normalized(&meta.title);
        meta.authors = meta.authors.iter().map(|a| normalized(a)).collect();
        meta
    }

    /// An unlocated record not yet superseded, plus where its file is now.
    async fn adjustable(&self, id: i64) -> Result<(ProcessingRecord, PathBuf)> {
        let record = self
            .ledger
            .get(id)
            .await?
            .ok_or(LedgerError::RecordNotFound(id))?;
        let open = self.ledger.unlocated().await?.iter().any(|r| r.id == id);
        if !open {
            return Err(PipelineError::not_adjustable(id, record.status()));
        }
        let path = record
            .final_path
            .as_deref()
            .map_or_else(|| PathBuf::from(&record.source_path), PathBuf::from);
        if !path.is_file() {
            return Err(PipelineError::FileMissing { id, path });
        }
        Ok((record, path))
    }
}

fn prior_canonical(record: ProcessingRecord) -> Option<CanonicalEntry> {
    let path = PathBuf::from(record.final_path?);
    if !path.is_file() {
        return None;
    }
    Some(CanonicalEntry {
        record_id: Some(record.id),
        fingerprint: record.fingerprint?,
        signature: record.signature.map(QuerySignature::from_stored),
        confidence: record.confidence.unwrap_or_default(),
        size: u64::try_from(record.size_bytes).unwrap_or_default(),
        discovery_index: None,
        path,
    })
}

async fn inspect_for_record(record: &ProcessingRecord, path: &Path) -> Result<BookFile> {
    let index = usize::try_from(record.discovery_index).unwrap_or_default();
    BookFile::inspect(path, index)
        .await
        .map_err(|_| PipelineError::FileMissing {
            id: record.id,
            path: path.to_path_buf(),
        })
}

fn unhashed_book(file: &DiscoveredFile, size: u64) -> BookFile {
    BookFile {
        path: file.path.clone(),
        format: BookFormat::from_path(&file.path),
        size,
        fingerprint: String::new(),
        discovery_index: file.index,
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unnamed".to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::fs;

    use super::*;
    use crate::ledger::RecordStatus;
    use crate::resolver::ResolverPriority;
    use crate::resolver::registry::tests::StubResolver;

    fn registry_answering(candidates: Vec<CandidateMetadata>) -> ResolverRegistry {
        let mut registry = ResolverRegistry::new();
        registry.register(Box::new(StubResolver::answering(
            "stub",
            ResolverPriority::Primary,
            candidates,
        )));
        registry
    }

    async fn pipeline(src: &Path, dest: &Path, registry: ResolverRegistry) -> Pipeline {
        let db = Database::new_in_memory().await.unwrap();
        let config = Config::new(dest).with_source(src);
        Pipeline::new(config, db, registry).unwrap()
    }

    #[tokio::test]
    async fn test_new_rejects_invalid_settings() {
        let db = Database::new_in_memory().await.unwrap();
        let config = Config::new("/lib").with_concurrency(0);
        assert!(matches!(
            Pipeline::new(config, db, ResolverRegistry::new()),
            Err(PipelineError::Config(ConfigError::InvalidConcurrency { value: 0 }))
        ));
    }

    #[tokio::test]
    async fn test_excluded_extension_is_recorded_and_left_in_place() {
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        fs::write(src.path().join("setup.exe"), b"MZ").unwrap();

        let pipeline = pipeline(src.path(), dest.path(), ResolverRegistry::new()).await;
        let stats = pipeline.organize().await.unwrap();

        assert_eq!(stats.excluded, 1);
        assert!(src.path().join("setup.exe").exists());
        let records = pipeline.ledger().snapshot().await.unwrap();
        assert_eq!(records[0].reason_code(), Some(ReasonCode::UnsupportedFileType));
    }

    #[tokio::test]
    async fn test_normalization_applies_to_title_and_author() {
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        fs::write(src.path().join("JANE DOE - MY BOOK (2019).epub"), b"not a zip").unwrap();

        let registry = registry_answering(vec![
            CandidateMetadata::new(SourceTag::PrimaryApi, 0.9)
                .with_title("MY BOOK")
                .with_author("JANE DOE")
                .with_year(Some(2019)),
        ]);
        let db = Database::new_in_memory().await.unwrap();
        let config = Config::new(dest.path())
            .with_source(src.path())
            .with_text_normalization(true);
        let pipeline = Pipeline::new(config, db, registry).unwrap();
        let stats = pipeline.organize().await.unwrap();

        assert_eq!(stats.organized, 1);
        let record = &pipeline.ledger().snapshot().await.unwrap()[0];
        assert_eq!(record.title.as_deref(), Some("My Book"));
        assert_eq!(record.author.as_deref(), Some("Jane Doe"));
        assert!(
            dest.path()
                .join("Jane Doe/Jane Doe - My Book (2019).epub")
                .exists()
        );
    }

    #[tokio::test]
    async fn test_dry_run_records_without_moving() {
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        fs::write(src.path().join("Jane Doe - My Book (2019).epub"), b"book").unwrap();

        let registry = registry_answering(vec![
            CandidateMetadata::new(SourceTag::PrimaryApi, 0.9)
                .with_title("My Book")
                .with_author("Jane Doe")
                .with_year(Some(2019)),
        ]);
        let db = Database::new_in_memory().await.unwrap();
        let config = Config::new(dest.path())
            .with_source(src.path())
            .with_dry_run(true);
        let pipeline = Pipeline::new(config, db, registry).unwrap();
        let stats = pipeline.organize().await.unwrap();

        assert_eq!(stats.organized, 1);
        assert!(src.path().join("Jane Doe - My Book (2019).epub").exists());
        assert!(!dest.path().join("Jane Doe").exists());
        let record = &pipeline.ledger().snapshot().await.unwrap()[0];
        assert!(
            record
                .final_path
                .as_deref()
                .unwrap()
                .ends_with("Jane Doe - My Book (2019).epub")
        );
    }

    #[tokio::test]
    async fn test_cancelled_token_dispatches_nothing() {
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        fs::write(src.path().join("a.epub"), b"a").unwrap();

        let pipeline = pipeline(src.path(), dest.path(), ResolverRegistry::new()).await;
        pipeline.cancellation_token().cancel();
        let stats = pipeline.organize().await.unwrap();
        assert_eq!(stats.total(), 0);
        assert!(src.path().join("a.epub").exists());
    }

    #[tokio::test]
    async fn test_exclude_moves_unlocated_file() {
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        fs::write(src.path().join("scan_0001.pdf"), b"%PDF-1.4 nothing").unwrap();

        let pipeline = pipeline(src.path(), dest.path(), ResolverRegistry::new()).await;
        pipeline.organize().await.unwrap();
        let open = pipeline.unlocated().await.unwrap();
        assert_eq!(open.len(), 1);

        let excluded = pipeline.exclude(open[0].id).await.unwrap();
        assert_eq!(excluded.status(), Some(RecordStatus::Excluded));
        assert_eq!(excluded.reason_code(), Some(ReasonCode::ExcludedByUser));
        assert_eq!(excluded.corrects, Some(open[0].id));
        assert!(Path::new(excluded.final_path.as_deref().unwrap()).exists());
        assert!(pipeline.unlocated().await.unwrap().is_empty());

        assert!(matches!(
            pipeline.exclude(open[0].id).await,
            Err(PipelineError::NotAdjustable { .. })
        ));
    }

    #[tokio::test]
    async fn test_correction_requires_title_and_author() {
        let dest = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dest.path(), dest.path(), ResolverRegistry::new()).await;
        let candidate = CandidateMetadata::new(SourceTag::Manual, 1.0).with_title("Only Title");
        assert!(matches!(
            pipeline.correct(1, candidate).await,
            Err(PipelineError::IncompleteCorrection)
        ));
    }
}
