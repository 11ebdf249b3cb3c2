//! Bookshelf Core Library
//!
//! Resolves bibliographic metadata for a batch of ebook files and uses it to
//! rename, deduplicate and relocate each file into an organized library.
//!
//! # Architecture
//!
//! The library is organized into the following modules, leaves first:
//! - [`metadata`] - Book files, candidates, resolved records and query signatures
//! - [`format`] - Embedded metadata per container format
//! - [`heuristics`] - Title/author/year guesses from bare filenames
//! - [`cache`] - Persistent lookup cache keyed by query signature
//! - [`resolver`] - Remote catalogues (Google Books, Open Library) behind one trait
//! - [`reconcile`] - Merges candidates into one confidence-scored resolution
//! - [`dedup`] - Content and identity duplicate detection
//! - [`planner`] - Destination folders, canonical names and uniqueness
//! - [`ledger`] - Persisted per-file processing records, logs and index
//! - [`pipeline`] - The concurrent organize run and manual corrections
//! - [`db`] - Database connection and schema management
//! - [`config`] - Run configuration and pre-flight validation

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod config;
pub mod db;
pub mod dedup;
pub mod format;
pub mod heuristics;
pub mod ledger;
pub mod metadata;
pub mod pipeline;
pub mod planner;
pub mod reconcile;
pub mod resolver;
#[cfg(test)]
pub mod test_support;
pub(crate) mod user_agent;

// Re-export commonly used types
pub use cache::{CacheError, LookupCache};
pub use config::{Config, ConfigError, DEFAULT_CONCURRENCY, SpecialDirs};
pub use db::{Database, DbError, DbErrorKind};
pub use dedup::{CanonicalEntry, Displaced, DuplicateCheck, DuplicateDetector};
pub use format::{ReadError, ReadOutcome, read_embedded};
pub use heuristics::parse_filename;
pub use ledger::{
    Ledger, LedgerError, Outcome, ProcessingRecord, ReasonCode, RecordStatus, Stage,
};
pub use metadata::{
    BookFile, BookFormat, CandidateMetadata, FieldProvenance, QuerySignature, ResolvedMetadata,
    SourceTag,
};
pub use pipeline::{Pipeline, PipelineError, RunStats};
pub use planner::{
    NamingPattern, OrganizationMode, PathPlanner, PlanError, PlanOutcome, PlannedPath,
};
pub use reconcile::{ReconcilePolicy, Reconciliation, SourceWeights, reconcile};
pub use resolver::{
    BookQuery, ConnectivityReport, GoogleBooksResolver, LookupOutcome, MetadataLookup,
    OpenLibraryResolver, ResolveError, Resolver, ResolverPriority, ResolverRegistry,
    build_default_resolver_registry, configure_resolver_http_timeouts,
};
