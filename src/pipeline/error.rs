//! Errors that stop a pipeline command.
//!
//! Per-file failures never surface here; they end up as ledger
//! classifications instead.

use std::path::PathBuf;

use thiserror::Error;

use crate::cache::CacheError;
use crate::config::ConfigError;
use crate::db::DbError;
use crate::ledger::{LedgerError, RecordStatus};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cannot open library database: {0}\n  Suggestion: Check that no other bookshelf process is using this library")]
    Database(#[from] DbError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("cannot scan source folder {path}: {reason}\n  Suggestion: Check folder permissions")]
    Discovery { path: PathBuf, reason: String },

    /// Manual changes only apply to unlocated records not yet superseded.
    #[error("record {id} cannot be changed manually (status: {status})\n  Suggestion: Run 'bookshelf unlocated <DEST>' to list records awaiting correction")]
    NotAdjustable { id: i64, status: String },

    #[error("file for record {id} is missing: {path}\n  Suggestion: Restore the file or exclude the record")]
    FileMissing { id: i64, path: PathBuf },

    #[error("manual metadata needs a title and an author\n  Suggestion: Pass both --title and --author")]
    IncompleteCorrection,

    #[error("semaphore closed unexpectedly")]
    SemaphoreClosed,
}

impl PipelineError {
    pub(crate) fn not_adjustable(id: i64, status: Option<RecordStatus>) -> Self {
        Self::NotAdjustable {
            id,
            status: status.map_or_else(|| "in progress".to_string(), |s| s.to_string()),
        }
    }
}
