//! Processing log and library index files.
//!
//! Both files are semicolon-delimited with every field quoted. The processing
//! log grows by one block of rows per run; the library index is rewritten
//! from all organized records each time.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use csv::{QuoteStyle, WriterBuilder};
use tracing::{debug, instrument};

use super::{LedgerError, ProcessingRecord, RecordStatus, Result};

pub const LOG_FILE_NAME: &str = "processing_log.csv";
pub const INDEX_FILE_NAME: &str = "library_index.csv";

const LOG_HEADER: [&str; 11] = [
    "source_path",
    "final_path",
    "status",
    "title",
    "author",
    "year",
    "genre",
    "isbn",
    "confidence",
    "reason",
    "timestamp",
];

const INDEX_HEADER: [&str; 7] = [
    "title",
    "author",
    "year",
    "genre",
    "relative_path",
    "cover_relpath",
    "source",
];

/// Appends one row per finalized record to `<logs_dir>/processing_log.csv`.
///
/// The header is written only when the file is created.
///
/// # Errors
///
/// Returns [`LedgerError::Export`] when the file cannot be written.
#[instrument(skip(records), fields(rows = records.len()))]
pub fn append_processing_log(logs_dir: &Path, records: &[ProcessingRecord]) -> Result<PathBuf> {
    let path = logs_dir.join(LOG_FILE_NAME);
    fs::create_dir_all(logs_dir).map_err(|e| LedgerError::export(&path, e))?;
    let is_new = !path.exists();
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| LedgerError::export(&path, e))?;

    let mut writer = WriterBuilder::new()
        .delimiter(b';')
        .quote_style(QuoteStyle::Always)
        .from_writer(file);
    if is_new {
        writer
            .write_record(LOG_HEADER)
            .map_err(|e| LedgerError::export(&path, e))?;
    }
    for record in records {
        writer
            .write_record(log_row(record))
            .map_err(|e| LedgerError::export(&path, e))?;
    }
    writer.flush().map_err(|e| LedgerError::export(&path, e))?;

    debug!(path = %path.display(), "Processing log written");
    Ok(path)
}

/// Rewrites `<logs_dir>/library_index.csv` from the organized records.
///
/// Paths are written relative to `library_root` when they live under it.
///
/// # Errors
///
/// Returns [`LedgerError::Export`] when the file cannot be written.
#[instrument(skip(records), fields(rows = records.len()))]
pub fn write_library_index(
    logs_dir: &Path,
    library_root: &Path,
    records: &[ProcessingRecord],
) -> Result<PathBuf> {
    let path = logs_dir.join(INDEX_FILE_NAME);
    fs::create_dir_all(logs_dir).map_err(|e| LedgerError::export(&path, e))?;

    let mut writer = WriterBuilder::new()
        .delimiter(b';')
        .quote_style(QuoteStyle::Always)
        .from_path(&path)
        .map_err(|e| LedgerError::export(&path, e))?;
    writer
        .write_record(INDEX_HEADER)
        .map_err(|e| LedgerError::export(&path, e))?;

    for record in records
        .iter()
        .filter(|r| r.status() == Some(RecordStatus::Organized))
    {
        writer
            .write_record(index_row(record, library_root))
            .map_err(|e| LedgerError::export(&path, e))?;
    }
    writer.flush().map_err(|e| LedgerError::export(&path, e))?;
    Ok(path)
}

fn log_row(record: &ProcessingRecord) -> [String; 11] {
    [
        record.source_path.clone(),
        text(record.final_path.as_ref()),
        text(record.status_str.as_ref()),
        text(record.title.as_ref()),
        text(record.author.as_ref()),
        record.year.map(|y| y.to_string()).unwrap_or_default(),
        text(record.genre.as_ref()),
        text(record.isbn.as_ref()),
        record
            .confidence
            .map(|c| format!("{c:.2}"))
            .unwrap_or_default(),
        text(record.reason.as_ref()),
        record.updated_at.clone(),
    ]
}

fn index_row(record: &ProcessingRecord, library_root: &Path) -> [String; 7] {
    [
        text(record.title.as_ref()),
        text(record.author.as_ref()),
        record.year.map(|y| y.to_string()).unwrap_or_default(),
        text(record.genre.as_ref()),
        relative(record.final_path.as_deref(), library_root),
        relative(record.cover_path.as_deref(), library_root),
        title_source(record.provenance.as_deref()),
    ]
}

fn text(value: Option<&String>) -> String {
    value.cloned().unwrap_or_default()
}

fn relative(path: Option<&str>, root: &Path) -> String {
    let Some(path) = path else {
        return String::new();
    };
    let path = Path::new(path);
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}

/// Source of the title field from a `field:source,...` provenance summary.
fn title_source(provenance: Option<&str>) -> String {
    provenance
        .unwrap_or_default()
        .split(',')
        .find_map(|entry| entry.strip_prefix("title:"))
        .unwrap_or_default()
        .to_string()
}
