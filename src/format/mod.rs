//! Embedded metadata extraction per container format.
//!
//! Reading is best-effort: a corrupt, truncated or encrypted file yields an
//! empty candidate set plus a [`ReadError`] diagnostic, never an `Err` that
//! would stop the run. Parsing is synchronous and runs on the blocking pool
//! via [`read_embedded`].
//!
//! Confidence depends on what a container yields:
//!
//! | Fields found       | Confidence |
//! |--------------------|------------|
//! | title + author     | 0.6        |
//! | title only         | 0.45       |
//! | ISBN only          | 0.3        |
//! | first-page text    | 0.25       |

mod epub;
mod error;
mod mobi;
mod office;
mod pdf;
mod plain;
pub mod scan;
mod xml;

use std::path::Path;

use tracing::{debug, instrument, warn};

pub use error::ReadError;

use crate::metadata::{BookFile, BookFormat, CandidateMetadata, SourceTag, text};

/// Confidence for a container that names both title and author.
pub const CONFIDENCE_TITLE_AUTHOR: f64 = 0.6;
/// Confidence for a container that names only a title.
pub const CONFIDENCE_TITLE_ONLY: f64 = 0.45;
/// Confidence for an ISBN with no other fields.
pub const CONFIDENCE_ISBN_ONLY: f64 = 0.3;
/// Confidence for a title guessed from the first page of text.
pub const CONFIDENCE_FIRST_PAGE: f64 = 0.25;

/// Bytes of a PDF scanned for ISBNs.
pub const PDF_ISBN_SCAN_BYTES: usize = 100 * 1024;
/// Bytes of any other format scanned for ISBNs.
pub const GENERIC_ISBN_SCAN_BYTES: usize = 50 * 1024;

/// Result of reading one file's embedded metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadOutcome {
    /// Candidates tagged [`SourceTag::Embedded`].
    pub candidates: Vec<CandidateMetadata>,
    /// Non-fatal problems met while reading.
    pub diagnostics: Vec<ReadError>,
}

impl ReadOutcome {
    fn failed(error: ReadError) -> Self {
        Self {
            candidates: Vec::new(),
            diagnostics: vec![error],
        }
    }
}

/// Raw fields pulled out of a container before confidence is assigned.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct EmbeddedFields {
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub year: Option<i32>,
    pub genre: Option<String>,
    pub isbn: Option<String>,
}

impl EmbeddedFields {
    /// Applies the confidence table; returns nothing when no usable field was found.
    pub(crate) fn into_candidate(self) -> Option<CandidateMetadata> {
        let title = self.title.map(|t| text::normalize_spaces(&t)).unwrap_or_default();
        let has_author = self.authors.iter().any(|a| !a.trim().is_empty());
        let isbn = self.isbn.as_deref().and_then(crate::metadata::isbn::normalize);

        let confidence = match (title.is_empty(), has_author, isbn.is_some()) {
            (false, true, _) => CONFIDENCE_TITLE_AUTHOR,
            (false, false, _) => CONFIDENCE_TITLE_ONLY,
            (true, _, true) => CONFIDENCE_ISBN_ONLY,
            (true, _, false) => return None,
        };

        Some(
            CandidateMetadata::new(SourceTag::Embedded, confidence)
                .with_title(title)
                .with_authors(self.authors)
                .with_year(self.year)
                .with_genre(self.genre)
                .with_isbn(isbn.as_deref()),
        )
    }
}

/// Reads embedded metadata for a discovered file on the blocking pool.
#[instrument(skip(book), fields(path = %book.path.display(), format = %book.format))]
pub async fn read_embedded(book: &BookFile) -> ReadOutcome {
    let path = book.path.clone();
    let format = book.format;
    match tokio::task::spawn_blocking(move || read_embedded_blocking(&path, format)).await {
        Ok(outcome) => outcome,
        Err(join_error) => {
            warn!(error = %join_error, "metadata reader task failed");
            ReadOutcome::failed(ReadError::unreadable(
                &book.path,
                book.format.as_str(),
                join_error.to_string(),
            ))
        }
    }
}

/// Synchronous reader used by [`read_embedded`].
#[must_use]
pub fn read_embedded_blocking(path: &Path, format: BookFormat) -> ReadOutcome {
    let result = match format {
        BookFormat::Epub => epub::read(path),
        BookFormat::Docx => office::read(path),
        BookFormat::Mobi | BookFormat::Azw3 => mobi::read(path),
        BookFormat::Pdf => pdf::read(path),
        BookFormat::Djvu => read_isbn_only(path, format),
        BookFormat::Other => match extension_of(path).as_str() {
            "fb2" => plain::read_fb2(path),
            "txt" => plain::read_text(path),
            _ => read_isbn_only(path, format),
        },
    };

    match result {
        Ok(candidates) => {
            debug!(count = candidates.len(), "embedded candidates read");
            ReadOutcome {
                candidates,
                diagnostics: Vec::new(),
            }
        }
        Err(error) => {
            warn!(error = %error, code = error.code(), "embedded metadata unavailable");
            ReadOutcome::failed(error)
        }
    }
}

fn read_isbn_only(path: &Path, format: BookFormat) -> Result<Vec<CandidateMetadata>, ReadError> {
    let isbns = scan::scan_file_head(path, GENERIC_ISBN_SCAN_BYTES)
        .map_err(|e| ReadError::unreadable(path, format.as_str(), e.to_string()))?;
    Ok(EmbeddedFields {
        isbn: isbns.into_iter().next(),
        ..EmbeddedFields::default()
    }
    .into_candidate()
    .into_iter()
    .collect())
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

/// First plausible four-digit year in a date-like string (`2019-05-01`, `D:20190501`).
pub(crate) fn year_from_date(value: &str) -> Option<i32> {
    let digits: Vec<char> = value.chars().collect();
    digits.windows(4).enumerate().find_map(|(i, window)| {
        let bounded_left = i == 0 || !digits[i - 1].is_ascii_digit();
        if !bounded_left || !window.iter().all(char::is_ascii_digit) {
            return None;
        }
        let year: i32 = window.iter().collect::<String>().parse().ok()?;
        text::is_plausible_year(year).then_some(year)
    })
}
