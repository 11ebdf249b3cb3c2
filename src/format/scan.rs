//! Raw ISBN scanning over file bytes.

use std::io::Read;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::metadata::isbn;

/// `ISBN`, `ISBN-10:`, `ISBN 13` and similar labels followed by a digit run.
#[allow(clippy::expect_used)]
static LABELED_ISBN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)ISBN[-]*(?:1[03])?:?\s*([0-9X][0-9X-]{9,16})").expect("labeled ISBN regex is valid")
});

/// Bare hyphenated ISBN-13 runs such as `978-0-306-40615-7`.
#[allow(clippy::expect_used)]
static BARE_ISBN13: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(97[89]-?\d{1,5}-?\d{1,7}-?\d{1,6}-?\d)\b").expect("bare ISBN regex is valid")
});

/// Returns every distinct valid ISBN in `text`, labeled hits first.
#[must_use]
pub fn scan_isbns(text: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    let hits = LABELED_ISBN
        .captures_iter(text)
        .chain(BARE_ISBN13.captures_iter(text))
        .filter_map(|cap| cap.get(1));

    for hit in hits {
        let raw = hit.as_str().trim_end_matches('-');
        let Some(valid) = isbn::normalize(raw).or_else(|| trim_overrun(raw)) else {
            continue;
        };
        if !found.contains(&valid) {
            found.push(valid);
        }
    }
    found
}

/// Reads up to `limit` bytes from the start of a file and scans them.
///
/// # Errors
///
/// Returns an IO error if the file cannot be opened or read.
pub fn scan_file_head(path: &Path, limit: usize) -> std::io::Result<Vec<String>> {
    Ok(scan_isbns(&read_head_lossy(path, limit)?))
}

/// Reads up to `limit` bytes and decodes them as lossy UTF-8.
///
/// # Errors
///
/// Returns an IO error if the file cannot be opened or read.
pub fn read_head_lossy(path: &Path, limit: usize) -> std::io::Result<String> {
    let file = std::fs::File::open(path)?;
    let mut buffer = Vec::with_capacity(limit.min(1024 * 1024));
    file.take(limit as u64).read_to_end(&mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

// A labeled run can swallow trailing digits from the next token; retry on
// the leading 13 and 10 significant characters.
fn trim_overrun(raw: &str) -> Option<String> {
    let compact: String = raw.chars().filter(|c| *c != '-').collect();
    [13, 10]
        .into_iter()
        .filter(|len| compact.len() > *len)
        .find_map(|len| isbn::normalize(&compact[..len]))
}
