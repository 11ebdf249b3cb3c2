//! FB2 title-info and plain-text first-page guesses.

use std::path::Path;

use super::scan::{read_head_lossy, scan_isbns};
use super::xml::{first_block, first_element};
use super::{
    CONFIDENCE_FIRST_PAGE, EmbeddedFields, GENERIC_ISBN_SCAN_BYTES, ReadError, year_from_date,
};
use crate::metadata::{CandidateMetadata, SourceTag, text};

/// FB2 keeps `<description>` at the top; this covers it with room to spare.
const FB2_HEAD_BYTES: usize = 256 * 1024;
/// Lines examined when guessing a title from plain text.
const FIRST_PAGE_LINES: usize = 40;

pub(super) fn read_fb2(path: &Path) -> Result<Vec<CandidateMetadata>, ReadError> {
    let head = read_head_lossy(path, FB2_HEAD_BYTES)
        .map_err(|e| ReadError::unreadable(path, "fb2", e.to_string()))?;
    let Some(title_info) = first_block(&head, "title-info") else {
        return Err(ReadError::unreadable(path, "fb2", "no <title-info> block"));
    };

    let authors = author_blocks(title_info)
        .into_iter()
        .filter_map(|block| {
            let name = ["first-name", "middle-name", "last-name"]
                .iter()
                .filter_map(|tag| first_element(block, tag))
                .collect::<Vec<_>>()
                .join(" ");
            (!name.is_empty()).then_some(name)
        })
        .collect();

    let year = first_element(title_info, "year")
        .or_else(|| first_element(title_info, "date"))
        .or_else(|| first_block(&head, "publish-info").and_then(|p| first_element(p, "year")))
        .as_deref()
        .and_then(year_from_date);

    let fields = EmbeddedFields {
        title: first_element(title_info, "book-title"),
        authors,
        year,
        genre: first_element(title_info, "genre"),
        isbn: scan_isbns(&head).into_iter().next(),
    };
    Ok(fields.into_candidate().into_iter().collect())
}

fn author_blocks(title_info: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = title_info;
    while let Some(block) = first_block(rest, "author") {
        blocks.push(block);
        let Some(close) = rest.find("</author>") else {
            break;
        };
        rest = &rest[close + "</author>".len()..];
    }
    blocks
}

pub(super) fn read_text(path: &Path) -> Result<Vec<CandidateMetadata>, ReadError> {
    let head = read_head_lossy(path, GENERIC_ISBN_SCAN_BYTES)
        .map_err(|e| ReadError::unreadable(path, "txt", e.to_string()))?;

    let isbn = scan_isbns(&head).into_iter().next();
    let title = first_plausible_line(&head);

    let candidate = match (title, isbn) {
        (Some(title), isbn) => Some(
            CandidateMetadata::new(SourceTag::Embedded, CONFIDENCE_FIRST_PAGE)
                .with_title(title)
                .with_isbn(isbn.as_deref()),
        ),
        (None, isbn) => EmbeddedFields {
            isbn,
            ..EmbeddedFields::default()
        }
        .into_candidate(),
    };
    Ok(candidate.into_iter().collect())
}

/// First short line that reads like a heading rather than prose or boilerplate.
fn first_plausible_line(body: &str) -> Option<String> {
    body.lines()
        .take(FIRST_PAGE_LINES)
        .map(text::normalize_spaces)
        .find(|line| {
            let letters = line.chars().filter(|c| c.is_alphabetic()).count();
            let lower = line.to_lowercase();
            (3..=120).contains(&line.chars().count())
                && letters >= 3
                && !line.ends_with(['.', ',', ';'])
                && !lower.contains("project gutenberg")
                && !lower.contains("copyright")
                && !lower.starts_with("isbn")
        })
}
