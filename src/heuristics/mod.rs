//! Title/author/year guesses from a bare filename.
//!
//! Rules are tried in order and the first that yields a plausible
//! title/author split wins:
//!
//! 1. `Title (Author)` on the lightly cleaned stem
//! 2. `Author - Title` / `Title - Author`, orientation by [`looks_like_author`]
//! 3. the same split on an aggressively cleaned stem, plus `Title by Author`
//! 4. `Short Name - Longer Title` when the left part is three words or fewer
//!
//! A stem that survives none of these yields no candidate rather than a guess.

mod cleanup;
mod year;

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, instrument};

pub use cleanup::{basic_clean, deep_clean, strip_years, unlocated_name};
pub use year::extract_year;

use crate::metadata::{CandidateMetadata, SourceTag};

/// Confidence of a filename candidate that includes a year.
pub const FILENAME_CONFIDENCE: f64 = 0.4;
/// Confidence of a filename candidate without a year.
pub const FILENAME_CONFIDENCE_NO_YEAR: f64 = 0.3;

#[allow(clippy::expect_used)]
static TITLE_PAREN_AUTHOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.+?)\s*[\(\[]([^\)\]]+)[\)\]]").expect("title (author) regex is valid")
});

#[allow(clippy::expect_used)]
static TITLE_BY_AUTHOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(.+?)\s+(?:by|por)\s+(.+)$").expect("title by author regex is valid")
});

const SEPARATOR: &str = " - ";

/// Words that never appear in an author name taken from a filename.
const JUNK_WORDS: &[&str] = &[
    "com", "net", "org", "pdf", "epub", "mobi", "azw3", "djvu", "docx", "txt", "ebook", "documento",
    "texto", "scan", "retail",
];

/// Function words that mark a phrase as a title rather than a name.
const TITLE_WORDS: &[&str] = &[
    "the", "of", "and", "a", "an", "in", "on", "to", "for", "with", "how", "why", "what", "from",
];

/// Guesses a candidate from a filename stem (no directory, no extension).
#[instrument(level = "debug")]
#[must_use]
pub fn parse_filename(stem: &str) -> Option<CandidateMetadata> {
    let year = extract_year(stem);
    let basic = basic_clean(stem);

    let split = split_title_paren_author(&basic)
        .or_else(|| split_on_separator(&basic))
        .or_else(|| {
            let deep = deep_clean(stem);
            split_on_separator(&deep)
                .or_else(|| split_title_by_author(&deep))
                .or_else(|| split_short_author(&deep))
        });

    let Some((title, author)) = split else {
        debug!("no title/author split");
        return None;
    };
    let title = strip_years(&title);
    let author = strip_years(&author);
    if title.is_empty() || author.is_empty() {
        return None;
    }

    let confidence = if year.is_some() {
        FILENAME_CONFIDENCE
    } else {
        FILENAME_CONFIDENCE_NO_YEAR
    };
    Some(
        CandidateMetadata::new(SourceTag::Filename, confidence)
            .with_title(title)
            .with_author(author)
            .with_year(year),
    )
}

fn split_title_paren_author(text: &str) -> Option<(String, String)> {
    let cap = TITLE_PAREN_AUTHOR.captures(text)?;
    let title = cap[1].trim();
    let author = cap[2].trim();
    (looks_like_title(title) && looks_like_author(author))
        .then(|| (title.to_string(), author.to_string()))
}

fn split_on_separator(text: &str) -> Option<(String, String)> {
    let (left, right) = text.split_once(SEPARATOR)?;
    let (left, right) = (left.trim(), right.trim());
    let left_bare = strip_years(left);
    let right_bare = strip_years(right);

    if looks_like_author(&left_bare) && looks_like_title(&right_bare) {
        return Some((right.to_string(), left.to_string()));
    }
    if looks_like_title(&left_bare) && looks_like_author(&right_bare) {
        return Some((left.to_string(), right.to_string()));
    }
    None
}

fn split_title_by_author(text: &str) -> Option<(String, String)> {
    let cap = TITLE_BY_AUTHOR.captures(text)?;
    let title = cap[1].trim();
    let author = cap[2].trim();
    (looks_like_title(title) && looks_like_author(&strip_years(author)))
        .then(|| (title.to_string(), author.to_string()))
}

fn split_short_author(text: &str) -> Option<(String, String)> {
    let (left, right) = text.split_once(SEPARATOR)?;
    let (left, right) = (left.trim(), right.trim());
    let left_words = left.split_whitespace().count();
    let right_words = right.split_whitespace().count();
    (left_words > 0 && left_words <= 3 && right_words > 1)
        .then(|| (right.to_string(), left.to_string()))
}

/// Scores whether a phrase reads like a personal name.
#[must_use]
pub fn looks_like_author(text: &str) -> bool {
    let text = text.trim();
    if text.chars().count() < 3 || text.chars().any(|c| c.is_ascii_digit()) {
        return false;
    }
    let words: Vec<&str> = text.split_whitespace().collect();
    let lowered: Vec<String> = words
        .iter()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .collect();
    if lowered.iter().any(|w| JUNK_WORDS.contains(&w.as_str())) {
        return false;
    }
    if lowered.iter().all(|w| TITLE_WORDS.contains(&w.as_str())) {
        return false;
    }

    let mut score: i32 = 0;
    let alphabetic: Vec<&&str> = words
        .iter()
        .filter(|w| w.chars().all(char::is_alphabetic))
        .collect();
    if !alphabetic.is_empty()
        && alphabetic
            .iter()
            .all(|w| w.chars().next().is_some_and(char::is_uppercase))
    {
        score += 1;
    }
    if words.len() <= 4 {
        score += 1;
    }
    let meaningful = alphabetic.iter().filter(|w| w.chars().count() > 2).count();
    if meaningful >= 2 {
        score += 1;
    }
    let has_initial = words.iter().any(|w| {
        let mut chars = w.chars();
        matches!((chars.next(), chars.next(), chars.next()), (Some(c), Some('.'), None) if c.is_uppercase())
    });
    if has_initial || text.contains(',') {
        score += 1;
    }
    if lowered.iter().any(|w| TITLE_WORDS.contains(&w.as_str())) {
        score -= 2;
    }
    score >= 3
}

/// Accepts phrases of reasonable length that are not bare numbers or shouting.
#[must_use]
pub fn looks_like_title(text: &str) -> bool {
    let text = text.trim();
    let len = text.chars().count();
    if !(3..=150).contains(&len) || text.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    let has_lower = text.chars().any(char::is_lowercase);
    let has_upper = text.chars().any(char::is_uppercase);
    if has_upper && !has_lower && len > 8 {
        return false;
    }
    let words = text.split_whitespace().count();
    words >= 2 || len > 4
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_author_dash_title_with_year() {
        let c = parse_filename("Jane Doe - My Book (2019)").unwrap();
        assert_eq!(c.title, "My Book");
        assert_eq!(c.authors, vec!["Jane Doe"]);
        assert_eq!(c.year, Some(2019));
        assert_eq!(c.source, SourceTag::Filename);
        assert_eq!(c.confidence, FILENAME_CONFIDENCE);
    }

    #[test]
    fn test_title_dash_author_without_year() {
        let c = parse_filename("The Great Gatsby - Francis Scott Fitzgerald").unwrap();
        assert_eq!(c.title, "The Great Gatsby");
        assert_eq!(c.primary_author(), "Francis Scott Fitzgerald");
        assert_eq!(c.year, None);
        assert_eq!(c.confidence, FILENAME_CONFIDENCE_NO_YEAR);
    }

    #[test]
    fn test_title_paren_author() {
        let c = parse_filename("Moby Dick (Herman Melville)").unwrap();
        assert_eq!(c.title, "Moby Dick");
        assert_eq!(c.primary_author(), "Herman Melville");
    }

    #[test]
    fn test_title_by_author() {
        let c = parse_filename("Dracula by Bram Stoker").unwrap();
        assert_eq!(c.title, "Dracula");
        assert_eq!(c.primary_author(), "Bram Stoker");
    }

    #[test]
    fn test_junk_is_removed_before_split() {
        let c = parse_filename("Jane_Doe_-_My_Book_(z-library)").unwrap();
        assert_eq!(c.title, "My Book");
        assert_eq!(c.primary_author(), "Jane Doe");
    }

    #[test]
    fn test_unicode_dash_separator() {
        let c = parse_filename("J. K. Rowling \u{2014} Quidditch Through the Ages").unwrap();
        assert_eq!(c.primary_author(), "J. K. Rowling");
        assert_eq!(c.title, "Quidditch Through the Ages");
    }

    #[test]
    fn test_unparseable_yields_nothing() {
        assert!(parse_filename("scan0001").is_none());
        assert!(parse_filename("document (1)").is_none());
        assert!(parse_filename("").is_none());
    }

    #[test]
    fn test_confidence_never_exceeds_cap() {
        for stem in [
            "Jane Doe - My Book (2019)",
            "Moby Dick (Herman Melville)",
            "Dracula by Bram Stoker",
        ] {
            let c = parse_filename(stem).unwrap();
            assert!(c.confidence <= FILENAME_CONFIDENCE);
        }
    }

    #[test]
    fn test_looks_like_author() {
        assert!(looks_like_author("Jane Doe"));
        assert!(looks_like_author("Doe, Jane"));
        assert!(!looks_like_author("My Book"));
        assert!(!looks_like_author("The Great Gatsby"));
        assert!(!looks_like_author("Volume 2"));
        assert!(!looks_like_author("www pdf com"));
    }

    #[test]
    fn test_looks_like_title() {
        assert!(looks_like_title("My Book"));
        assert!(looks_like_title("Dracula"));
        assert!(!looks_like_title("12345"));
        assert!(!looks_like_title("ALL CAPS SHOUTING"));
        assert!(!looks_like_title("Ab"));
    }
}
