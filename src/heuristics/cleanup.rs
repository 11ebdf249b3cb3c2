//! Junk removal for filename stems.

use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::metadata::text::normalize_spaces;

#[allow(clippy::expect_used)]
static SITE_TAGS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\((?:z-library|z-lib|libgen(?:\.\w+)?|pdf|epub|pdfcoffee)\)|\bz-library\b|\bz-lib\b|\b\w*libgen\w*\b|\b\w*zlib\w*\b|reidoebook|livrosparatodos|pdf-free|pdfcoffee\.com",
    )
    .expect("site tag regex is valid")
});

#[allow(clippy::expect_used)]
static BRACKET_COUNTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\d{1,3}\]").expect("counter regex is valid"));

#[allow(clippy::expect_used)]
static WEB_ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:https?://)?www\.[\w-]+\.(?:com|org|net)(?:\.[a-z]{2})?")
        .expect("web address regex is valid")
});

#[allow(clippy::expect_used)]
static UNICODE_DASHES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\u{2010}-\u{2015}\u{2212}\u{2043}\u{FE63}\u{FF0D}]").expect("dash regex is valid")
});

#[allow(clippy::expect_used)]
static SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[+_]+").expect("separator regex is valid"));

#[allow(clippy::expect_used)]
static BRACKETED_GROUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\([^)]*\)|\[[^\]]*\]").expect("group regex is valid"));

#[allow(clippy::expect_used)]
static NOISE_TOKENS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b\d+[pk]\b|\.{2,}|\b(?:untitled|ebook|download|free)\b")
        .expect("noise token regex is valid")
});

#[allow(clippy::expect_used)]
static ISOLATED_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)\d+(?:\s|$)").expect("number regex is valid"));

#[allow(clippy::expect_used)]
static YEAR_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s*[\(\[]\s*\d{4}\s*[\)\]]|\s*[-,]?\s*\b\d{4}\s*$").expect("year token regex is valid")
});

/// Light cleanup: site tags, counters, web addresses, separators, unicode dashes.
///
/// Keeps bracketed groups, which may hold the author or the year.
#[must_use]
pub fn basic_clean(stem: &str) -> String {
    let text: String = stem
        .nfkc()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .collect();
    let text = UNICODE_DASHES.replace_all(&text, "-");
    let text = BRACKET_COUNTER.replace_all(&text, " ");
    let text = SITE_TAGS.replace_all(&text, " ");
    let text = WEB_ADDRESS.replace_all(&text, " ");
    let text = SEPARATORS.replace_all(&text, " ");
    trim_dashes(&normalize_spaces(&text))
}

/// Aggressive cleanup for a second segmentation pass: also drops every
/// bracketed group, page counts and isolated numbers.
#[must_use]
pub fn deep_clean(stem: &str) -> String {
    let text = basic_clean(stem);
    let text = BRACKETED_GROUP.replace_all(&text, " ");
    let text = NOISE_TOKENS.replace_all(&text, " ");
    let text = ISOLATED_NUMBER.replace_all(&text, " ");
    // A second pass catches numbers that shared a space with the previous match.
    let text = ISOLATED_NUMBER.replace_all(&text, " ");
    trim_dashes(&normalize_spaces(&text))
}

/// Removes `(YYYY)` groups and a trailing bare year from a title or author.
#[must_use]
pub fn strip_years(text: &str) -> String {
    trim_dashes(&normalize_spaces(&YEAR_TOKEN.replace_all(text, " ")))
}

/// Cleaned file name for the unlocated area: junk, bracketed groups and
/// years removed, extension kept (lowercased).
#[must_use]
pub fn unlocated_name(stem: &str, extension: &str) -> String {
    let basic = basic_clean(stem);
    let cleaned = BRACKETED_GROUP.replace_all(&basic, " ");
    let cleaned = YEAR_TOKEN.replace_all(&cleaned, " ");
    let kept: String = cleaned
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || matches!(c, '-' | '.'))
        .collect();
    let mut name = trim_dashes(&normalize_spaces(&kept));
    if name.chars().count() < 3 {
        name = normalize_spaces(&SEPARATORS.replace_all(stem, " "));
    }
    if name.is_empty() {
        name = "unnamed".to_string();
    }
    format!("{name}{}", extension.to_lowercase())
}

fn trim_dashes(text: &str) -> String {
    text.trim_matches(|c: char| c == '-' || c.is_whitespace())
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_clean_removes_site_tags_and_separators() {
        assert_eq!(
            basic_clean("Jane_Doe_-_My_Book_(z-library)"),
            "Jane Doe - My Book"
        );
        assert_eq!(
            basic_clean("My Book [1] www.ebooks.com+Jane Doe"),
            "My Book Jane Doe"
        );
    }

    #[test]
    fn test_basic_clean_unifies_dashes_and_keeps_groups() {
        assert_eq!(basic_clean("Jane Doe \u{2013} My Book (2019)"), "Jane Doe - My Book (2019)");
    }

    #[test]
    fn test_deep_clean_drops_groups_and_numbers() {
        assert_eq!(
            deep_clean("Jane Doe - My Book (Retail) [EPUB] 320p 2"),
            "Jane Doe - My Book"
        );
    }

    #[test]
    fn test_strip_years() {
        assert_eq!(strip_years("My Book (2019)"), "My Book");
        assert_eq!(strip_years("My Book - 2019"), "My Book");
        assert_eq!(strip_years("2001 A Space Odyssey"), "2001 A Space Odyssey");
    }

    #[test]
    fn test_unlocated_name() {
        assert_eq!(
            unlocated_name("Some Scan_2004 (z-library) [1]", ".PDF"),
            "Some Scan.pdf"
        );
        assert_eq!(unlocated_name("(2019)", ".pdf"), "(2019).pdf");
    }
}
