//! Publication-year detection in filenames.

use std::sync::LazyLock;

use regex::Regex;

use crate::metadata::text::is_plausible_year;

#[allow(clippy::expect_used)]
static BRACKETED_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\(\[](\d{4})[\)\]]").expect("bracketed year regex is valid"));

#[allow(clippy::expect_used)]
static STANDALONE_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})\b").expect("standalone year regex is valid"));

/// First plausible year, preferring `(YYYY)` / `[YYYY]` over bare four-digit runs.
#[must_use]
pub fn extract_year(text: &str) -> Option<i32> {
    [&*BRACKETED_YEAR, &*STANDALONE_YEAR]
        .into_iter()
        .find_map(|pattern| {
            pattern
                .captures_iter(text)
                .filter_map(|cap| cap[1].parse::<i32>().ok())
                .find(|year| is_plausible_year(*year))
        })
}
