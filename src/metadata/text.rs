//! Text helpers: normalization keys, similarity and display cleanup.

use std::collections::HashSet;

use chrono::Datelike;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Collapses whitespace runs to single spaces and trims.
#[must_use]
pub fn normalize_spaces(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Removes combining marks after NFD decomposition (`é` becomes `e`).
#[must_use]
pub fn strip_diacritics(text: &str) -> String {
    text.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Lowercase, diacritic-free, alphanumeric-only key with single spaces.
#[must_use]
pub fn normalize_key(text: &str) -> String {
    let mapped: String = strip_diacritics(text)
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    normalize_spaces(&mapped)
}

/// Distinct tokens of [`normalize_key`].
#[must_use]
pub fn tokens(text: &str) -> HashSet<String> {
    normalize_key(text)
        .split(' ')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Jaccard index of the token sets of two strings; 0 when either is empty.
#[must_use]
pub fn token_jaccard(a: &str, b: &str) -> f64 {
    let left = tokens(a);
    let right = tokens(b);
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    let intersection = left.intersection(&right).count();
    let union = left.union(&right).count();
    intersection as f64 / union as f64
}

/// Max of token Jaccard and normalized Damerau-Levenshtein on the keys.
#[must_use]
pub fn similarity(a: &str, b: &str) -> f64 {
    let left = normalize_key(a);
    let right = normalize_key(b);
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    let edit = strsim::normalized_damerau_levenshtein(&left, &right);
    token_jaccard(&left, &right).max(edit)
}

/// Keeps letters, digits, whitespace and `-().`; everything else is dropped.
#[must_use]
pub fn clean_special_chars(text: &str) -> String {
    let kept: String = text
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || matches!(c, '-' | '(' | ')' | '.'))
        .collect();
    normalize_spaces(&kept)
}

/// Title-cases strings that are entirely upper- or lowercase; mixed case is kept.
#[must_use]
pub fn smart_title_case(text: &str) -> String {
    let letters: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.is_empty() {
        return text.to_string();
    }
    let all_upper = letters.iter().all(|c| c.is_uppercase());
    let all_lower = letters.iter().all(|c| c.is_lowercase());
    if !all_upper && !all_lower {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut at_word_start = true;
    for c in text.chars() {
        if c.is_alphanumeric() || c == '\'' {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }
    out
}

/// Display normalization applied to titles and authors when enabled.
#[must_use]
pub fn normalize_display(text: &str) -> String {
    smart_title_case(&clean_special_chars(&strip_diacritics(text)))
}

/// The current calendar year (local time).
#[must_use]
pub fn current_year() -> i32 {
    chrono::Local::now().year()
}

/// True when `year` lies in `1000..=current_year() + 1`.
#[must_use]
pub fn is_plausible_year(year: i32) -> bool {
    (1000..=current_year() + 1).contains(&year)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_key_strips_diacritics_and_punctuation() {
        assert_eq!(normalize_key("  Les Misérables: Tome I "), "les miserables tome i");
        assert_eq!(normalize_key("O'Brien,  Flann"), "o brien flann");
        assert_eq!(normalize_key("---"), "");
    }

    #[test]
    fn test_token_jaccard() {
        assert_eq!(token_jaccard("My Book", "my book"), 1.0);
        assert_eq!(token_jaccard("My Book", "My Other Book"), 2.0 / 3.0);
        assert_eq!(token_jaccard("", "My Book"), 0.0);
    }

    #[test]
    fn test_similarity_tolerates_typos() {
        assert!(similarity("The Hobbit", "The Hobit") > 0.8);
        assert!(similarity("The Hobbit", "War and Peace") < 0.6);
        assert_eq!(similarity("", "x"), 0.0);
    }

    #[test]
    fn test_clean_special_chars() {
        assert_eq!(clean_special_chars("Dune: Part #1 (v2.0)!"), "Dune Part 1 (v2.0)");
    }

    #[test]
    fn test_smart_title_case() {
        assert_eq!(smart_title_case("THE HOBBIT"), "The Hobbit");
        assert_eq!(smart_title_case("the hobbit"), "The Hobbit");
        assert_eq!(smart_title_case("The iPhone Book"), "The iPhone Book");
        assert_eq!(smart_title_case("1984"), "1984");
    }

    #[test]
    fn test_normalize_display() {
        assert_eq!(normalize_display("GABRIEL GARCÍA MÁRQUEZ"), "Gabriel Garcia Marquez");
    }

    #[test]
    fn test_plausible_year_bounds() {
        assert!(is_plausible_year(1000));
        assert!(is_plausible_year(current_year() + 1));
        assert!(!is_plausible_year(999));
        assert!(!is_plausible_year(current_year() + 2));
    }
}
