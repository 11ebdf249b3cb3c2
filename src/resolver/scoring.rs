//! Relevance scoring for title searches.

use crate::metadata::text;

/// Weight of title similarity in a relevance score.
const TITLE_WEIGHT: f64 = 0.7;
/// Weight of author similarity in a relevance score.
const AUTHOR_WEIGHT: f64 = 0.3;
/// Items must score strictly above this to be kept.
pub(crate) const KEEP_THRESHOLD: f64 = 0.3;

/// Confidence for primary-source ISBN matches.
pub(crate) const PRIMARY_ISBN_CONFIDENCE: f64 = 0.95;
/// Confidence for secondary-source ISBN matches.
pub(crate) const SECONDARY_ISBN_CONFIDENCE: f64 = 0.9;

/// Scores a returned item against the query using token Jaccard.
///
/// Without a query author the title similarity is the whole score.
pub(crate) fn relevance(
    query_title: &str,
    query_author: Option<&str>,
    title: &str,
    authors: &[String],
) -> f64 {
    let title_score = text::token_jaccard(query_title, title);
    match query_author {
        Some(author) => {
            let author_score = authors
                .iter()
                .map(|a| text::token_jaccard(author, a))
                .fold(0.0_f64, f64::max);
            TITLE_WEIGHT * title_score + AUTHOR_WEIGHT * author_score
        }
        None => title_score,
    }
}

/// Whether a score is high enough to keep the item.
pub(crate) fn keep(score: f64) -> bool {
    score > KEEP_THRESHOLD
}
