//! Merges local and remote candidates into one resolution.
//!
//! Candidates are scrubbed of placeholder values, grouped by the work they
//! describe, and the best-supported group is merged field by field. The
//! outcome is either a [`ResolvedMetadata`] or an unresolved reason code.

mod policy;

pub use policy::{
    DEFAULT_ACCEPTANCE_FLOOR, DEFAULT_SIMILARITY_THRESHOLD, ReconcilePolicy, SourceWeights,
};

use std::collections::HashSet;

use tracing::{debug, instrument};

use crate::ledger::ReasonCode;
use crate::metadata::{
    CandidateMetadata, FieldProvenance, ResolvedMetadata, SourceTag, isbn, text,
};

const SUPPORT_EPSILON: f64 = 1e-9;

const JUNK_TITLES: &[&str] = &[
    "unknown",
    "untitled",
    "document",
    "file",
    "title",
    "none",
    "no title",
    "new document",
    "sem titulo",
];

const JUNK_AUTHORS: &[&str] = &[
    "unknown",
    "unknown author",
    "anonymous",
    "anon",
    "author",
    "user",
    "admin",
    "administrator",
    "system",
    "none",
    "owner",
    "autor desconhecido",
];

/// Outcome of reconciling one file's candidates.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    Resolved(ResolvedMetadata),
    Unresolved(ReasonCode),
}

impl Reconciliation {
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }

    #[must_use]
    pub fn resolved(&self) -> Option<&ResolvedMetadata> {
        match self {
            Self::Resolved(meta) => Some(meta),
            Self::Unresolved(_) => None,
        }
    }

    #[must_use]
    pub fn reason(&self) -> Option<ReasonCode> {
        match self {
            Self::Resolved(_) => None,
            Self::Unresolved(reason) => Some(*reason),
        }
    }
}

#[derive(Debug, Default)]
struct Group {
    members: Vec<usize>,
    isbns: HashSet<String>,
}

/// Reconciles candidates from every source under `policy`.
#[instrument(level = "debug", skip_all, fields(count = candidates.len()))]
#[must_use]
pub fn reconcile(candidates: &[CandidateMetadata], policy: &ReconcilePolicy) -> Reconciliation {
    let cleaned: Vec<CandidateMetadata> = candidates.iter().filter_map(scrub).collect();
    if cleaned.is_empty() {
        debug!("No usable candidates after plausibility filter");
        return Reconciliation::Unresolved(ReasonCode::NoUsableSignal);
    }

    let (mut groups, orphans) = form_groups(&cleaned, policy.similarity_threshold);

    // Identifier-only candidates first try the group already carrying their ISBN.
    let mut unplaced = Vec::new();
    for index in orphans {
        let key = isbn13_of(&cleaned[index]);
        match key
            .as_ref()
            .and_then(|k| groups.iter().position(|g| g.isbns.contains(k)))
        {
            Some(position) => {
                let group = &mut groups[position];
                group.members.push(index);
                group.isbns.extend(key);
            }
            None => unplaced.push(index),
        }
    }

    let Some(winner) = pick_winner(&cleaned, &groups, policy) else {
        debug!("Only identifier candidates without title or author");
        return Reconciliation::Unresolved(ReasonCode::IncompleteMetadata);
    };

    // Leftover identifiers join the winner only when they cannot contradict
    // the ISBN it already carries.
    let group = &mut groups[winner];
    for index in unplaced {
        let Some(key) = isbn13_of(&cleaned[index]) else {
            continue;
        };
        if group.isbns.is_empty() || group.isbns.contains(&key) {
            group.members.push(index);
            group.isbns.insert(key);
        } else {
            debug!(isbn = %key, "Dropping identifier that contradicts the winning group");
        }
    }

    let resolved = merge(&cleaned, &group.members, policy);
    debug!(
        title = %resolved.title,
        author = resolved.primary_author(),
        confidence = resolved.confidence,
        "Reconciled candidate group"
    );

    if resolved.title.is_empty() || resolved.authors.is_empty() {
        return Reconciliation::Unresolved(ReasonCode::IncompleteMetadata);
    }
    if resolved.confidence < policy.acceptance_floor {
        return Reconciliation::Unresolved(ReasonCode::BelowConfidenceFloor);
    }
    Reconciliation::Resolved(resolved)
}

/// Blanks placeholder values; drops candidates left with nothing.
fn scrub(candidate: &CandidateMetadata) -> Option<CandidateMetadata> {
    let mut candidate = candidate.clone();
    if is_junk_title(&candidate.title) {
        candidate.title.clear();
    }
    candidate.authors.retain(|author| !is_junk_author(author));
    candidate.year = candidate.year.filter(|y| text::is_plausible_year(*y));
    (!candidate.is_empty()).then_some(candidate)
}

fn is_junk_title(title: &str) -> bool {
    let key = text::normalize_key(title);
    let base = key.trim_end_matches(|c: char| c.is_ascii_digit() || c == ' ');
    base.is_empty() || JUNK_TITLES.contains(&base) || key.starts_with("microsoft word")
}

fn is_junk_author(author: &str) -> bool {
    let key = text::normalize_key(author);
    let base = key.trim_end_matches(|c: char| c.is_ascii_digit() || c == ' ');
    base.chars().filter(|c| c.is_alphabetic()).count() < 2 || JUNK_AUTHORS.contains(&base)
}

fn isbn13_of(candidate: &CandidateMetadata) -> Option<String> {
    candidate.isbn.as_deref().and_then(isbn::to_isbn13)
}

/// Groups titled candidates; returns the groups and the untitled leftovers.
fn form_groups(cleaned: &[CandidateMetadata], threshold: f64) -> (Vec<Group>, Vec<usize>) {
    let mut groups: Vec<Group> = Vec::new();
    let mut orphans = Vec::new();

    for (index, candidate) in cleaned.iter().enumerate() {
        if candidate.title.is_empty() {
            orphans.push(index);
            continue;
        }
        let key = isbn13_of(candidate);
        let target = key
            .as_ref()
            .and_then(|k| groups.iter().position(|g| g.isbns.contains(k)))
            .or_else(|| {
                groups.iter().position(|g| {
                    g.members
                        .iter()
                        .any(|&m| same_work(&cleaned[m], candidate, threshold))
                })
            });

        let group = match target {
            Some(position) => &mut groups[position],
            None => {
                groups.push(Group::default());
                let last = groups.len() - 1;
                &mut groups[last]
            }
        };
        group.members.push(index);
        if let Some(key) = key {
            group.isbns.insert(key);
        }
    }

    (groups, orphans)
}

fn same_work(a: &CandidateMetadata, b: &CandidateMetadata, threshold: f64) -> bool {
    if a.title.is_empty() || text::similarity(&a.title, &b.title) < threshold {
        return false;
    }
    let (left, right) = (a.primary_author(), b.primary_author());
    left.is_empty() || right.is_empty() || text::similarity(left, right) >= threshold
}

/// Sum over distinct sources of the best weighted confidence.
fn support(cleaned: &[CandidateMetadata], group: &Group, policy: &ReconcilePolicy) -> f64 {
    policy
        .weights
        .entries()
        .iter()
        .map(|(source, _)| {
            group
                .members
                .iter()
                .map(|&m| &cleaned[m])
                .filter(|c| c.source == *source)
                .map(|c| policy.score(c.source, c.confidence))
                .fold(0.0_f64, f64::max)
        })
        .sum()
}

fn pick_winner(
    cleaned: &[CandidateMetadata],
    groups: &[Group],
    policy: &ReconcilePolicy,
) -> Option<usize> {
    let has_source = |group: &Group, source: SourceTag| {
        group.members.iter().any(|&m| cleaned[m].source == source)
    };

    let embedded_isbns: HashSet<String> = cleaned
        .iter()
        .filter(|c| c.source == SourceTag::Embedded)
        .filter_map(isbn13_of)
        .collect();
    let carries_embedded_isbn =
        |group: &Group| group.isbns.iter().any(|k| embedded_isbns.contains(k));

    let eligible: Vec<usize> = if groups.iter().any(carries_embedded_isbn) {
        (0..groups.len())
            .filter(|&i| carries_embedded_isbn(&groups[i]))
            .collect()
    } else if groups.iter().any(|g| !g.isbns.is_empty()) {
        (0..groups.len())
            .filter(|&i| !groups[i].isbns.is_empty())
            .collect()
    } else {
        (0..groups.len()).collect()
    };

    let mut best: Option<(usize, f64, bool)> = None;
    for index in eligible {
        let score = support(cleaned, &groups[index], policy);
        let embedded = has_source(&groups[index], SourceTag::Embedded);
        let better = match best {
            None => true,
            Some((_, best_score, best_embedded)) => {
                score > best_score + SUPPORT_EPSILON
                    || ((score - best_score).abs() <= SUPPORT_EPSILON && embedded && !best_embedded)
            }
        };
        if better {
            best = Some((index, score, embedded));
        }
    }
    best.map(|(index, _, _)| index)
}

/// Field-level merge of one group.
fn merge(cleaned: &[CandidateMetadata], members: &[usize], policy: &ReconcilePolicy) -> ResolvedMetadata {
    let mut ranked: Vec<&CandidateMetadata> = members.iter().map(|&m| &cleaned[m]).collect();
    // Stable sort keeps discovery order among equal scores.
    ranked.sort_by(|a, b| {
        policy
            .score(b.source, b.confidence)
            .total_cmp(&policy.score(a.source, a.confidence))
    });

    let mut provenance = Vec::new();
    let mut note = |field: &str, source: SourceTag| {
        provenance.push(FieldProvenance {
            field: field.to_string(),
            source,
        });
    };

    let isbn_holder = ranked
        .iter()
        .find(|c| c.source == SourceTag::Embedded && c.isbn.is_some())
        .or_else(|| ranked.iter().find(|c| c.isbn.is_some()))
        .copied();
    let isbn = isbn_holder.and_then(|c| c.isbn.clone());
    if let Some(holder) = isbn_holder {
        note("isbn", holder.source);
    }

    // Members carrying the chosen ISBN lead for edition-specific fields.
    let isbn_key = isbn.as_deref().and_then(isbn::to_isbn13);
    let mut edition_ranked: Vec<&CandidateMetadata> = ranked.clone();
    edition_ranked.sort_by_key(|c| isbn_key.is_none() || isbn13_of(c) != isbn_key);

    let title = ranked.iter().find(|c| !c.title.is_empty());
    if let Some(c) = title {
        note("title", c.source);
    }
    let authors = ranked.iter().find(|c| !c.authors.is_empty());
    if let Some(c) = authors {
        note("author", c.source);
    }
    let year = edition_ranked.iter().find(|c| c.year.is_some());
    if let Some(c) = year {
        note("year", c.source);
    }
    let genre = edition_ranked.iter().find(|c| c.genre.is_some());
    if let Some(c) = genre {
        note("genre", c.source);
    }
    let cover = ranked.iter().find(|c| c.cover_url.is_some());
    if let Some(c) = cover {
        note("cover", c.source);
    }

    let (weighted, total_weight) = ranked.iter().fold((0.0, 0.0), |(sum, weights), c| {
        let weight = policy.weights.weight(c.source);
        (sum + weight * c.confidence, weights + weight)
    });
    let confidence = if total_weight > 0.0 {
        (weighted / total_weight).clamp(0.0, 1.0)
    } else {
        0.0
    };

    ResolvedMetadata {
        title: title.map(|c| c.title.clone()).unwrap_or_default(),
        authors: authors.map(|c| c.authors.clone()).unwrap_or_default(),
        year: year.and_then(|c| c.year),
        genre: genre.and_then(|c| c.genre.clone()),
        isbn,
        cover_url: cover.and_then(|c| c.cover_url.clone()),
        confidence,
        provenance,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn candidate(source: SourceTag, confidence: f64, title: &str, author: &str) -> CandidateMetadata {
        CandidateMetadata::new(source, confidence)
            .with_title(title)
            .with_author(author)
    }

    #[test]
    fn test_empty_input_has_no_usable_signal() {
        let outcome = reconcile(&[], &ReconcilePolicy::default());
        assert_eq!(outcome, Reconciliation::Unresolved(ReasonCode::NoUsableSignal));
    }

    #[test]
    fn test_junk_only_candidates_have_no_usable_signal() {
        let junk = candidate(SourceTag::Embedded, 0.6, "Microsoft Word - doc1.docx", "admin");
        let untitled = candidate(SourceTag::Embedded, 0.6, "Untitled", "Unknown");
        let outcome = reconcile(&[junk, untitled], &ReconcilePolicy::default());
        assert_eq!(outcome.reason(), Some(ReasonCode::NoUsableSignal));
    }

    #[test]
    fn test_filename_plus_secondary_resolves() {
        let filename = candidate(SourceTag::Filename, 0.4, "My Book", "Jane Doe").with_year(Some(2019));
        let secondary = candidate(SourceTag::SecondaryApi, 1.0, "My Book", "Jane Doe").with_year(Some(2019));

        let outcome = reconcile(&[filename, secondary], &ReconcilePolicy::default());
        let resolved = outcome.resolved().unwrap();
        assert_eq!(resolved.title, "My Book");
        assert_eq!(resolved.primary_author(), "Jane Doe");
        assert_eq!(resolved.year, Some(2019));
        let expected = (0.4 * 0.4 + 1.0) / 1.4;
        assert!((resolved.confidence - expected).abs() < 1e-9);
        assert!(resolved.provenance_summary().contains("title:secondary_api"));
    }

    #[test]
    fn test_filename_alone_is_below_floor() {
        let filename = candidate(SourceTag::Filename, 0.4, "My Book", "Jane Doe");
        let outcome = reconcile(&[filename], &ReconcilePolicy::default());
        assert_eq!(outcome.reason(), Some(ReasonCode::BelowConfidenceFloor));
    }

    #[test]
    fn test_title_without_author_is_incomplete() {
        let primary = CandidateMetadata::new(SourceTag::PrimaryApi, 0.95).with_title("My Book");
        let outcome = reconcile(&[primary], &ReconcilePolicy::default());
        assert_eq!(outcome.reason(), Some(ReasonCode::IncompleteMetadata));
    }

    #[test]
    fn test_isbn_only_input_is_incomplete() {
        let embedded = CandidateMetadata::new(SourceTag::Embedded, 0.3).with_isbn(Some("9780306406157"));
        let outcome = reconcile(&[embedded], &ReconcilePolicy::default());
        assert_eq!(outcome.reason(), Some(ReasonCode::IncompleteMetadata));
    }

    #[test]
    fn test_embedded_isbn_is_authoritative_over_filename() {
        let embedded = CandidateMetadata::new(SourceTag::Embedded, 0.3).with_isbn(Some("0306406152"));
        let filename = candidate(SourceTag::Filename, 0.4, "Totally Different", "Someone Else");
        let primary = candidate(SourceTag::PrimaryApi, 0.95, "My Book", "Jane Doe")
            .with_isbn(Some("9780306406157"))
            .with_year(Some(2019));

        let outcome = reconcile(&[filename, embedded, primary], &ReconcilePolicy::default());
        let resolved = outcome.resolved().unwrap();
        assert_eq!(resolved.isbn.as_deref(), Some("0306406152"));
        assert_eq!(resolved.title, "My Book");
        assert!(resolved.sources().contains(&SourceTag::Embedded));
    }

    #[test]
    fn test_unmatched_identifier_never_joins_a_group_with_another_isbn() {
        let embedded = CandidateMetadata::new(SourceTag::Embedded, 0.3).with_isbn(Some("9780306406157"));
        let primary = candidate(SourceTag::PrimaryApi, 0.95, "Other Work", "Someone Else")
            .with_isbn(Some("9780804429573"));

        let outcome = reconcile(&[embedded, primary], &ReconcilePolicy::default());
        let resolved = outcome.resolved().unwrap();
        assert_eq!(resolved.title, "Other Work");
        assert_eq!(resolved.isbn.as_deref(), Some("9780804429573"));
        assert!(!resolved.sources().contains(&SourceTag::Embedded));
    }

    #[test]
    fn test_unmatched_identifier_joins_a_winner_without_isbn() {
        let embedded = CandidateMetadata::new(SourceTag::Embedded, 0.3).with_isbn(Some("9780306406157"));
        let secondary = candidate(SourceTag::SecondaryApi, 0.9, "My Book", "Jane Doe");

        let outcome = reconcile(&[embedded, secondary], &ReconcilePolicy::default());
        let resolved = outcome.resolved().unwrap();
        assert_eq!(resolved.title, "My Book");
        assert_eq!(resolved.isbn.as_deref(), Some("9780306406157"));
    }

    #[test]
    fn test_isbn_groups_outrank_title_only_groups() {
        let strong_title_only = candidate(SourceTag::SecondaryApi, 1.0, "Popular Book", "Famous Author");
        let with_isbn = candidate(SourceTag::PrimaryApi, 0.6, "My Book", "Jane Doe")
            .with_isbn(Some("9780306406157"));
        let outcome = reconcile(&[strong_title_only, with_isbn], &ReconcilePolicy::default());
        assert_eq!(outcome.resolved().unwrap().title, "My Book");
    }

    #[test]
    fn test_similar_spellings_group_together() {
        let primary = candidate(SourceTag::PrimaryApi, 0.9, "The Hobbit", "J.R.R. Tolkien");
        let secondary = candidate(SourceTag::SecondaryApi, 0.9, "The Hobbit", "J. R. R. Tolkien");
        let decoy = candidate(SourceTag::SecondaryApi, 0.95, "Cooking for Cats", "Someone Else");

        let outcome = reconcile(&[primary, decoy, secondary], &ReconcilePolicy::default());
        assert_eq!(outcome.resolved().unwrap().title, "The Hobbit");
    }

    #[test]
    fn test_similarity_threshold_across_range() {
        let short = candidate(SourceTag::PrimaryApi, 0.9, "The Hobbit", "J.R.R. Tolkien");
        let long = candidate(
            SourceTag::SecondaryApi,
            0.9,
            "The Hobbit or There and Back Again",
            "J.R.R. Tolkien",
        );

        for threshold in [0.2, 0.25] {
            let groups = form_groups(&[short.clone(), long.clone()], threshold).0;
            assert_eq!(groups.len(), 1, "threshold {threshold} should merge");
        }
        for threshold in [0.9, 0.95] {
            let groups = form_groups(&[short.clone(), long.clone()], threshold).0;
            assert_eq!(groups.len(), 2, "threshold {threshold} should split");
        }
    }

    #[test]
    fn test_embedded_group_wins_support_tie() {
        let weights = SourceWeights {
            embedded: 1.0,
            filename: 1.0,
            ..SourceWeights::default()
        };
        let policy = ReconcilePolicy::default()
            .with_weights(weights)
            .with_acceptance_floor(0.3);
        let filename = candidate(SourceTag::Filename, 0.4, "Filename Title", "Filename Author");
        let embedded = candidate(SourceTag::Embedded, 0.4, "Embedded Title", "Embedded Author");

        let outcome = reconcile(&[filename, embedded], &policy);
        assert_eq!(outcome.resolved().unwrap().title, "Embedded Title");
    }

    #[test]
    fn test_equal_support_prefers_earliest_group() {
        let first = candidate(SourceTag::PrimaryApi, 0.9, "First Book", "Author One");
        let second = candidate(SourceTag::PrimaryApi, 0.9, "Second Book", "Author Two");
        let outcome = reconcile(&[first, second], &ReconcilePolicy::default());
        assert_eq!(outcome.resolved().unwrap().title, "First Book");
    }

    #[test]
    fn test_manual_candidate_outweighs_embedded() {
        let embedded = candidate(SourceTag::Embedded, 0.6, "Wrong Title", "Wrong Author");
        let manual = candidate(SourceTag::Manual, 1.0, "Right Title", "Right Author");
        let outcome = reconcile(&[embedded, manual], &ReconcilePolicy::default());
        let resolved = outcome.resolved().unwrap();
        assert_eq!(resolved.title, "Right Title");
        assert!((resolved.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_acceptance_floor_across_range() {
        let embedded = candidate(SourceTag::Embedded, 0.6, "My Book", "Jane Doe");
        for (floor, resolved) in [(0.3, true), (0.59, true), (0.61, false), (0.9, false)] {
            let policy = ReconcilePolicy::default().with_acceptance_floor(floor);
            assert_eq!(
                reconcile(std::slice::from_ref(&embedded), &policy).is_resolved(),
                resolved,
                "floor {floor}"
            );
        }
    }

    #[test]
    fn test_year_and_genre_follow_isbn_carriers() {
        let filename = candidate(SourceTag::Filename, 0.4, "My Book", "Jane Doe").with_year(Some(2001));
        let secondary = candidate(SourceTag::SecondaryApi, 0.9, "My Book", "Jane Doe")
            .with_year(Some(2005))
            .with_genre(Some("Essays".to_string()));
        let primary = candidate(SourceTag::PrimaryApi, 0.8, "My Book", "Jane Doe")
            .with_isbn(Some("9780306406157"))
            .with_year(Some(2019))
            .with_genre(Some("Fiction".to_string()));

        let outcome = reconcile(&[filename, secondary, primary], &ReconcilePolicy::default());
        let resolved = outcome.resolved().unwrap();
        assert_eq!(resolved.year, Some(2019));
        assert_eq!(resolved.genre.as_deref(), Some("Fiction"));
    }
}
