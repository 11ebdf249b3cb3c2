//! Tunable weights and thresholds for reconciliation.

use serde::{Deserialize, Serialize};

use crate::metadata::SourceTag;

/// Default title/author similarity needed to group two candidates.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.6;

/// Default minimum reconciled confidence for a file to be organized.
pub const DEFAULT_ACCEPTANCE_FLOOR: f64 = 0.5;

/// Trust placed in each source when ranking and averaging.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SourceWeights {
    pub manual: f64,
    pub primary_api: f64,
    pub secondary_api: f64,
    pub embedded: f64,
    pub filename: f64,
}

impl SourceWeights {
    /// Weight for one source tag.
    #[must_use]
    pub fn weight(&self, source: SourceTag) -> f64 {
        match source {
            SourceTag::Manual => self.manual,
            SourceTag::PrimaryApi => self.primary_api,
            SourceTag::SecondaryApi => self.secondary_api,
            SourceTag::Embedded => self.embedded,
            SourceTag::Filename => self.filename,
        }
    }

    /// Every weight paired with its tag.
    #[must_use]
    pub fn entries(&self) -> [(SourceTag, f64); 5] {
        [
            (SourceTag::Manual, self.manual),
            (SourceTag::PrimaryApi, self.primary_api),
            (SourceTag::SecondaryApi, self.secondary_api),
            (SourceTag::Embedded, self.embedded),
            (SourceTag::Filename, self.filename),
        ]
    }
}

impl Default for SourceWeights {
    fn default() -> Self {
        Self {
            manual: 1.2,
            primary_api: 1.0,
            secondary_api: 1.0,
            embedded: 0.7,
            filename: 0.4,
        }
    }
}

/// Reconciliation policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReconcilePolicy {
    pub weights: SourceWeights,
    /// Similarity at or above which two candidates describe the same work.
    pub similarity_threshold: f64,
    /// Reconciled confidence below this leaves the file unresolved.
    pub acceptance_floor: f64,
}

impl ReconcilePolicy {
    #[must_use]
    pub fn with_weights(mut self, weights: SourceWeights) -> Self {
        self.weights = weights;
        self
    }

    #[must_use]
    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_acceptance_floor(mut self, floor: f64) -> Self {
        self.acceptance_floor = floor;
        self
    }

    /// Weighted confidence of one candidate under this policy.
    #[must_use]
    pub fn score(&self, source: SourceTag, confidence: f64) -> f64 {
        self.weights.weight(source) * confidence
    }
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        Self {
            weights: SourceWeights::default(),
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            acceptance_floor: DEFAULT_ACCEPTANCE_FLOOR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_weights_rank_manual_highest() {
        let weights = SourceWeights::default();
        let max = weights
            .entries()
            .iter()
            .map(|(_, w)| *w)
            .fold(0.0_f64, f64::max);
        assert!((weights.weight(SourceTag::Manual) - max).abs() < f64::EPSILON);
        assert!(weights.weight(SourceTag::Filename) < weights.weight(SourceTag::Embedded));
    }

    #[test]
    fn test_builders_override_defaults() {
        let policy = ReconcilePolicy::default()
            .with_similarity_threshold(0.8)
            .with_acceptance_floor(0.3);
        assert!((policy.similarity_threshold - 0.8).abs() < f64::EPSILON);
        assert!((policy.acceptance_floor - 0.3).abs() < f64::EPSILON);
        assert!((policy.score(SourceTag::Embedded, 1.0) - 0.7).abs() < 1e-9);
    }
}
