//! Per-run counters.

use std::fmt;

use crate::ledger::{ProcessingRecord, RecordStatus};

/// Outcome counts for one run.
///
/// File counts come from the run's finalized records, so a canonical file
/// displaced later in the run is counted once, as a duplicate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub organized: usize,
    pub duplicate: usize,
    pub unlocated: usize,
    pub excluded: usize,
    /// Files that could not be recorded at all.
    pub failed: usize,
    pub cache_hits: usize,
    pub remote_lookups: usize,
}

impl RunStats {
    /// Tallies finalized records by status.
    #[must_use]
    pub fn from_records(records: &[ProcessingRecord]) -> Self {
        let mut stats = Self::default();
        for record in records {
            match record.status() {
                Some(RecordStatus::Organized) => stats.organized += 1,
                Some(RecordStatus::Duplicate) => stats.duplicate += 1,
                Some(RecordStatus::Unlocated) => stats.unlocated += 1,
                Some(RecordStatus::Excluded) => stats.excluded += 1,
                None => {}
            }
        }
        stats
    }

    /// Files with a final classification.
    #[must_use]
    pub fn total(&self) -> usize {
        self.organized + self.duplicate + self.unlocated + self.excluded
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "organized {}, duplicates {}, unlocated {}, excluded {}",
            self.organized, self.duplicate, self.unlocated, self.excluded
        )?;
        if self.failed > 0 {
            write!(f, ", failed {}", self.failed)?;
        }
        write!(
            f,
            " (cache hits {}, remote lookups {})",
            self.cache_hits, self.remote_lookups
        )
    }
}
