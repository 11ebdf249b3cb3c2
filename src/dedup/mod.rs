//! Duplicate detection by content fingerprint and by bibliographic identity.
//!
//! Every check takes the fingerprint bucket lock and then the signature
//! bucket lock, always in that order. A passing check hands the locks back
//! as a [`BucketGuard`] that the caller holds through planning and the move,
//! so two files can never race for one canonical slot.
//!
//! Ranking is a total order (confidence, then size, then discovery order),
//! which makes the final canonical choice independent of processing order: a
//! later but better-ranked file displaces the incumbent.

use std::cmp::Ordering;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, instrument};

use crate::ledger::ReasonCode;
use crate::metadata::QuerySignature;

const CONFIDENCE_EPSILON: f64 = 1e-9;

/// A file that currently owns a canonical slot (or wants one).
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalEntry {
    /// Ledger record of the organized file, once known.
    pub record_id: Option<i64>,
    /// SHA-256 of the file contents.
    pub fingerprint: String,
    /// Identity signature of the resolved metadata.
    pub signature: Option<QuerySignature>,
    /// Reconciled confidence.
    pub confidence: f64,
    /// File size in bytes.
    pub size: u64,
    /// Discovery position in the current run; `None` for earlier runs.
    pub discovery_index: Option<usize>,
    /// Where the file lives (organized path, or source path before the move).
    pub path: PathBuf,
}

impl CanonicalEntry {
    /// Ranking order: `Greater` means `self` deserves the canonical slot.
    #[must_use]
    pub fn rank_against(&self, other: &Self) -> Ordering {
        let confidence = if (self.confidence - other.confidence).abs() <= CONFIDENCE_EPSILON {
            Ordering::Equal
        } else {
            self.confidence.total_cmp(&other.confidence)
        };
        confidence
            .then(self.size.cmp(&other.size))
            // Earlier discovery ranks higher; earlier runs come first of all.
            .then(other.discovery_index.cmp(&self.discovery_index))
    }

    /// Whether `self` strictly outranks `other`.
    #[must_use]
    pub fn outranks(&self, other: &Self) -> bool {
        self.rank_against(other) == Ordering::Greater
    }
}

/// Bucket locks held from a passing check through the move.
#[derive(Debug)]
pub struct BucketGuard {
    _fingerprint: OwnedMutexGuard<()>,
    _signature: Option<OwnedMutexGuard<()>>,
}

/// Result of a duplicate check.
#[derive(Debug)]
pub enum DuplicateCheck {
    /// No canonical match; proceed to planning while holding the guard.
    Pass(BucketGuard),
    /// A better-ranked canonical exists; the newcomer is a duplicate.
    Duplicate {
        reason: ReasonCode,
        canonical: CanonicalEntry,
    },
    /// The newcomer outranks every matching canonical; each must be displaced.
    Displace {
        displaced: Vec<Displaced>,
        guard: BucketGuard,
    },
}

/// A canonical entry the newcomer outranks, with the match that found it.
#[derive(Debug, Clone)]
pub struct Displaced {
    pub reason: ReasonCode,
    pub incumbent: CanonicalEntry,
}

/// Tracks claimed canonical entries for one run.
#[derive(Debug, Default)]
pub struct DuplicateDetector {
    fingerprint_locks: DashMap<String, Arc<Mutex<()>>>,
    signature_locks: DashMap<QuerySignature, Arc<Mutex<()>>>,
    by_fingerprint: DashMap<String, CanonicalEntry>,
    by_signature: DashMap<QuerySignature, CanonicalEntry>,
}

impl DuplicateDetector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers canonical entries organized by earlier runs.
    pub fn seed(&self, entries: impl IntoIterator<Item = CanonicalEntry>) {
        let mut count = 0_usize;
        for entry in entries {
            self.insert(entry);
            count += 1;
        }
        debug!(count, "Seeded duplicate detector");
    }

    /// Number of distinct fingerprints claimed.
    #[must_use]
    pub fn canonical_count(&self) -> usize {
        self.by_fingerprint.len()
    }

    /// Checks a newcomer against claimed canonicals.
    #[instrument(skip(self, newcomer), fields(fingerprint = %newcomer.fingerprint))]
    pub async fn check(&self, newcomer: &CanonicalEntry) -> DuplicateCheck {
        // Clone the Arcs out so no map shard lock is held across an await.
        let fingerprint_lock = self
            .fingerprint_locks
            .entry(newcomer.fingerprint.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let fingerprint_guard = fingerprint_lock.lock_owned().await;

        let signature_guard = match &newcomer.signature {
            Some(signature) => {
                let lock = self
                    .signature_locks
                    .entry(signature.clone())
                    .or_insert_with(|| Arc::new(Mutex::new(())))
                    .clone();
                Some(lock.lock_owned().await)
            }
            None => None,
        };

        let guard = BucketGuard {
            _fingerprint: fingerprint_guard,
            _signature: signature_guard,
        };

        let content_match = self
            .by_fingerprint
            .get(&newcomer.fingerprint)
            .map(|entry| entry.value().clone());
        // The signature owner only counts separately when it is a different file.
        let identity_match = newcomer
            .signature
            .as_ref()
            .and_then(|signature| self.by_signature.get(signature))
            .map(|entry| entry.value().clone())
            .filter(|owner| {
                content_match
                    .as_ref()
                    .is_none_or(|incumbent| incumbent.fingerprint != owner.fingerprint)
            });

        let matches: Vec<Displaced> = content_match
            .map(|incumbent| Displaced {
                reason: ReasonCode::IdenticalBytes,
                incumbent,
            })
            .into_iter()
            .chain(identity_match.map(|incumbent| Displaced {
                reason: ReasonCode::SameWork,
                incumbent,
            }))
            .collect();

        if matches.is_empty() {
            return DuplicateCheck::Pass(guard);
        }

        let strongest = matches
            .iter()
            .filter(|found| !newcomer.outranks(&found.incumbent))
            .max_by(|a, b| a.incumbent.rank_against(&b.incumbent));
        if let Some(found) = strongest {
            debug!(
                reason = %found.reason,
                canonical = %found.incumbent.path.display(),
                "Duplicate found"
            );
            return DuplicateCheck::Duplicate {
                reason: found.reason,
                canonical: found.incumbent.clone(),
            };
        }

        for found in &matches {
            info!(
                reason = %found.reason,
                incumbent = %found.incumbent.path.display(),
                "Newcomer displaces canonical entry"
            );
        }
        DuplicateCheck::Displace {
            displaced: matches,
            guard,
        }
    }

    /// Drops displaced entries from both maps unless another entry already
    /// owns their keys.
    pub fn release(&self, displaced: &[CanonicalEntry]) {
        for incumbent in displaced {
            self.by_fingerprint
                .remove_if(&incumbent.fingerprint, |_, current| current == incumbent);
            if let Some(signature) = &incumbent.signature {
                self.by_signature
                    .remove_if(signature, |_, current| current == incumbent);
            }
        }
    }

    /// Records a newcomer as canonical; requires the guard from its check.
    ///
    /// Entries it displaced are released first.
    pub fn claim(&self, entry: CanonicalEntry, displaced: &[CanonicalEntry], _guard: &BucketGuard) {
        self.release(displaced);
        self.insert(entry);
    }

    /// A signature slot held by a better-ranked entry is never overwritten.
    fn insert(&self, entry: CanonicalEntry) {
        if let Some(signature) = &entry.signature {
            match self.by_signature.entry(signature.clone()) {
                Entry::Occupied(mut slot) => {
                    if !slot.get().outranks(&entry) {
                        slot.insert(entry.clone());
                    }
                }
                Entry::Vacant(slot) => {
                    slot.insert(entry.clone());
                }
            }
        }
        self.by_fingerprint.insert(entry.fingerprint.clone(), entry);
    }

    /// Current owner of an identity signature.
    #[must_use]
    pub fn signature_owner(&self, signature: &QuerySignature) -> Option<CanonicalEntry> {
        self.by_signature.get(signature).map(|entry| entry.value().clone())
    }
}
