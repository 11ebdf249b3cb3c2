//! Processing record types: stages, final statuses and reason codes.

use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Pipeline stage a record has reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// File found in the source tree.
    Discovered,
    /// Embedded metadata and filename parsed.
    Read,
    /// Reconciliation finished.
    Resolved,
    /// Duplicate check finished.
    Checked,
    /// Destination computed.
    Planned,
    /// Outcome recorded.
    Finalized,
}

impl Stage {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Read => "read",
            Self::Resolved => "resolved",
            Self::Checked => "checked",
            Self::Planned => "planned",
            Self::Finalized => "finalized",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "discovered" => Ok(Self::Discovered),
            "read" => Ok(Self::Read),
            "resolved" => Ok(Self::Resolved),
            "checked" => Ok(Self::Checked),
            "planned" => Ok(Self::Planned),
            "finalized" => Ok(Self::Finalized),
            _ => Err(format!("invalid stage: {s}")),
        }
    }
}

/// Final classification of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// Moved into the library as the canonical copy.
    Organized,
    /// Recognized as a copy of a canonical entry.
    Duplicate,
    /// Metadata could not be resolved.
    Unlocated,
    /// Skipped by extension or by the user.
    Excluded,
}

impl RecordStatus {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Organized => "organized",
            Self::Duplicate => "duplicate",
            Self::Unlocated => "unlocated",
            Self::Excluded => "excluded",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RecordStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "organized" => Ok(Self::Organized),
            "duplicate" => Ok(Self::Duplicate),
            "unlocated" => Ok(Self::Unlocated),
            "excluded" => Ok(Self::Excluded),
            _ => Err(format!("invalid record status: {s}")),
        }
    }
}

/// Stable reason strings recorded for every non-organized outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReasonCode {
    IdenticalBytes,
    SameWork,
    NoUsableSignal,
    BelowConfidenceFloor,
    IncompleteMetadata,
    UnsupportedFileType,
    ExcludedByUser,
    MoveFailed,
}

impl ReasonCode {
    /// Returns the persisted reason string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IdenticalBytes => "identical bytes",
            Self::SameWork => "same work, different encoding",
            Self::NoUsableSignal => "no usable signal",
            Self::BelowConfidenceFloor => "below confidence floor",
            Self::IncompleteMetadata => "incomplete metadata",
            Self::UnsupportedFileType => "unsupported file type",
            Self::ExcludedByUser => "excluded by user",
            Self::MoveFailed => "move failed",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReasonCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Self::IdenticalBytes,
            Self::SameWork,
            Self::NoUsableSignal,
            Self::BelowConfidenceFloor,
            Self::IncompleteMetadata,
            Self::UnsupportedFileType,
            Self::ExcludedByUser,
            Self::MoveFailed,
        ]
        .into_iter()
        .find(|code| code.as_str() == s)
        .ok_or_else(|| format!("invalid reason code: {s}"))
    }
}

/// One persisted processing record.
#[derive(Debug, Clone, FromRow)]
pub struct ProcessingRecord {
    /// Unique identifier.
    pub id: i64,
    /// Run that produced the record.
    pub run_id: String,
    /// Position in the run's sorted discovery order.
    pub discovery_index: i64,
    /// Where the file was found.
    pub source_path: String,
    /// Detected container format.
    pub format: String,
    /// File size in bytes.
    pub size_bytes: i64,
    /// SHA-256 of the file contents, lowercase hex.
    pub fingerprint: Option<String>,
    /// Stage as stored text, parsed via `stage()`.
    #[sqlx(rename = "stage")]
    pub stage_str: String,
    /// Status as stored text, parsed via `status()`.
    #[sqlx(rename = "status")]
    pub status_str: Option<String>,
    /// Where the file ended up.
    pub final_path: Option<String>,
    /// Reason string when not organized.
    pub reason: Option<String>,
    pub title: Option<String>,
    /// Primary author.
    pub author: Option<String>,
    pub year: Option<i64>,
    pub genre: Option<String>,
    pub isbn: Option<String>,
    /// Reconciled confidence.
    pub confidence: Option<f64>,
    /// Query signature used for identity checks.
    pub signature: Option<String>,
    /// Planned cover location.
    pub cover_path: Option<String>,
    /// Remote cover URL, if any.
    pub cover_url: Option<String>,
    /// Per-field provenance summary.
    pub provenance: Option<String>,
    /// Record this one supersedes through a manual correction.
    pub corrects: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

impl ProcessingRecord {
    /// Returns the parsed stage; invalid text falls back to `Discovered`.
    #[must_use]
    pub fn stage(&self) -> Stage {
        self.stage_str.parse().unwrap_or(Stage::Discovered)
    }

    /// Returns the parsed status, `None` until finalized.
    #[must_use]
    pub fn status(&self) -> Option<RecordStatus> {
        self.status_str.as_deref().and_then(|s| s.parse().ok())
    }

    /// Returns the parsed reason code.
    #[must_use]
    pub fn reason_code(&self) -> Option<ReasonCode> {
        self.reason.as_deref().and_then(|s| s.parse().ok())
    }

    /// Whether the record has reached its final stage.
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.stage() == Stage::Finalized
    }
}

impl fmt::Display for ProcessingRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ProcessingRecord {{ id: {}, source: {}, status: {} }}",
            self.id,
            self.source_path,
            self.status().map_or("pending", |s| s.as_str())
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_round_trips_through_text() {
        for stage in [
            Stage::Discovered,
            Stage::Read,
            Stage::Resolved,
            Stage::Checked,
            Stage::Planned,
            Stage::Finalized,
        ] {
            assert_eq!(stage.as_str().parse::<Stage>().unwrap(), stage);
        }
        assert!("lost".parse::<Stage>().is_err());
    }

    #[test]
    fn test_stage_order_follows_pipeline() {
        assert!(Stage::Discovered < Stage::Read);
        assert!(Stage::Planned < Stage::Finalized);
    }

    #[test]
    fn test_reason_codes_are_stable() {
        assert_eq!(ReasonCode::IdenticalBytes.as_str(), "identical bytes");
        assert_eq!(ReasonCode::SameWork.to_string(), "same work, different encoding");
        assert_eq!(
            "below confidence floor".parse::<ReasonCode>().unwrap(),
            ReasonCode::BelowConfidenceFloor
        );
        assert!("other".parse::<ReasonCode>().is_err());
    }

    #[test]
    fn test_record_status_display() {
        assert_eq!(RecordStatus::Organized.to_string(), "organized");
        assert_eq!(
            "unlocated".parse::<RecordStatus>().unwrap(),
            RecordStatus::Unlocated
        );
    }
}
