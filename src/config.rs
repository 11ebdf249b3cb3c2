//! Run configuration and its pre-flight validation.
//!
//! Everything here is checked before a single file is touched: these are
//! the only failures that stop a run outright.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::planner::{DEFAULT_PATTERN, NamingPattern, OrganizationMode};
use crate::reconcile::ReconcilePolicy;
use crate::resolver::{DEFAULT_MIN_CONFIDENCE, DEFAULT_REMOTE_TIMEOUT};

/// Minimum allowed concurrency value.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
pub const MAX_CONCURRENCY: usize = 100;

/// Default number of files processed at once.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// File name of the cache and ledger database inside the logs folder.
pub const DATABASE_FILE_NAME: &str = "bookshelf.db";

/// Extensions recorded as excluded and left where they are.
pub const DEFAULT_EXCLUDED_EXTENSIONS: [&str; 7] =
    ["zip", "rar", "7z", "exe", "part", "tmp", "crdownload"];

/// Configuration errors found before processing starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("source folder not found: {path}\n  Suggestion: Check the path passed as SRC")]
    SourceMissing { path: PathBuf },

    #[error("no source folder configured\n  Suggestion: Pass the folder to organize as SRC")]
    NoSource,

    #[error("destination folder is not writable: {path}: {reason}\n  Suggestion: Choose a folder you can write to")]
    DestinationUnwritable { path: PathBuf, reason: String },

    #[error("{0}")]
    InvalidPattern(String),

    #[error("invalid value for {name}: {value} (expected {expected})\n  Suggestion: Adjust the setting in your config file or on the command line")]
    InvalidValue {
        name: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}")]
    InvalidConcurrency { value: usize },
}

impl ConfigError {
    fn unit_interval(name: &'static str, value: f64) -> Self {
        Self::InvalidValue {
            name,
            value: value.to_string(),
            expected: "a number between 0 and 1",
        }
    }
}

/// Names of the special folders kept at the destination root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecialDirs {
    pub logs: String,
    pub unlocated: String,
    pub duplicates: String,
    pub excluded: String,
    /// Per-author folder holding planned cover images.
    pub covers: String,
}

impl Default for SpecialDirs {
    fn default() -> Self {
        Self {
            logs: "1. logs".to_string(),
            unlocated: "2. Unlocated".to_string(),
            duplicates: "3. Duplicates".to_string(),
            excluded: "4. Excluded".to_string(),
            covers: "covers".to_string(),
        }
    }
}

impl SpecialDirs {
    /// True when a directory name is one of the special folders.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        [
            &self.logs,
            &self.unlocated,
            &self.duplicates,
            &self.excluded,
            &self.covers,
        ]
        .iter()
        .any(|dir| dir.as_str() == name)
    }
}

/// Settings for one run or one library maintenance command.
#[derive(Debug, Clone)]
pub struct Config {
    pub source: Option<PathBuf>,
    pub destination: PathBuf,
    pub mode: OrganizationMode,
    pub pattern: String,
    pub covers: bool,
    pub google_api_key: Option<String>,
    pub normalize_text: bool,
    pub concurrency: usize,
    pub remote_timeout: Duration,
    pub resolver_min_confidence: f64,
    pub policy: ReconcilePolicy,
    pub database_path: Option<PathBuf>,
    pub dirs: SpecialDirs,
    pub excluded_extensions: Vec<String>,
    pub dry_run: bool,
}

impl Config {
    /// Configuration for a library rooted at `destination`, with defaults.
    #[must_use]
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            source: None,
            destination: destination.into(),
            mode: OrganizationMode::default(),
            pattern: DEFAULT_PATTERN.to_string(),
            covers: false,
            google_api_key: None,
            normalize_text: false,
            concurrency: DEFAULT_CONCURRENCY,
            remote_timeout: DEFAULT_REMOTE_TIMEOUT,
            resolver_min_confidence: DEFAULT_MIN_CONFIDENCE,
            policy: ReconcilePolicy::default(),
            database_path: None,
            dirs: SpecialDirs::default(),
            excluded_extensions: DEFAULT_EXCLUDED_EXTENSIONS
                .iter()
                .map(ToString::to_string)
                .collect(),
            dry_run: false,
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<PathBuf>) -> Self {
        self.source = Some(source.into());
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: OrganizationMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = pattern.into();
        self
    }

    #[must_use]
    pub fn with_covers(mut self, covers: bool) -> Self {
        self.covers = covers;
        self
    }

    #[must_use]
    pub fn with_google_api_key(mut self, key: Option<String>) -> Self {
        self.google_api_key = key.filter(|k| !k.trim().is_empty());
        self
    }

    #[must_use]
    pub fn with_text_normalization(mut self, enabled: bool) -> Self {
        self.normalize_text = enabled;
        self
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    #[must_use]
    pub fn with_remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_resolver_min_confidence(mut self, floor: f64) -> Self {
        self.resolver_min_confidence = floor;
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: ReconcilePolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_excluded_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.excluded_extensions = extensions
            .into_iter()
            .map(|e| e.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        self
    }

    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Cache and ledger database location.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| self.logs_dir().join(DATABASE_FILE_NAME))
    }

    #[must_use]
    pub fn logs_dir(&self) -> PathBuf {
        self.destination.join(&self.dirs.logs)
    }

    #[must_use]
    pub fn unlocated_dir(&self) -> PathBuf {
        self.destination.join(&self.dirs.unlocated)
    }

    #[must_use]
    pub fn duplicates_dir(&self) -> PathBuf {
        self.destination.join(&self.dirs.duplicates)
    }

    #[must_use]
    pub fn excluded_dir(&self) -> PathBuf {
        self.destination.join(&self.dirs.excluded)
    }

    /// True when files with this extension are skipped.
    #[must_use]
    pub fn is_excluded_extension(&self, path: &Path) -> bool {
        path.extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .is_some_and(|ext| self.excluded_extensions.iter().any(|x| *x == ext))
    }

    /// Parsed naming pattern.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPattern`] for unknown tokens or a missing `{title}`.
    pub fn naming_pattern(&self) -> Result<NamingPattern, ConfigError> {
        NamingPattern::new(&self.pattern).map_err(|e| ConfigError::InvalidPattern(e.to_string()))
    }

    /// Checks every setting that does not need the filesystem.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting found.
    pub fn validate_settings(&self) -> Result<(), ConfigError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&self.concurrency) {
            return Err(ConfigError::InvalidConcurrency {
                value: self.concurrency,
            });
        }
        self.naming_pattern()?;

        for (name, value) in [
            ("resolver_min_confidence", self.resolver_min_confidence),
            ("similarity_threshold", self.policy.similarity_threshold),
            ("acceptance_floor", self.policy.acceptance_floor),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::unit_interval(name, value));
            }
        }
        for (tag, weight) in self.policy.weights.entries() {
            if !weight.is_finite() || weight <= 0.0 {
                return Err(ConfigError::InvalidValue {
                    name: "source weight",
                    value: format!("{tag}={weight}"),
                    expected: "a positive number",
                });
            }
        }
        if self.remote_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "remote_timeout",
                value: "0".to_string(),
                expected: "at least one second",
            });
        }
        Ok(())
    }

    /// Full pre-flight check for a library command: settings plus a writable
    /// destination (created if missing).
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate_library(&self) -> Result<(), ConfigError> {
        self.validate_settings()?;
        ensure_writable(&self.destination)?;
        ensure_writable(&self.logs_dir())
    }

    /// Full pre-flight check for an organize run.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoSource`] or [`ConfigError::SourceMissing`] for
    /// a bad source, otherwise whatever [`Config::validate_library`] reports.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let source = self.source.as_ref().ok_or(ConfigError::NoSource)?;
        if !source.is_dir() {
            return Err(ConfigError::SourceMissing {
                path: source.clone(),
            });
        }
        self.validate_library()
    }
}

fn ensure_writable(dir: &Path) -> Result<(), ConfigError> {
    let unwritable = |reason: std::io::Error| ConfigError::DestinationUnwritable {
        path: dir.to_path_buf(),
        reason: reason.to_string(),
    };
    fs::create_dir_all(dir).map_err(unwritable)?;
    let probe = dir.join(format!(".bookshelf-write-probe-{}", std::process::id()));
    fs::write(&probe, b"").map_err(unwritable)?;
    let _ = fs::remove_file(&probe);
    debug!(dir = %dir.display(), "Destination is writable");
    Ok(())
}
