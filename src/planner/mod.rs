//! Destination planning: folder layout, canonical file names and uniqueness.
//!
//! The planner never touches file contents except to compare an existing
//! destination file with the incoming one. Paths handed out are reserved for
//! the rest of the run so concurrent files cannot be planned onto one path.

mod sanitize;

pub use sanitize::{MAX_COMPONENT_BYTES, MAX_COMPONENT_CHARS, display_author, sanitize_component};

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use dashmap::DashSet;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::metadata::{BookFile, ResolvedMetadata, fingerprint_file};

/// Default naming pattern.
pub const DEFAULT_PATTERN: &str = "{author} - {title} ({year})";

/// Rendered in place of a missing year.
pub const MISSING_YEAR: &str = "n.d.";

/// Folder used in genre mode when the genre is unknown.
pub const DEFAULT_GENRE: &str = "General";

const UNKNOWN_AUTHOR: &str = "Unknown Author";
const UNKNOWN_TITLE: &str = "Untitled";
const MAX_SUFFIX: usize = 9999;
const TOKENS: [&str; 3] = ["title", "author", "year"];

/// Errors raised while planning a destination.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlanError {
    /// The naming pattern is unusable.
    #[error("invalid naming pattern '{pattern}': {reason}\n  Suggestion: Use tokens {{title}}, {{author}} and {{year}}, e.g. \"{{author}} - {{title}} ({{year}})\"")]
    InvalidPattern { pattern: String, reason: String },

    /// Every numbered variant of a name is taken.
    #[error("no free name for {path}: suffixes (2) through (9999) are all taken\n  Suggestion: Clean up the destination folder")]
    PathCollision { path: PathBuf },
}

/// Folder layout under the destination root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrganizationMode {
    /// `<dest>/<Author>/`
    #[default]
    Author,
    /// `<dest>/<Genre>/<Author>/`
    GenreAuthor,
}

impl OrganizationMode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Author => "author",
            Self::GenreAuthor => "genre-author",
        }
    }
}

impl fmt::Display for OrganizationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrganizationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "author" => Ok(Self::Author),
            "genre-author" | "genre_author" | "genre" => Ok(Self::GenreAuthor),
            other => Err(format!(
                "invalid organization mode: {other} (expected author or genre-author)"
            )),
        }
    }
}

/// A validated file naming pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingPattern(String);

impl NamingPattern {
    /// Validates a pattern: only known tokens, balanced braces, `{title}` required.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::InvalidPattern`] describing the first problem.
    pub fn new(pattern: &str) -> Result<Self, PlanError> {
        let invalid = |reason: &str| PlanError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        let mut rest = pattern;
        let mut has_title = false;
        while let Some(open) = rest.find(['{', '}']) {
            if rest[open..].starts_with('}') {
                return Err(invalid("unmatched '}'"));
            }
            let after = &rest[open + 1..];
            let close = after.find('}').ok_or_else(|| invalid("unclosed '{'"))?;
            let token = &after[..close];
            if !TOKENS.contains(&token) {
                return Err(invalid(&format!("unknown token {{{token}}}")));
            }
            has_title |= token == "title";
            rest = &after[close + 1..];
        }
        if !has_title {
            return Err(invalid("pattern must contain {title}"));
        }
        Ok(Self(pattern.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Substitutes tokens; the result is not yet sanitized.
    #[must_use]
    pub fn render(&self, title: &str, author: &str, year: Option<i32>) -> String {
        let year = year.map_or_else(|| MISSING_YEAR.to_string(), |y| y.to_string());
        self.0
            .replace("{title}", title)
            .replace("{author}", author)
            .replace("{year}", &year)
    }
}

impl Default for NamingPattern {
    fn default() -> Self {
        Self(DEFAULT_PATTERN.to_string())
    }
}

impl fmt::Display for NamingPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A reserved destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedPath {
    /// Folder the file goes into.
    pub directory: PathBuf,
    /// Final file name including extension.
    pub file_name: String,
    /// `directory.join(file_name)`.
    pub path: PathBuf,
    /// Where a cover image would be stored, when covers are enabled.
    pub cover: Option<PathBuf>,
}

/// Result of planning one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanOutcome {
    Planned(PlannedPath),
    /// An identical file already sits at the canonical destination.
    AlreadyPresent(PathBuf),
}

/// Computes destinations and keeps them unique for one run.
#[derive(Debug)]
pub struct PathPlanner {
    root: PathBuf,
    mode: OrganizationMode,
    pattern: NamingPattern,
    covers: bool,
    covers_dir: String,
    reserved: DashSet<PathBuf>,
}

impl PathPlanner {
    /// Creates a planner rooted at the destination library.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, mode: OrganizationMode, pattern: NamingPattern) -> Self {
        Self {
            root: root.into(),
            mode,
            pattern,
            covers: false,
            covers_dir: "covers".to_string(),
            reserved: DashSet::new(),
        }
    }

    /// Enables cover planning under `<dest dir>/<covers_dir>/`.
    #[must_use]
    pub fn with_covers(mut self, enabled: bool, covers_dir: impl Into<String>) -> Self {
        self.covers = enabled;
        self.covers_dir = covers_dir.into();
        self
    }

    /// Destination root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Folder for a resolved record under the current mode.
    #[must_use]
    pub fn directory_for(&self, meta: &ResolvedMetadata) -> PathBuf {
        let author = author_component(meta);
        match self.mode {
            OrganizationMode::Author => self.root.join(author),
            OrganizationMode::GenreAuthor => {
                let genre = meta
                    .genre
                    .as_deref()
                    .map(sanitize_component)
                    .filter(|g| !g.is_empty())
                    .unwrap_or_else(|| DEFAULT_GENRE.to_string());
                self.root.join(genre).join(author)
            }
        }
    }

    /// Canonical file name (before any collision suffix).
    #[must_use]
    pub fn file_name_for(&self, meta: &ResolvedMetadata, extension: &str) -> String {
        let author = display_author(meta.primary_author());
        let title = if meta.title.trim().is_empty() {
            UNKNOWN_TITLE
        } else {
            meta.title.trim()
        };
        let rendered = self.pattern.render(title, &author, meta.year);
        let stem = Some(sanitize_component(&rendered))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| UNKNOWN_TITLE.to_string());
        format!("{stem}{}", extension.to_lowercase())
    }

    /// Plans and reserves the destination for a resolved file.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::PathCollision`] when every suffix is taken.
    #[instrument(skip(self, meta, book), fields(source = %book.path.display()))]
    pub fn plan(&self, meta: &ResolvedMetadata, book: &BookFile) -> Result<PlanOutcome, PlanError> {
        let directory = self.directory_for(meta);
        let file_name = self.file_name_for(meta, &book.extension());

        let path = match self.reserve_unique(&directory, &file_name, Some(book))? {
            Reservation::Reserved(path) => path,
            Reservation::AlreadyPresent(path) => {
                debug!(existing = %path.display(), "Identical file already in library");
                return Ok(PlanOutcome::AlreadyPresent(path));
            }
        };

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or(file_name);
        let cover = (self.covers && meta.cover_url.is_some()).then(|| {
            let stem = Path::new(&file_name)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            directory.join(&self.covers_dir).join(format!("{stem}.jpg"))
        });

        debug!(destination = %path.display(), "Planned destination");
        Ok(PlanOutcome::Planned(PlannedPath {
            directory,
            file_name,
            path,
            cover,
        }))
    }

    /// Reserves a unique path for `file_name` inside a special folder.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::PathCollision`] when every suffix is taken.
    pub fn reserve_in(&self, directory: &Path, file_name: &str) -> Result<PathBuf, PlanError> {
        match self.reserve_unique(directory, file_name, None)? {
            Reservation::Reserved(path) | Reservation::AlreadyPresent(path) => Ok(path),
        }
    }

    /// Marks an existing path as taken (e.g. a file just moved out of the way).
    pub fn reserve_existing(&self, path: &Path) {
        self.reserved.insert(path.to_path_buf());
    }

    /// Releases a reservation whose move did not happen.
    pub fn release(&self, path: &Path) {
        self.reserved.remove(path);
    }

    fn reserve_unique(
        &self,
        directory: &Path,
        file_name: &str,
        incoming: Option<&BookFile>,
    ) -> Result<Reservation, PlanError> {
        let (stem, ext) = split_extension(file_name);
        for n in 1..=MAX_SUFFIX {
            let name = if n == 1 {
                file_name.to_string()
            } else {
                format!("{stem} ({n}){ext}")
            };
            let candidate = directory.join(name);

            if self.reserved.contains(&candidate) {
                continue;
            }
            if candidate.exists() {
                if let Some(book) = incoming
                    && same_content(&candidate, book)
                {
                    return Ok(Reservation::AlreadyPresent(candidate));
                }
                continue;
            }
            if self.reserved.insert(candidate.clone()) {
                return Ok(Reservation::Reserved(candidate));
            }
        }
        Err(PlanError::PathCollision {
            path: directory.join(file_name),
        })
    }
}

enum Reservation {
    Reserved(PathBuf),
    AlreadyPresent(PathBuf),
}

fn author_component(meta: &ResolvedMetadata) -> String {
    Some(sanitize_component(&display_author(meta.primary_author())))
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string())
}

fn split_extension(file_name: &str) -> (&str, &str) {
    match file_name.rfind('.') {
        Some(pos) if pos > 0 => (&file_name[..pos], &file_name[pos..]),
        _ => (file_name, ""),
    }
}

fn same_content(existing: &Path, book: &BookFile) -> bool {
    let Ok(meta) = std::fs::metadata(existing) else {
        return false;
    };
    if meta.len() != book.size || existing == book.path {
        return false;
    }
    fingerprint_file(existing).is_ok_and(|fingerprint| fingerprint == book.fingerprint)
}
