//! Discovered book files and their container formats.

use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

/// Read buffer used while fingerprinting.
const FINGERPRINT_CHUNK_BYTES: usize = 1024 * 1024;

/// Container format, detected from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookFormat {
    Epub,
    Pdf,
    Mobi,
    Azw3,
    Djvu,
    Docx,
    Other,
}

impl BookFormat {
    /// Detects the format from a path's extension (case-insensitive).
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "epub" => Self::Epub,
            "pdf" => Self::Pdf,
            "mobi" | "prc" => Self::Mobi,
            "azw3" | "azw" => Self::Azw3,
            "djvu" | "djv" => Self::Djvu,
            "docx" => Self::Docx,
            _ => Self::Other,
        }
    }

    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Epub => "epub",
            Self::Pdf => "pdf",
            Self::Mobi => "mobi",
            Self::Azw3 => "azw3",
            Self::Djvu => "djvu",
            Self::Docx => "docx",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for BookFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BookFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "epub" => Ok(Self::Epub),
            "pdf" => Ok(Self::Pdf),
            "mobi" => Ok(Self::Mobi),
            "azw3" => Ok(Self::Azw3),
            "djvu" => Ok(Self::Djvu),
            "docx" => Ok(Self::Docx),
            "other" => Ok(Self::Other),
            _ => Err(format!("invalid book format: {s}")),
        }
    }
}

/// A source file discovered for processing.
///
/// Immutable once built; the fingerprint is the SHA-256 of the file bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookFile {
    /// Absolute path of the file at discovery time.
    pub path: PathBuf,
    /// Container format detected from the extension.
    pub format: BookFormat,
    /// File size in bytes.
    pub size: u64,
    /// Lowercase hex SHA-256 of the file contents.
    pub fingerprint: String,
    /// Position in the run's discovery order.
    pub discovery_index: usize,
}

impl BookFile {
    /// Inspects a file on disk: size, format and content fingerprint.
    ///
    /// Hashing runs on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file cannot be stat'ed or read.
    #[instrument(skip(path), fields(path = %path.display()))]
    pub async fn inspect(path: &Path, discovery_index: usize) -> std::io::Result<Self> {
        let path = std::path::absolute(path)?;
        let size = tokio::fs::metadata(&path).await?.len();
        let owned = path.clone();
        let fingerprint = tokio::task::spawn_blocking(move || fingerprint_file(&owned))
            .await
            .map_err(std::io::Error::other)??;

        debug!(size, %fingerprint, "inspected book file");
        Ok(Self {
            format: BookFormat::from_path(&path),
            path,
            size,
            fingerprint,
            discovery_index,
        })
    }

    /// File name without directory or extension.
    #[must_use]
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Lowercased extension including the dot, or an empty string.
    #[must_use]
    pub fn extension(&self) -> String {
        self.path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default()
    }
}

/// Computes the SHA-256 of a file in fixed-size chunks.
///
/// # Errors
///
/// Returns an IO error if the file cannot be opened or read.
pub fn fingerprint_file(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; FINGERPRINT_CHUNK_BYTES];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_format_from_path_is_case_insensitive() {
        assert_eq!(BookFormat::from_path(Path::new("a/B.EPUB")), BookFormat::Epub);
        assert_eq!(BookFormat::from_path(Path::new("x.Pdf")), BookFormat::Pdf);
        assert_eq!(BookFormat::from_path(Path::new("x.azw3")), BookFormat::Azw3);
        assert_eq!(BookFormat::from_path(Path::new("x.prc")), BookFormat::Mobi);
        assert_eq!(BookFormat::from_path(Path::new("x.fb2")), BookFormat::Other);
        assert_eq!(BookFormat::from_path(Path::new("noext")), BookFormat::Other);
    }

    #[test]
    fn test_format_round_trips_through_str() {
        for format in [
            BookFormat::Epub,
            BookFormat::Pdf,
            BookFormat::Mobi,
            BookFormat::Azw3,
            BookFormat::Djvu,
            BookFormat::Docx,
            BookFormat::Other,
        ] {
            assert_eq!(format.as_str().parse::<BookFormat>().unwrap(), format);
        }
        assert!("cbz".parse::<BookFormat>().is_err());
    }

    #[test]
    fn test_fingerprint_matches_sha256_of_contents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("book.txt");
        std::fs::write(&path, b"test content").unwrap();

        let expected = format!("{:x}", Sha256::digest(b"test content"));
        assert_eq!(fingerprint_file(&path).unwrap(), expected);
    }

    #[tokio::test]
    async fn test_inspect_reads_size_format_and_stem() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Jane Doe - My Book (2019).EPUB");
        std::fs::write(&path, b"not really a zip").unwrap();

        let book = BookFile::inspect(&path, 3).await.unwrap();
        assert_eq!(book.format, BookFormat::Epub);
        assert_eq!(book.size, 16);
        assert_eq!(book.discovery_index, 3);
        assert_eq!(book.stem(), "Jane Doe - My Book (2019)");
        assert_eq!(book.extension(), ".epub");
        assert!(book.path.is_absolute());
    }

    #[tokio::test]
    async fn test_inspect_missing_file_errors() {
        let dir = TempDir::new().unwrap();
        let result = BookFile::inspect(&dir.path().join("missing.pdf"), 0).await;
        assert!(result.is_err());
    }
}
