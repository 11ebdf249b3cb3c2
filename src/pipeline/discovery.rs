//! Source tree traversal.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::config::Config;

use super::PipelineError;

/// One file found under the source folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    /// Position in the sorted discovery order.
    pub index: usize,
    /// Extension is on the excluded list.
    pub excluded: bool,
}

/// Lists every regular file under the source folder in sorted path order.
///
/// Hidden entries, the special folders and the destination tree (when it
/// lives inside the source) are skipped.
///
/// # Errors
///
/// Returns [`PipelineError::Discovery`] when the source root cannot be read.
pub fn discover(source: &Path, config: &Config) -> Result<Vec<DiscoveredFile>, PipelineError> {
    let destination =
        std::path::absolute(&config.destination).unwrap_or_else(|_| config.destination.clone());
    let root = std::path::absolute(source).map_err(|e| PipelineError::Discovery {
        path: source.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut paths = Vec::new();
    let walker = WalkDir::new(&root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| keep_entry(entry, &destination, config));

    for entry in walker {
        match entry {
            Ok(entry) if entry.file_type().is_file() => paths.push(entry.into_path()),
            Ok(_) => {}
            Err(error) if error.depth() == 0 => {
                return Err(PipelineError::Discovery {
                    path: root,
                    reason: error.to_string(),
                });
            }
            Err(error) => warn!(error = %error, "Skipping unreadable entry"),
        }
    }
    paths.sort();

    let files: Vec<DiscoveredFile> = paths
        .into_iter()
        .enumerate()
        .map(|(index, path)| DiscoveredFile {
            excluded: config.is_excluded_extension(&path),
            path,
            index,
        })
        .collect();
    debug!(count = files.len(), "Discovered source files");
    Ok(files)
}

fn keep_entry(entry: &DirEntry, destination: &Path, config: &Config) -> bool {
    if entry.depth() == 0 {
        return true;
    }
    let name = entry.file_name().to_string_lossy();
    if name.starts_with('.') {
        return false;
    }
    if entry.file_type().is_dir() {
        if entry.path() == destination {
            return false;
        }
        // Special folders only matter at the library root.
        if config.dirs.contains(&name) && entry.path().parent() == Some(destination) {
            return false;
        }
    }
    true
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn test_discovery_is_sorted_and_flags_excluded() {
        let src = tempfile::tempdir().unwrap();
        fs::create_dir_all(src.path().join("b")).unwrap();
        fs::write(src.path().join("b/z.epub"), b"z").unwrap();
        fs::write(src.path().join("a.pdf"), b"a").unwrap();
        fs::write(src.path().join("c.zip"), b"c").unwrap();
        fs::write(src.path().join(".hidden.epub"), b"h").unwrap();

        let config = Config::new(src.path().join("out"));
        let files = discover(src.path(), &config).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|f| f.path.strip_prefix(src.path()).unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.pdf", "b/z.epub", "c.zip"]);
        assert_eq!(files.iter().map(|f| f.index).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert!(files[2].excluded);
        assert!(!files[0].excluded);
    }

    #[test]
    fn test_destination_inside_source_is_skipped() {
        let src = tempfile::tempdir().unwrap();
        fs::create_dir_all(src.path().join("library/Jane Doe")).unwrap();
        fs::write(src.path().join("library/Jane Doe/x.epub"), b"x").unwrap();
        fs::write(src.path().join("new.epub"), b"n").unwrap();

        let config = Config::new(src.path().join("library"));
        let files = discover(src.path(), &config).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].path.ends_with("new.epub"));
    }

    #[test]
    fn test_special_folders_skipped_when_source_is_library() {
        let lib = tempfile::tempdir().unwrap();
        fs::create_dir_all(lib.path().join("3. Duplicates")).unwrap();
        fs::write(lib.path().join("3. Duplicates/x.epub"), b"x").unwrap();
        fs::write(lib.path().join("incoming.epub"), b"n").unwrap();

        let config = Config::new(lib.path());
        let files = discover(lib.path(), &config).unwrap();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_missing_source_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new(dir.path());
        assert!(matches!(
            discover(&dir.path().join("missing"), &config),
            Err(PipelineError::Discovery { .. })
        ));
    }
}
