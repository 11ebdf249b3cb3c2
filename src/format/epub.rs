//! EPUB: OPF package metadata located through `META-INF/container.xml`.

use std::io::Read;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use super::xml::{element_texts, first_element};
use super::{EmbeddedFields, ReadError, year_from_date};
use crate::metadata::{CandidateMetadata, isbn};

#[allow(clippy::expect_used)]
static ROOTFILE_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<rootfile\b[^>]*\bfull-path\s*=\s*["']([^"']+)["']"#)
        .expect("rootfile regex is valid")
});

const CONTAINER_PATH: &str = "META-INF/container.xml";

pub(super) fn read(path: &Path) -> Result<Vec<CandidateMetadata>, ReadError> {
    let file = std::fs::File::open(path).map_err(|e| unreadable(path, e.to_string()))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| unreadable(path, e.to_string()))?;

    let opf_path = locate_opf(&mut archive).ok_or_else(|| unreadable(path, "no OPF package document"))?;
    let opf = read_entry(&mut archive, &opf_path).map_err(|e| unreadable(path, e))?;

    Ok(parse_opf(&opf).into_candidate().into_iter().collect())
}

fn unreadable(path: &Path, reason: impl Into<String>) -> ReadError {
    ReadError::unreadable(path, "epub", reason)
}

fn locate_opf<R: std::io::Read + std::io::Seek>(archive: &mut zip::ZipArchive<R>) -> Option<String> {
    if let Ok(container) = read_entry(archive, CONTAINER_PATH)
        && let Some(cap) = ROOTFILE_PATH.captures(&container)
    {
        let declared = cap[1].to_string();
        if archive.index_for_name(&declared).is_some() {
            return Some(declared);
        }
    }
    archive
        .file_names()
        .find(|name| name.to_ascii_lowercase().ends_with(".opf"))
        .map(str::to_string)
}

pub(super) fn read_entry<R: std::io::Read + std::io::Seek>(
    archive: &mut zip::ZipArchive<R>,
    name: &str,
) -> Result<String, String> {
    let mut entry = archive.by_name(name).map_err(|e| format!("{name}: {e}"))?;
    let mut bytes = Vec::new();
    entry
        .read_to_end(&mut bytes)
        .map_err(|e| format!("{name}: {e}"))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

pub(super) fn parse_opf(opf: &str) -> EmbeddedFields {
    EmbeddedFields {
        title: first_element(opf, "dc:title"),
        authors: element_texts(opf, "dc:creator"),
        year: first_element(opf, "dc:date").as_deref().and_then(year_from_date),
        genre: first_element(opf, "dc:subject"),
        isbn: element_texts(opf, "dc:identifier")
            .iter()
            .find_map(|id| isbn::normalize(id)),
    }
}
