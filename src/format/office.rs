//! DOCX: Dublin Core properties in `docProps/core.xml`.

use std::path::Path;

use super::epub::read_entry;
use super::xml::{element_texts, first_element};
use super::{EmbeddedFields, ReadError, year_from_date};
use crate::metadata::CandidateMetadata;

const CORE_PROPERTIES: &str = "docProps/core.xml";

pub(super) fn read(path: &Path) -> Result<Vec<CandidateMetadata>, ReadError> {
    let unreadable = |reason: String| ReadError::unreadable(path, "docx", reason);
    let file = std::fs::File::open(path).map_err(|e| unreadable(e.to_string()))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| unreadable(e.to_string()))?;

    // A document without core properties is valid; it just carries no metadata.
    let Ok(core) = read_entry(&mut archive, CORE_PROPERTIES) else {
        return Ok(Vec::new());
    };
    Ok(parse_core(&core).into_candidate().into_iter().collect())
}

fn parse_core(core: &str) -> EmbeddedFields {
    EmbeddedFields {
        title: first_element(core, "dc:title"),
        authors: element_texts(core, "dc:creator")
            .into_iter()
            .flat_map(|creator| split_creators(&creator))
            .collect(),
        year: first_element(core, "dcterms:created")
            .as_deref()
            .and_then(year_from_date),
        genre: first_element(core, "cp:keywords").or_else(|| first_element(core, "dc:subject")),
        isbn: None,
    }
}

// Word joins multiple authors with semicolons in a single creator element.
fn split_creators(creator: &str) -> Vec<String> {
    creator
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
