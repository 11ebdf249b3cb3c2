//! PDF: trailer `/Info` dictionary plus an ISBN scan of the first pages.
//!
//! Only uncompressed Info objects are read; cross-reference streams that pack
//! the Info dictionary into an object stream yield no Info fields, and the
//! ISBN scan still runs.

use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::LazyLock;

use regex::bytes::Regex;

use super::{EmbeddedFields, PDF_ISBN_SCAN_BYTES, ReadError, scan, year_from_date};
use crate::metadata::CandidateMetadata;

/// Bytes read from each end of the file when looking for the trailer.
const TAIL_BYTES: u64 = 256 * 1024;

#[allow(clippy::expect_used)]
static INFO_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/Info\s+(\d+)\s+(\d+)\s+R").expect("Info reference regex is valid")
});

#[allow(clippy::expect_used)]
static ENCRYPT_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/Encrypt\s*(?:\d+\s+\d+\s+R|<<)").expect("Encrypt regex is valid"));

pub(super) fn read(path: &Path) -> Result<Vec<CandidateMetadata>, ReadError> {
    let unreadable = |reason: String| ReadError::unreadable(path, "pdf", reason);
    let mut file = std::fs::File::open(path).map_err(|e| unreadable(e.to_string()))?;
    let len = file.metadata().map_err(|e| unreadable(e.to_string()))?.len();

    let mut head = Vec::new();
    (&mut file)
        .take(PDF_ISBN_SCAN_BYTES as u64)
        .read_to_end(&mut head)
        .map_err(|e| unreadable(e.to_string()))?;
    if !head.starts_with(b"%PDF") {
        return Err(unreadable("missing %PDF header".to_string()));
    }

    let tail_start = len.saturating_sub(TAIL_BYTES);
    file.seek(SeekFrom::Start(tail_start))
        .map_err(|e| unreadable(e.to_string()))?;
    let mut tail = Vec::new();
    file.read_to_end(&mut tail)
        .map_err(|e| unreadable(e.to_string()))?;

    if ENCRYPT_REF.is_match(&tail) || ENCRYPT_REF.is_match(&head) {
        return Err(ReadError::encrypted(path));
    }

    let mut fields = find_info_dictionary(&tail)
        .or_else(|| find_info_dictionary(&head))
        .map(parse_info)
        .unwrap_or_default();
    fields.isbn = scan::scan_isbns(&String::from_utf8_lossy(&head)).into_iter().next();

    Ok(fields.into_candidate().into_iter().collect())
}

/// Locates the dictionary of the object referenced by the last `/Info N G R`.
fn find_info_dictionary(data: &[u8]) -> Option<&[u8]> {
    let cap = INFO_REF.captures_iter(data).last()?;
    let number = std::str::from_utf8(&cap[1]).ok()?;
    let generation = std::str::from_utf8(&cap[2]).ok()?;
    let header = Regex::new(&format!(r"(?:^|[^0-9]){number}\s+{generation}\s+obj")).ok()?;
    let object_start = header.find_iter(data).last()?.end();
    let rest = &data[object_start..];
    let object_end = find_subslice(rest, b"endobj").unwrap_or(rest.len());
    Some(&rest[..object_end])
}

fn parse_info(dict: &[u8]) -> EmbeddedFields {
    let title = string_value(dict, b"/Title");
    let authors = string_value(dict, b"/Author")
        .map(|author| {
            author
                .split([';', '&'])
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let year = string_value(dict, b"/CreationDate")
        .as_deref()
        .and_then(year_from_date);

    EmbeddedFields {
        title,
        authors,
        year,
        ..EmbeddedFields::default()
    }
}

/// Reads the literal or hex string following `key`, decoded to text.
fn string_value(dict: &[u8], key: &[u8]) -> Option<String> {
    let mut search_from = 0;
    while let Some(pos) = find_subslice(&dict[search_from..], key) {
        let after_key = search_from + pos + key.len();
        // `/Title` must not match `/TitleX`.
        if dict.get(after_key).is_some_and(|b| b.is_ascii_alphanumeric()) {
            search_from = after_key;
            continue;
        }
        let rest = &dict[after_key..];
        let start = rest.iter().position(|b| !b.is_ascii_whitespace())?;
        let raw = match rest[start] {
            b'(' => parse_literal(&rest[start + 1..])?,
            b'<' => parse_hex(&rest[start + 1..])?,
            _ => return None,
        };
        let text = decode_pdf_text(&raw);
        let text = crate::metadata::text::normalize_spaces(&text);
        return (!text.is_empty()).then_some(text);
    }
    None
}

fn parse_literal(data: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut i = 0;
    while i < data.len() {
        let b = data[i];
        match b {
            b'\\' => {
                let next = *data.get(i + 1)?;
                i += 1;
                match next {
                    b'n' => out.push(b'\n'),
                    b'r' => out.push(b'\r'),
                    b't' => out.push(b'\t'),
                    b'b' => out.push(0x08),
                    b'f' => out.push(0x0c),
                    b'0'..=b'7' => {
                        let digits: Vec<u8> = data[i..]
                            .iter()
                            .take(3)
                            .take_while(|d| (b'0'..=b'7').contains(d))
                            .copied()
                            .collect();
                        let value = digits
                            .iter()
                            .fold(0u32, |acc, d| acc * 8 + u32::from(d - b'0'));
                        out.push((value & 0xff) as u8);
                        i += digits.len() - 1;
                    }
                    b'\r' | b'\n' => {}
                    other => out.push(other),
                }
            }
            b'(' => {
                depth += 1;
                out.push(b);
            }
            b')' => {
                if depth == 0 {
                    return Some(out);
                }
                depth -= 1;
                out.push(b);
            }
            _ => out.push(b),
        }
        i += 1;
    }
    None
}

fn parse_hex(data: &[u8]) -> Option<Vec<u8>> {
    let end = data.iter().position(|b| *b == b'>')?;
    let mut digits: Vec<u8> = data[..end]
        .iter()
        .filter(|b| b.is_ascii_hexdigit())
        .copied()
        .collect();
    if digits.len() % 2 == 1 {
        digits.push(b'0');
    }
    digits
        .chunks(2)
        .map(|pair| {
            let text = std::str::from_utf8(pair).ok()?;
            u8::from_str_radix(text, 16).ok()
        })
        .collect()
}

/// UTF-16BE when the BOM is present, otherwise PDFDocEncoding read as Latin-1.
fn decode_pdf_text(raw: &[u8]) -> String {
    if let Some(body) = raw.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = body
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    if let Some(body) = raw.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(body).into_owned();
    }
    raw.iter().map(|&b| char::from(b)).collect()
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
