//! MOBI / AZW3: PalmDB container, MOBI header and EXTH records.
//!
//! Layout (all integers big-endian):
//! - PalmDB header: type/creator at 60..68, record count at 76, record list at 78
//! - record 0: PalmDOC header (16 bytes), then `MOBI` header
//! - EXTH block follows the MOBI header when flag `0x40` is set at offset 128

use std::path::Path;

use super::{EmbeddedFields, ReadError, year_from_date};
use crate::metadata::CandidateMetadata;

const PALMDB_HEADER_LEN: usize = 78;
const RECORD_ENTRY_LEN: usize = 8;

const EXTH_AUTHOR: u32 = 100;
const EXTH_ISBN: u32 = 104;
const EXTH_SUBJECT: u32 = 105;
const EXTH_PUBLISHING_DATE: u32 = 106;
const EXTH_UPDATED_TITLE: u32 = 503;

const ENCODING_UTF8: u32 = 65001;

pub(super) fn read(path: &Path) -> Result<Vec<CandidateMetadata>, ReadError> {
    let data = std::fs::read(path).map_err(|e| ReadError::unreadable(path, "mobi", e.to_string()))?;
    let fields = parse(&data).map_err(|reason| ReadError::unreadable(path, "mobi", reason))?;
    Ok(fields.into_candidate().into_iter().collect())
}

fn parse(data: &[u8]) -> Result<EmbeddedFields, String> {
    let kind = data.get(60..68).ok_or("truncated PalmDB header")?;
    if kind != b"BOOKMOBI" && kind != b"TEXtREAd" {
        return Err("not a MOBI container".to_string());
    }
    let record_count = usize::from(be_u16(data, 76).ok_or("truncated PalmDB header")?);
    if record_count == 0 {
        return Err("no records".to_string());
    }
    let record_list_end = PALMDB_HEADER_LEN + record_count * RECORD_ENTRY_LEN;
    if data.len() < record_list_end {
        return Err("truncated record list".to_string());
    }

    let record0_start = be_u32(data, PALMDB_HEADER_LEN).ok_or("bad record offset")? as usize;
    let record0_end = if record_count > 1 {
        be_u32(data, PALMDB_HEADER_LEN + RECORD_ENTRY_LEN).ok_or("bad record offset")? as usize
    } else {
        data.len()
    };
    let record0 = data
        .get(record0_start..record0_end.min(data.len()))
        .ok_or("record 0 out of bounds")?;

    // Plain PalmDOC files have no MOBI header and no metadata.
    if record0.get(16..20) != Some(b"MOBI".as_slice()) {
        return Ok(EmbeddedFields::default());
    }

    let header_len = be_u32(record0, 20).ok_or("truncated MOBI header")? as usize;
    let encoding = be_u32(record0, 28).unwrap_or(ENCODING_UTF8);
    let decode = |bytes: &[u8]| decode_text(bytes, encoding);

    let full_name = be_u32(record0, 84)
        .zip(be_u32(record0, 88))
        .and_then(|(offset, len)| record0.get(offset as usize..(offset as usize).checked_add(len as usize)?))
        .map(decode)
        .filter(|s| !s.trim().is_empty());

    let mut fields = EmbeddedFields {
        title: full_name,
        ..EmbeddedFields::default()
    };

    let exth_flags = be_u32(record0, 128).unwrap_or(0);
    if exth_flags & 0x40 != 0 {
        let exth_start = 16 + header_len;
        for (kind, payload) in exth_records(record0, exth_start) {
            let value = decode(payload);
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match kind {
                EXTH_AUTHOR => fields.authors.push(value.to_string()),
                EXTH_ISBN if fields.isbn.is_none() => fields.isbn = Some(value.to_string()),
                EXTH_SUBJECT if fields.genre.is_none() => fields.genre = Some(value.to_string()),
                EXTH_PUBLISHING_DATE if fields.year.is_none() => fields.year = year_from_date(value),
                EXTH_UPDATED_TITLE => fields.title = Some(value.to_string()),
                _ => {}
            }
        }
    }

    Ok(fields)
}

fn exth_records(record0: &[u8], start: usize) -> Vec<(u32, &[u8])> {
    let mut records = Vec::new();
    if record0.get(start..start + 4) != Some(b"EXTH".as_slice()) {
        return records;
    }
    let Some(count) = be_u32(record0, start + 8) else {
        return records;
    };
    let mut cursor = start + 12;
    for _ in 0..count {
        let (Some(kind), Some(len)) = (be_u32(record0, cursor), be_u32(record0, cursor + 4)) else {
            break;
        };
        let len = len as usize;
        if len < 8 {
            break;
        }
        let Some(payload) = record0.get(cursor + 8..cursor + len) else {
            break;
        };
        records.push((kind, payload));
        cursor += len;
    }
    records
}

fn decode_text(bytes: &[u8], encoding: u32) -> String {
    if encoding == ENCODING_UTF8 {
        String::from_utf8_lossy(bytes).into_owned()
    } else {
        // CP1252 differs from Latin-1 only in 0x80..0xA0, which titles rarely use.
        bytes.iter().map(|&b| char::from(b)).collect()
    }
}

fn be_u16(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

fn be_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}
