//! Filesystem-safe path components built from bibliographic text.

use std::path::{Component, Path};

use crate::metadata::text;

/// Longest component, in characters, the planner will emit.
pub const MAX_COMPONENT_CHARS: usize = 180;

/// Longest component in UTF-8 bytes. Leaves room under the usual 255-byte
/// name limit for a ` (n)` collision suffix and the file extension.
pub const MAX_COMPONENT_BYTES: usize = 200;

/// Makes one path component safe on common filesystems.
///
/// Reserved characters `< > : " / \ | ? *` and control characters become
/// `-`, runs of `-`/`_` collapse to one, trailing dots and spaces are trimmed
/// and the result is capped at [`MAX_COMPONENT_CHARS`] characters and
/// [`MAX_COMPONENT_BYTES`] bytes, never splitting a character. Unicode
/// letters and diacritics are preserved.
#[must_use]
pub fn sanitize_component(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut prev_sep = false;
    for ch in text::normalize_spaces(value).chars() {
        let mapped = match ch {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '-',
            c if c.is_control() => '-',
            c => c,
        };
        let is_sep = matches!(mapped, '-' | '_');
        if is_sep && prev_sep {
            continue;
        }
        out.push(mapped);
        prev_sep = is_sep;
    }

    let capped = cap_length(out.trim());
    let trimmed = capped.trim_end_matches(['.', ' ']).trim_start();

    if is_safe_segment(trimmed) {
        trimmed.to_string()
    } else {
        trimmed.replace('.', "_")
    }
}

/// First author in display order: parenthesized remarks dropped and
/// `Last, First` flipped to `First Last`.
#[must_use]
pub fn display_author(author: &str) -> String {
    let mut without_remarks = String::with_capacity(author.len());
    let mut depth = 0_usize;
    for ch in author.chars() {
        match ch {
            '(' => depth += 1,
            ')' if depth > 0 => depth -= 1,
            c if depth == 0 => without_remarks.push(c),
            _ => {}
        }
    }
    let cleaned = text::normalize_spaces(&without_remarks);
    let cleaned = cleaned.trim_matches(|c: char| c == ',' || c.is_whitespace());

    let mut parts = cleaned.split(',');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(last), Some(first), None) if !last.trim().is_empty() && !first.trim().is_empty() => {
            format!("{} {}", first.trim(), last.trim())
        }
        _ => cleaned.to_string(),
    }
}

fn cap_length(value: &str) -> &str {
    let end = value
        .char_indices()
        .map(|(start, ch)| start + ch.len_utf8())
        .take(MAX_COMPONENT_CHARS)
        .take_while(|&end| end <= MAX_COMPONENT_BYTES)
        .last()
        .unwrap_or(0);
    &value[..end]
}

fn is_safe_segment(name: &str) -> bool {
    !name.is_empty()
        && !Path::new(name).components().any(|component| {
            matches!(
                component,
                Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        })
        && name != "."
        && name != ".."
}
