//! Minimal tag extraction for the small XML documents inside book containers.
//!
//! OPF, `core.xml` and FB2 descriptions are flat enough that a regex per tag
//! is sufficient; namespaces are matched by their literal prefix.

use std::sync::LazyLock;

use regex::Regex;

#[allow(clippy::expect_used)]
static NUMERIC_ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&#(x[0-9A-Fa-f]+|[0-9]+);").expect("numeric entity regex is valid")
});

#[allow(clippy::expect_used)]
static INNER_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("inner tag regex is valid"));

/// Text content of every `<tag ...>...</tag>` element, entity-decoded and trimmed.
///
/// Nested markup inside the element is stripped. Empty elements are skipped.
#[must_use]
pub fn element_texts(xml: &str, tag: &str) -> Vec<String> {
    let escaped = regex::escape(tag);
    let Ok(pattern) = Regex::new(&format!(r"(?s)<{escaped}(?:\s[^>]*)?>(.*?)</{escaped}\s*>"))
    else {
        return Vec::new();
    };
    pattern
        .captures_iter(xml)
        .filter_map(|cap| cap.get(1))
        .map(|m| {
            let without_tags = INNER_TAG.replace_all(m.as_str(), " ");
            crate::metadata::text::normalize_spaces(&decode_entities(&without_tags))
        })
        .filter(|text| !text.is_empty())
        .collect()
}

/// First non-empty text of `tag`, if any.
#[must_use]
pub fn first_element(xml: &str, tag: &str) -> Option<String> {
    element_texts(xml, tag).into_iter().next()
}

/// The raw inner XML of the first `tag` element, for nested lookups.
#[must_use]
pub fn first_block<'a>(xml: &'a str, tag: &str) -> Option<&'a str> {
    let escaped = regex::escape(tag);
    let pattern = Regex::new(&format!(r"(?s)<{escaped}(?:\s[^>]*)?>(.*?)</{escaped}\s*>")).ok()?;
    pattern
        .captures(xml)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str())
}

/// Decodes the five predefined entities plus numeric character references.
#[must_use]
pub fn decode_entities(text: &str) -> String {
    let numeric = NUMERIC_ENTITY.replace_all(text, |cap: &regex::Captures<'_>| {
        let body = &cap[1];
        let code = match body.strip_prefix('x') {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => body.parse::<u32>().ok(),
        };
        code.and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_default()
    });
    numeric
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
