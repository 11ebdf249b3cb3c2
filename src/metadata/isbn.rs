//! ISBN validation and normalization.
//!
//! Values are stored as bare digits (plus a trailing `X` for ISBN-10).

/// Strips separators and validates; returns the bare ISBN on success.
///
/// Accepts ISBN-10 (mod-11, `X` check digit) and ISBN-13 (978/979 prefix,
/// 1/3 weights). Rejects all-same-digit values and `0000000` prefixes.
#[must_use]
pub fn normalize(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches(|c: char| c.is_ascii_alphabetic() || c == ':' || c.is_whitespace())
        .chars()
        .filter(|c| !matches!(c, '-' | ' ' | '\u{2010}'..='\u{2015}'))
        .map(|c| c.to_ascii_uppercase())
        .collect();

    is_valid(&cleaned).then_some(cleaned)
}

/// Validates an already-stripped ISBN-10 or ISBN-13.
#[must_use]
pub fn is_valid(isbn: &str) -> bool {
    if !is_plausible(isbn) {
        return false;
    }
    match isbn.len() {
        10 => is_valid_isbn10(isbn),
        13 => is_valid_isbn13(isbn),
        _ => false,
    }
}

/// Converts a valid ISBN-10 to ISBN-13; ISBN-13 input is returned as is.
#[must_use]
pub fn to_isbn13(isbn: &str) -> Option<String> {
    let isbn = normalize(isbn)?;
    if isbn.len() == 13 {
        return Some(isbn);
    }
    let mut digits = format!("978{}", &isbn[..9]);
    let check = isbn13_check_digit(&digits)?;
    digits.push(char::from(b'0' + check));
    Some(digits)
}

fn is_plausible(isbn: &str) -> bool {
    let Some(first) = isbn.chars().next() else {
        return false;
    };
    if isbn.chars().all(|c| c == first) {
        return false;
    }
    !isbn.starts_with("0000000")
}

fn is_valid_isbn10(isbn: &str) -> bool {
    let bytes = isbn.as_bytes();
    let mut sum = 0u32;
    for (i, &b) in bytes.iter().enumerate() {
        let value = match b {
            b'0'..=b'9' => u32::from(b - b'0'),
            b'X' if i == 9 => 10,
            _ => return false,
        };
        sum += value * (10 - i as u32);
    }
    sum % 11 == 0
}

fn is_valid_isbn13(isbn: &str) -> bool {
    if !(isbn.starts_with("978") || isbn.starts_with("979")) {
        return false;
    }
    if !isbn.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let Some(expected) = isbn13_check_digit(&isbn[..12]) else {
        return false;
    };
    isbn.as_bytes()[12] - b'0' == expected
}

fn isbn13_check_digit(first12: &str) -> Option<u8> {
    if first12.len() != 12 || !first12.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let sum: u32 = first12
        .bytes()
        .enumerate()
        .map(|(i, b)| {
            let digit = u32::from(b - b'0');
            if i % 2 == 0 { digit } else { digit * 3 }
        })
        .sum();
    Some(((10 - (sum % 10)) % 10) as u8)
}
