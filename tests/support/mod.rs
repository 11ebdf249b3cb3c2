//! Shared helpers for integration tests.

#![allow(dead_code)]

pub mod socket_guard;

use std::path::Path;

use serde_json::json;

/// Writes `bytes` to `dir/name`, creating parent folders.
pub fn write_book(dir: &Path, name: &str, bytes: &[u8]) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, bytes).unwrap();
}

/// One Open Library search document.
pub fn open_library_doc(title: &str, author: &str, year: i32) -> serde_json::Value {
    json!({
        "title": title,
        "author_name": [author],
        "first_publish_year": year,
        "subject": ["Fiction"]
    })
}

/// An Open Library search response holding `docs`.
pub fn open_library_body(docs: Vec<serde_json::Value>) -> serde_json::Value {
    json!({ "numFound": docs.len(), "docs": docs })
}

/// An empty Google Books volumes response.
pub fn google_books_empty() -> serde_json::Value {
    json!({ "kind": "books#volumes", "totalItems": 0 })
}

/// A Google Books volumes response with one hit.
pub fn google_books_volume(title: &str, author: &str, date: &str, isbn13: &str) -> serde_json::Value {
    json!({
        "totalItems": 1,
        "items": [{
            "volumeInfo": {
                "title": title,
                "authors": [author],
                "publishedDate": date,
                "categories": ["Science"],
                "industryIdentifiers": [{ "type": "ISBN_13", "identifier": isbn13 }]
            }
        }]
    })
}
