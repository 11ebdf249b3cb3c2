//! Core bibliographic types shared by every pipeline stage.
//!
//! - [`BookFile`] - an immutable view of one discovered source file
//! - [`CandidateMetadata`] - one unmerged guess from a single source
//! - [`ResolvedMetadata`] - the reconciled record chosen for a file
//! - [`QuerySignature`] - the normalized key used for caching and identity checks

mod book;
mod candidate;
pub mod isbn;
mod signature;
pub mod text;

pub use book::{BookFile, BookFormat, fingerprint_file};
pub use candidate::{CandidateMetadata, FieldProvenance, ResolvedMetadata, SourceTag};
pub use signature::QuerySignature;
