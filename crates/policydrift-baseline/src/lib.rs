//! # policydrift-baseline
//!
//! File-loading layer for policy comparisons.
//!
//! This crate provides:
//! - live snapshot loading (array, envelope, single object, JSONL)
//! - reference baseline loading from a file or a directory of `*.json`
//!   files, each document tagged with its source file name
//! - custom mapping loading
//!
//! Everything it returns is plain kernel input; it never compares anything.
//!
//! ```text
//! live.json ─────┐
//! baseline/*.json ┼──► Vec<PolicyDocument> / Vec<MappingEntry> ──► kernel
//! mapping.json ──┘
//! ```

pub mod error;
pub mod mapping;
pub mod snapshot;

pub use error::LoadError;
pub use mapping::{load_mapping, read_mapping};
pub use snapshot::{
    baseline_files, document_from_value, load_live, load_reference, read_documents,
    read_documents_from_path,
};
