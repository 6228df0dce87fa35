//! Custom mapping files: a JSON array (or JSONL) of
//! `{"referenceKey": "...", "liveKey": "..."}` records.

use crate::error::{LoadError, validate_bytes};
use crate::snapshot::parse_values;
use policydrift_kernel::MappingEntry;
use std::fs;
use std::path::Path;
use tracing::debug;

pub fn load_mapping(path: impl AsRef<Path>) -> Result<Vec<MappingEntry>, LoadError> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| LoadError::io(path, e))?;
    validate_bytes(path, &bytes)?;
    let entries = read_mapping(path, &String::from_utf8_lossy(&bytes))?;
    debug!(path = %path.display(), entries = entries.len(), "loaded custom mapping");
    Ok(entries)
}

pub fn read_mapping(path: &Path, text: &str) -> Result<Vec<MappingEntry>, LoadError> {
    parse_values(path, text)?
        .into_iter()
        .enumerate()
        .map(|(index, value)| {
            serde_json::from_value(value).map_err(|e| LoadError::MappingEntry {
                path: path.display().to_string(),
                index,
                message: e.to_string(),
            })
        })
        .collect()
}
