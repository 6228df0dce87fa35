//! Load errors.

use std::path::Path;

/// Errors raised while reading snapshot, baseline or mapping files.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("{path}: I/O error: {message}")]
    Io { path: String, message: String },

    /// `line` is 1-based and only set for JSONL input.
    #[error("{path}{}: parse error: {message}", .line.map(|l| format!(":{l}")).unwrap_or_default())]
    Parse {
        path: String,
        line: Option<usize>,
        message: String,
    },

    #[error("corrupted input: {0}")]
    Corrupt(String),

    #[error("{path}: policy #{index} has no {field}")]
    MissingIdentity {
        path: String,
        index: usize,
        field: &'static str,
    },

    /// `index` is the 0-based position of the record in the file.
    #[error("{path}: mapping entry #{index}: {message}")]
    MappingEntry {
        path: String,
        index: usize,
        message: String,
    },

    #[error("{path}: expected {expected}")]
    Shape { path: String, expected: &'static str },
}

impl LoadError {
    pub(crate) fn io(path: &Path, error: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            message: error.to_string(),
        }
    }

    pub(crate) fn parse(path: &Path, line: Option<usize>, error: serde_json::Error) -> Self {
        Self::Parse {
            path: path.display().to_string(),
            line,
            message: error.to_string(),
        }
    }
}

/// Reject bytes that cannot be a text snapshot.
pub(crate) fn validate_bytes(path: &Path, bytes: &[u8]) -> Result<(), LoadError> {
    if bytes.contains(&0) {
        return Err(LoadError::Corrupt(format!(
            "{}: contains NUL byte(s)",
            path.display()
        )));
    }
    if std::str::from_utf8(bytes).is_err() {
        return Err(LoadError::Corrupt(format!(
            "{}: contains non-UTF-8 byte sequence(s)",
            path.display()
        )));
    }
    Ok(())
}
