//! Policy snapshot loading.
//!
//! Accepted layouts, detected from content:
//!
//! ```text
//! [ {..}, {..} ]            JSON array
//! { "value": [ {..} ] }     Graph-style envelope
//! { .. }                    single policy object
//! {..}\n{..}\n              JSONL, one policy per line ('#' lines skipped)
//! ```
//!
//! A reference path may also be a directory; its `*.json` files are read
//! in file-name order and every document is tagged with its file name.

use crate::error::{LoadError, validate_bytes};
use policydrift_kernel::PolicyDocument;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const ID_FIELDS: [&str; 2] = ["id", "Id"];
const NAME_FIELDS: [&str; 3] = ["displayName", "DisplayName", "name"];

/// Load the live snapshot from a single file.
pub fn load_live(path: impl AsRef<Path>) -> Result<Vec<PolicyDocument>, LoadError> {
    let path = path.as_ref();
    let documents = read_documents_from_path(path)?;
    debug!(path = %path.display(), policies = documents.len(), "loaded live snapshot");
    Ok(documents)
}

/// Load the reference baseline from a file or a directory of `*.json` files.
pub fn load_reference(path: impl AsRef<Path>) -> Result<Vec<PolicyDocument>, LoadError> {
    let path = path.as_ref();
    let files = if path.is_dir() {
        baseline_files(path)?
    } else {
        vec![path.to_path_buf()]
    };
    if files.is_empty() {
        warn!(path = %path.display(), "reference directory holds no .json files");
    }

    let mut documents = Vec::new();
    for file in files {
        let source = file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.display().to_string());
        let loaded = read_documents_from_path(&file)?;
        debug!(file = %source, policies = loaded.len(), "loaded reference file");
        documents.extend(loaded.into_iter().map(|doc| doc.with_source(source.clone())));
    }
    Ok(documents)
}

/// `*.json` files directly inside `dir`, sorted by file name.
pub fn baseline_files(dir: &Path) -> Result<Vec<PathBuf>, LoadError> {
    let entries = fs::read_dir(dir).map_err(|e| LoadError::io(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| LoadError::io(dir, e))?;
        let path = entry.path();
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json && path.is_file() {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Read every policy document in one file.
pub fn read_documents_from_path(path: &Path) -> Result<Vec<PolicyDocument>, LoadError> {
    let bytes = fs::read(path).map_err(|e| LoadError::io(path, e))?;
    validate_bytes(path, &bytes)?;
    let text = String::from_utf8_lossy(&bytes);
    read_documents(path, &text)
}

/// Parse policy documents out of `text`; `path` is only used in errors.
pub fn read_documents(path: &Path, text: &str) -> Result<Vec<PolicyDocument>, LoadError> {
    parse_values(path, text)?
        .into_iter()
        .enumerate()
        .map(|(index, value)| document_from_value(path, index, value))
        .collect()
}

/// Split file content into raw policy objects.
pub(crate) fn parse_values(path: &Path, text: &str) -> Result<Vec<Value>, LoadError> {
    let trimmed = text.trim_start();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    if trimmed.starts_with('[') {
        let value: Value = serde_json::from_str(text).map_err(|e| LoadError::parse(path, None, e))?;
        return array_items(path, value);
    }

    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(mut object)) => match object.remove("value") {
            Some(Value::Array(items)) => Ok(items),
            Some(other) => {
                object.insert("value".to_string(), other);
                Ok(vec![Value::Object(object)])
            }
            None => Ok(vec![Value::Object(object)]),
        },
        Ok(_) => Err(LoadError::Shape {
            path: path.display().to_string(),
            expected: "a policy object, an array of policies or JSONL",
        }),
        Err(_) => read_jsonl(path, text),
    }
}

fn array_items(path: &Path, value: Value) -> Result<Vec<Value>, LoadError> {
    match value {
        Value::Array(items) => Ok(items),
        _ => Err(LoadError::Shape {
            path: path.display().to_string(),
            expected: "a JSON array",
        }),
    }
}

fn read_jsonl(path: &Path, text: &str) -> Result<Vec<Value>, LoadError> {
    let mut values = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let value: Value =
            serde_json::from_str(trimmed).map_err(|e| LoadError::parse(path, Some(line_no + 1), e))?;
        values.push(value);
    }
    Ok(values)
}

/// Lift one raw object into a document, pulling out id and display name.
///
/// The whole object, identity fields included, becomes the document body.
pub fn document_from_value(
    path: &Path,
    index: usize,
    value: Value,
) -> Result<PolicyDocument, LoadError> {
    let Value::Object(object) = &value else {
        return Err(LoadError::Shape {
            path: path.display().to_string(),
            expected: "every policy to be a JSON object",
        });
    };
    let id = first_text(object, &ID_FIELDS).unwrap_or_default();
    let Some(name) = first_text(object, &NAME_FIELDS) else {
        return Err(LoadError::MissingIdentity {
            path: path.display().to_string(),
            index,
            field: "displayName",
        });
    };
    Ok(PolicyDocument::new(id, name, value))
}

fn first_text(object: &serde_json::Map<String, Value>, fields: &[&str]) -> Option<String> {
    fields.iter().find_map(|field| match object.get(*field) {
        Some(Value::String(text)) if !text.trim().is_empty() => Some(text.clone()),
        Some(Value::Number(number)) => Some(number.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(prefix: &str) -> PathBuf {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after unix epoch")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!(
            "policydrift-snapshot-{prefix}-{}-{unique}",
            std::process::id()
        ));
        fs::create_dir_all(&dir).expect("temp dir should be created");
        dir
    }

    fn names(documents: &[PolicyDocument]) -> Vec<&str> {
        documents.iter().map(|d| d.name.as_str()).collect()
    }

    #[test]
    fn reads_array_envelope_object_and_jsonl() {
        let path = Path::new("inline.json");
        let array = r#"[{"id": "1", "displayName": "A"}, {"id": "2", "displayName": "B"}]"#;
        let envelope = r#"{"@odata.context": "x", "value": [{"id": "1", "displayName": "A"}]}"#;
        let single = r#"{"Id": "1", "DisplayName": "A", "State": "enabled"}"#;
        let jsonl = "# exported\n{\"id\": \"1\", \"displayName\": \"A\"}\n\n{\"id\": \"2\", \"name\": \"B\"}\n";

        assert_eq!(names(&read_documents(path, array).expect("array")), vec!["A", "B"]);
        assert_eq!(names(&read_documents(path, envelope).expect("envelope")), vec!["A"]);
        let single = read_documents(path, single).expect("single");
        assert_eq!(single[0].id, "1");
        assert_eq!(single[0].body["State"], "enabled");
        assert_eq!(names(&read_documents(path, jsonl).expect("jsonl")), vec!["A", "B"]);
    }

    #[test]
    fn empty_input_has_no_documents() {
        assert!(read_documents(Path::new("empty.json"), "  \n").expect("empty").is_empty());
    }

    #[test]
    fn missing_id_is_allowed_but_missing_name_is_not() {
        let path = Path::new("anon.json");
        let docs = read_documents(path, r#"[{"displayName": "A"}]"#).expect("anonymized");
        assert_eq!(docs[0].id, "");

        let err = read_documents(path, r#"[{"displayName": "A"}, {"id": "2"}]"#)
            .expect_err("nameless policy");
        assert!(matches!(err, LoadError::MissingIdentity { index: 1, .. }), "{err}");
    }

    #[test]
    fn jsonl_errors_carry_line_numbers() {
        let text = "{\"id\": \"1\", \"displayName\": \"A\"}\n{broken\n";
        let err = read_documents(Path::new("live.jsonl"), text).expect_err("broken line");
        assert!(matches!(err, LoadError::Parse { line: Some(2), .. }), "{err}");
    }

    #[test]
    fn non_object_policies_are_rejected() {
        let err = read_documents(Path::new("x.json"), "[1, 2]").expect_err("numbers");
        assert!(matches!(err, LoadError::Shape { .. }));
        let err = read_documents(Path::new("x.json"), "\"text\"").expect_err("string");
        assert!(matches!(err, LoadError::Shape { .. }));
    }

    #[test]
    fn reference_directory_is_read_in_file_name_order_and_tagged() {
        let dir = temp_dir("reference");
        fs::write(dir.join("b-session.json"), r#"{"id": "2", "displayName": "Session"}"#)
            .expect("write b");
        fs::write(dir.join("a-mfa.json"), r#"{"id": "1", "displayName": "MFA"}"#)
            .expect("write a");
        fs::write(dir.join("notes.txt"), "not a policy").expect("write txt");

        let docs = load_reference(&dir).expect("reference should load");
        assert_eq!(names(&docs), vec!["MFA", "Session"]);
        assert_eq!(docs[0].source.as_deref(), Some("a-mfa.json"));
        assert_eq!(docs[1].source.as_deref(), Some("b-session.json"));

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn live_snapshot_rejects_non_utf8_bytes() {
        let dir = temp_dir("corrupt");
        let path = dir.join("live.json");
        fs::write(&path, [0xff, 0xfe, 0xfd]).expect("fixture should write");

        match load_live(&path) {
            Err(LoadError::Corrupt(message)) => assert!(message.contains("non-UTF-8")),
            other => panic!("expected corrupt input error, got {other:?}"),
        }

        let _ = fs::remove_dir_all(dir);
    }
}
