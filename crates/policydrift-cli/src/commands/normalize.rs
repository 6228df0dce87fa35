use crate::support::{ERROR_EXIT, render_json_or_exit};
use policydrift_kernel::{NormalizationTables, Scalar, ValueNormalizer};
use serde_json::{Value, json};
use std::process;

pub fn run(field: String, value: String, json: bool) {
    let tables = NormalizationTables::builtin().unwrap_or_else(|e| {
        eprintln!("error: {e}");
        process::exit(ERROR_EXIT);
    });
    let raw_json = serde_json::from_str::<Value>(&value).unwrap_or(Value::String(value));
    let Some(raw) = Scalar::from_json(&raw_json) else {
        eprintln!("error: normalize takes a single primitive value, got {raw_json}");
        process::exit(ERROR_EXIT);
    };

    let normalizer = ValueNormalizer::new(&tables);
    let known_field = tables.get(&field).is_some();
    let normalized = normalizer.normalize(&field, &raw);

    if json {
        let payload = json!({
            "field": field,
            "knownField": known_field,
            "raw": raw.to_json(),
            "canonical": normalized.value.to_json(),
            "warning": normalized.warning.as_ref().map(ToString::to_string),
        });
        println!("{}", render_json_or_exit(&payload));
    } else {
        println!("{}", normalized.value.to_json());
        if let Some(warning) = &normalized.warning {
            eprintln!("warning: {warning}");
        } else if !known_field {
            eprintln!("note: `{field}` has no normalization table; value passes through");
        }
    }
}
