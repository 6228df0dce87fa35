use crate::config::DEFAULT_IGNORE;
use crate::support::{ERROR_EXIT, render_json_or_exit};
use policydrift_kernel::{DEFAULT_CRITICAL_PREFIXES, NormalizationTables};
use serde_json::json;
use std::process;

pub fn run(json: bool) {
    let tables = NormalizationTables::builtin().unwrap_or_else(|e| {
        eprintln!("error: {e}");
        process::exit(ERROR_EXIT);
    });

    if json {
        let payload = json!({
            "tables": tables
                .iter()
                .map(|table| json!({
                    "path": table.path(),
                    "entries": table
                        .entries()
                        .map(|(code, name)| json!({"code": code, "name": name}))
                        .collect::<Vec<_>>(),
                }))
                .collect::<Vec<_>>(),
            "criticalPrefixes": DEFAULT_CRITICAL_PREFIXES,
            "defaultIgnore": DEFAULT_IGNORE,
        });
        println!("{}", render_json_or_exit(&payload));
        return;
    }

    for table in tables.iter() {
        println!("{}", table.path());
        for (code, name) in table.entries() {
            println!("  {code:>2}  {name}");
        }
    }
    println!();
    println!("critical prefixes:");
    for prefix in DEFAULT_CRITICAL_PREFIXES {
        println!("  {prefix}");
    }
    println!();
    println!("default ignore:");
    for prefix in DEFAULT_IGNORE {
        println!("  {prefix}");
    }
}
