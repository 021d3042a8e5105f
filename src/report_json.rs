//! Purpose: JSON serializers for per-file reports and run summaries.
//! Exports: `file_report_json`, `summary_json`, `block_json`.
//! Role: Keep the stdout envelope shape in one place for the CLI and tests.
//! Invariants: Key names are stable; new keys are additive-only.
//! Invariants: `error` is emitted only for skipped files.

use serde_json::{Map, Value, json};

use crate::core::clean::{FileReport, RunSummary};
use crate::core::guard::GuardBlock;

pub fn block_json(block: &GuardBlock) -> Value {
    json!({
        "start_line": block.start_line,
        "end_line": block.end_line,
        "lines": block.line_count(),
    })
}

pub fn file_report_json(report: &FileReport) -> Value {
    let mut map = Map::new();
    map.insert("path".to_string(), json!(report.path.display().to_string()));
    map.insert("status".to_string(), json!(report.status.as_str()));
    map.insert(
        "blocks".to_string(),
        Value::Array(report.blocks.iter().map(block_json).collect()),
    );
    map.insert("bytes_before".to_string(), json!(report.bytes_before));
    map.insert("bytes_after".to_string(), json!(report.bytes_after));
    if let Some(err) = &report.error {
        let mut error = Map::new();
        error.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
        if let Some(message) = err.message() {
            error.insert("message".to_string(), json!(message));
        }
        if let Some(line) = err.line() {
            error.insert("line".to_string(), json!(line));
        }
        map.insert("error".to_string(), Value::Object(error));
    }
    Value::Object(map)
}

pub fn summary_json(summary: &RunSummary) -> Value {
    json!({
        "root": summary.root.display().to_string(),
        "dry_run": summary.dry_run,
        "scanned": summary.scanned,
        "cleaned": summary.cleaned,
        "unchanged": summary.unchanged,
        "skipped": summary.skipped,
        "blocks_removed": summary.blocks_removed,
        "files": summary.files.iter().map(file_report_json).collect::<Vec<_>>(),
    })
}
