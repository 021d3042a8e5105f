//! Purpose: Non-fatal diagnostics raised while cleaning (skipped files, dry runs).
//! Exports: `NoticeKind`, `Notice`, `notice_json`.
//! Role: Built from engine results; the CLI only stamps a time and prints them to stderr.
//! Invariants: Notices never alter the stdout summary.
//! Invariants: JSON keys are additive-only; `time` is omitted when unknown.
use std::path::PathBuf;

use serde_json::{Map, Value, json};

use crate::core::clean::{FileReport, RunSummary};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum NoticeKind {
    /// A file failed and `--errors skip` let the run continue.
    Skip,
    DryRun,
}

impl NoticeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NoticeKind::Skip => "skip",
            NoticeKind::DryRun => "dry-run",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub time: Option<String>,
    pub path: PathBuf,
    pub message: String,
    pub details: Map<String, Value>,
}

impl Notice {
    pub fn skipped(report: &FileReport) -> Self {
        let mut details = Map::new();
        let message = match &report.error {
            Some(err) => {
                details.insert("error_kind".to_string(), json!(format!("{:?}", err.kind())));
                if let Some(line) = err.line() {
                    details.insert("line".to_string(), json!(line));
                }
                err.describe().to_string()
            }
            None => "skipped".to_string(),
        };
        Self {
            kind: NoticeKind::Skip,
            time: None,
            path: report.path.clone(),
            message,
            details,
        }
    }

    pub fn dry_run(summary: &RunSummary) -> Self {
        let mut details = Map::new();
        details.insert("would_clean".to_string(), json!(summary.cleaned));
        details.insert("blocks".to_string(), json!(summary.blocks_removed));
        Self {
            kind: NoticeKind::DryRun,
            time: None,
            path: summary.root.clone(),
            message: format!("dry run; {} file(s) left unwritten", summary.cleaned),
            details,
        }
    }

    pub fn at(mut self, time: impl Into<String>) -> Self {
        self.time = Some(time.into());
        self
    }

    /// One-line rendering for terminals, without the label.
    pub fn human_line(&self) -> String {
        match self.details.get("line") {
            Some(line) => format!("{} ({}:{line})", self.message, self.path.display()),
            None => format!("{} ({})", self.message, self.path.display()),
        }
    }
}

pub fn notice_json(notice: &Notice) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(notice.kind.as_str()));
    if let Some(time) = &notice.time {
        inner.insert("time".to_string(), json!(time));
    }
    inner.insert("cmd".to_string(), json!("initclean"));
    inner.insert("path".to_string(), json!(notice.path.display().to_string()));
    inner.insert("message".to_string(), json!(notice.message));
    inner.insert("details".to_string(), Value::Object(notice.details.clone()));
    json!({ "notice": inner })
}
