//! Purpose: Discover target files (default `__init__.py`) under a root directory.
//! Exports: `ScanOptions`, `ScanEntry`, `discover`, `DEFAULT_FILE_NAME`.
//! Role: Filesystem walk for `core::clean`; yields paths, never reads file contents.
//! Invariants: Order is deterministic (entries sorted by file name per directory).
//! Invariants: Root failures are errors; per-entry failures become `ScanEntry::Failed`.
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::core::error::{Error, ErrorKind, io_error};

pub const DEFAULT_FILE_NAME: &str = "__init__.py";

#[derive(Clone, Debug)]
pub struct ScanOptions {
    pub file_name: String,
    pub follow_links: bool,
    pub max_depth: Option<usize>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            file_name: DEFAULT_FILE_NAME.to_string(),
            follow_links: false,
            max_depth: None,
        }
    }
}

#[derive(Debug)]
pub enum ScanEntry {
    File(PathBuf),
    Failed(Error),
}

pub fn discover(root: &Path, options: &ScanOptions) -> Result<Vec<ScanEntry>, Error> {
    let meta = fs::metadata(root).map_err(|err| {
        io_error(err, "failed to read scan root", root)
            .with_hint("Pass an existing directory to --dir.")
    })?;

    if meta.is_file() {
        if file_name_matches(root, &options.file_name) {
            return Ok(vec![ScanEntry::File(root.to_path_buf())]);
        }
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("scan root is a file not named {}", options.file_name))
            .with_path(root)
            .with_hint("Pass a directory, or a single matching file."));
    }

    let mut walker = WalkDir::new(root)
        .follow_links(options.follow_links)
        .sort_by_file_name();
    if let Some(depth) = options.max_depth {
        walker = walker.max_depth(depth);
    }

    let mut entries = Vec::new();
    for entry in walker {
        match entry {
            Ok(entry) => {
                let is_target = entry.file_type().is_file()
                    && file_name_matches(entry.path(), &options.file_name);
                if is_target {
                    debug!(path = %entry.path().display(), "found target file");
                    entries.push(ScanEntry::File(entry.into_path()));
                }
            }
            Err(err) => entries.push(ScanEntry::Failed(walk_error(err, root))),
        }
    }
    Ok(entries)
}

fn file_name_matches(path: &Path, name: &str) -> bool {
    path.file_name().and_then(|value| value.to_str()) == Some(name)
}

fn walk_error(err: walkdir::Error, root: &Path) -> Error {
    let path = err.path().unwrap_or(root).to_path_buf();
    if err.loop_ancestor().is_some() {
        return Error::new(ErrorKind::Io)
            .with_message("symlink loop while scanning")
            .with_path(path)
            .with_source(err);
    }
    match err.into_io_error() {
        Some(io_err) => io_error(io_err, "failed to read directory entry", &path),
        None => Error::new(ErrorKind::Io)
            .with_message("failed to read directory entry")
            .with_path(path),
    }
}
