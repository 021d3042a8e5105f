//! Purpose: Clean one file or a whole tree of target files in place.
//! Exports: `CleanConfig`, `ErrorPolicy`, `FileStatus`, `FileReport`, `RunSummary`,
//! Exports: `clean_file`, `clean_tree`.
//! Role: Engine behind the CLI; ties `scan` (which files) to `guard` (what to remove).
//! Invariants: Files without guard blocks are never rewritten.
//! Invariants: Rewrites go through a fresh sibling temp file and a rename; permissions are kept.
//! Invariants: Symlinks are rewritten through to their target and survive as links.
//! Invariants: Dry runs never touch the filesystem beyond reads.
//! Invariants: `scanned == cleaned + unchanged + skipped`.
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::core::error::{Error, ErrorKind, io_error};
use crate::core::guard::{GuardBlock, GuardMatcher};
use crate::core::scan::{DEFAULT_FILE_NAME, ScanEntry, ScanOptions, discover};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorPolicy {
    Stop,
    Skip,
}

#[derive(Clone, Debug)]
pub struct CleanConfig {
    pub root: PathBuf,
    pub file_name: String,
    pub dry_run: bool,
    pub follow_links: bool,
    pub max_depth: Option<usize>,
    pub errors: ErrorPolicy,
}

impl CleanConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            file_name: DEFAULT_FILE_NAME.to_string(),
            dry_run: false,
            follow_links: false,
            max_depth: None,
            errors: ErrorPolicy::Stop,
        }
    }

    fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            file_name: self.file_name.clone(),
            follow_links: self.follow_links,
            max_depth: self.max_depth,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FileStatus {
    /// Guard blocks were found (and removed unless dry-run).
    Cleaned,
    Unchanged,
    /// Failed under `ErrorPolicy::Skip`; `FileReport::error` holds the cause.
    Skipped,
}

impl FileStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FileStatus::Cleaned => "cleaned",
            FileStatus::Unchanged => "unchanged",
            FileStatus::Skipped => "skipped",
        }
    }
}

#[derive(Debug)]
pub struct FileReport {
    pub path: PathBuf,
    pub status: FileStatus,
    pub blocks: Vec<GuardBlock>,
    pub bytes_before: u64,
    pub bytes_after: u64,
    pub error: Option<Error>,
}

impl FileReport {
    fn skipped(path: PathBuf, error: Error) -> Self {
        Self {
            path,
            status: FileStatus::Skipped,
            blocks: Vec::new(),
            bytes_before: 0,
            bytes_after: 0,
            error: Some(error),
        }
    }
}

#[derive(Debug)]
pub struct RunSummary {
    pub root: PathBuf,
    pub dry_run: bool,
    pub scanned: usize,
    pub cleaned: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub blocks_removed: usize,
    pub files: Vec<FileReport>,
}

impl RunSummary {
    fn new(root: &Path, dry_run: bool) -> Self {
        Self {
            root: root.to_path_buf(),
            dry_run,
            scanned: 0,
            cleaned: 0,
            unchanged: 0,
            skipped: 0,
            blocks_removed: 0,
            files: Vec::new(),
        }
    }

    fn record(&mut self, report: FileReport) {
        self.scanned += 1;
        match report.status {
            FileStatus::Cleaned => self.cleaned += 1,
            FileStatus::Unchanged => self.unchanged += 1,
            FileStatus::Skipped => self.skipped += 1,
        }
        self.blocks_removed += report.blocks.len();
        self.files.push(report);
    }
}

pub fn clean_file(
    matcher: &GuardMatcher,
    path: &Path,
    dry_run: bool,
) -> Result<FileReport, Error> {
    let bytes = fs::read(path).map_err(|err| io_error(err, "failed to read file", path))?;
    let bytes_before = bytes.len() as u64;
    let text = String::from_utf8(bytes).map_err(|err| {
        let valid = &err.as_bytes()[..err.utf8_error().valid_up_to()];
        let line = valid.iter().filter(|byte| **byte == b'\n').count() + 1;
        Error::new(ErrorKind::Encoding)
            .with_message("file is not valid UTF-8")
            .with_path(path)
            .with_line(line)
            .with_hint("Re-encode the file as UTF-8 or rerun with --errors skip.")
            .with_source(err.utf8_error())
    })?;

    let outcome = matcher.strip(&text).map_err(|err| err.with_path(path))?;
    if !outcome.changed() {
        debug!(path = %path.display(), "no main guard");
        return Ok(FileReport {
            path: path.to_path_buf(),
            status: FileStatus::Unchanged,
            blocks: Vec::new(),
            bytes_before,
            bytes_after: bytes_before,
            error: None,
        });
    }

    if dry_run {
        debug!(path = %path.display(), blocks = outcome.blocks.len(), "would strip main guard");
    } else {
        replace_contents(path, outcome.text.as_bytes())?;
        debug!(path = %path.display(), blocks = outcome.blocks.len(), "stripped main guard");
    }

    Ok(FileReport {
        path: path.to_path_buf(),
        status: FileStatus::Cleaned,
        bytes_after: outcome.text.len() as u64,
        blocks: outcome.blocks,
        bytes_before,
        error: None,
    })
}

pub fn clean_tree<F>(config: &CleanConfig, mut on_skip: F) -> Result<RunSummary, Error>
where
    F: FnMut(&FileReport),
{
    let matcher = GuardMatcher::new()?;
    let entries = discover(&config.root, &config.scan_options())?;
    let mut summary = RunSummary::new(&config.root, config.dry_run);

    for entry in entries {
        let result = match entry {
            ScanEntry::File(path) => match clean_file(&matcher, &path, config.dry_run) {
                Ok(report) => Ok(report),
                Err(err) => Err((path, err)),
            },
            ScanEntry::Failed(err) => {
                let path = err
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| config.root.clone());
                Err((path, err))
            }
        };

        match result {
            Ok(report) => summary.record(report),
            Err((_, err)) if config.errors == ErrorPolicy::Stop => return Err(err),
            Err((path, err)) => {
                debug!(path = %path.display(), error = %err, "skipping file");
                let report = FileReport::skipped(path, err);
                on_skip(&report);
                summary.record(report);
            }
        }
    }

    info!(
        root = %config.root.display(),
        scanned = summary.scanned,
        cleaned = summary.cleaned,
        skipped = summary.skipped,
        dry_run = config.dry_run,
        "clean run finished"
    );
    Ok(summary)
}

fn replace_contents(path: &Path, contents: &[u8]) -> Result<(), Error> {
    // Rename over the resolved target so a symlinked file keeps its link.
    let target =
        fs::canonicalize(path).map_err(|err| io_error(err, "failed to resolve file", path))?;
    let permissions = fs::metadata(&target)
        .map_err(|err| io_error(err, "failed to stat file", &target))?
        .permissions();
    let tmp_path = temp_sibling(&target);

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&tmp_path)
        .map_err(|err| {
            let stale = err.kind() == std::io::ErrorKind::AlreadyExists;
            let err = io_error(err, "failed to create temp file", &tmp_path);
            if stale {
                err.with_hint("Remove the leftover temp file and rerun.")
            } else {
                err
            }
        })?;

    let written = (|| -> std::io::Result<()> {
        file.write_all(contents)?;
        file.sync_all()?;
        fs::set_permissions(&tmp_path, permissions)?;
        fs::rename(&tmp_path, &target)
    })();

    written.map_err(|err| {
        let _ = fs::remove_file(&tmp_path);
        io_error(err, "failed to rewrite file", &target)
    })
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.initclean.tmp"))
}

#[cfg(test)]
mod tests {
    use super::{CleanConfig, ErrorPolicy, FileStatus, clean_file, clean_tree};
    use crate::core::error::ErrorKind;
    use crate::core::guard::GuardMatcher;
    use std::fs;

    const GUARDED: &str = "x = 1\n\nif __name__ == \"__main__\":\n    print(x)\n";

    #[test]
    fn clean_file_rewrites_guarded_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("__init__.py");
        fs::write(&path, GUARDED).expect("write");

        let matcher = GuardMatcher::new().expect("matcher");
        let report = clean_file(&matcher, &path, false).expect("clean");
        assert_eq!(report.status, FileStatus::Cleaned);
        assert_eq!(report.blocks.len(), 1);
        assert_eq!(report.bytes_before, GUARDED.len() as u64);
        assert_eq!(fs::read_to_string(&path).expect("read"), "x = 1\n\n");
        assert_eq!(report.bytes_after, 7);

        let leftovers: Vec<_> = fs::read_dir(temp.path())
            .expect("read_dir")
            .filter_map(Result::ok)
            .map(|entry| entry.file_name())
            .collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn dry_run_leaves_file_untouched() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("__init__.py");
        fs::write(&path, GUARDED).expect("write");

        let matcher = GuardMatcher::new().expect("matcher");
        let report = clean_file(&matcher, &path, true).expect("clean");
        assert_eq!(report.status, FileStatus::Cleaned);
        assert_eq!(fs::read_to_string(&path).expect("read"), GUARDED);
    }

    #[cfg(unix)]
    #[test]
    fn rewrite_preserves_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("__init__.py");
        fs::write(&path, GUARDED).expect("write");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).expect("chmod");

        let matcher = GuardMatcher::new().expect("matcher");
        clean_file(&matcher, &path, false).expect("clean");
        let mode = fs::metadata(&path).expect("stat").permissions().mode() & 0o777;
        assert_eq!(mode, 0o640);
    }

    #[test]
    fn non_utf8_file_reports_encoding_error_with_line() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("__init__.py");
        fs::write(&path, b"a = 1\nb = '\xff'\n").expect("write");

        let matcher = GuardMatcher::new().expect("matcher");
        let err = clean_file(&matcher, &path, false).expect_err("encoding");
        assert_eq!(err.kind(), ErrorKind::Encoding);
        assert_eq!(err.line(), Some(2));
    }

    #[test]
    fn clean_tree_stop_policy_aborts_on_first_failure() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(temp.path().join("a")).expect("mkdir");
        fs::write(temp.path().join("a/__init__.py"), b"\xfe\xff").expect("write");
        fs::write(temp.path().join("__init__.py"), GUARDED).expect("write");

        let config = CleanConfig::new(temp.path());
        let err = clean_tree(&config, |_| {}).expect_err("stop");
        assert_eq!(err.kind(), ErrorKind::Encoding);
    }

    #[test]
    fn clean_tree_skip_policy_continues_and_counts() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(temp.path().join("a")).expect("mkdir");
        fs::create_dir_all(temp.path().join("b")).expect("mkdir");
        fs::write(temp.path().join("a/__init__.py"), b"\xfe\xff").expect("write");
        fs::write(temp.path().join("b/__init__.py"), GUARDED).expect("write");
        fs::write(temp.path().join("__init__.py"), "import b\n").expect("write");

        let mut config = CleanConfig::new(temp.path());
        config.errors = ErrorPolicy::Skip;
        let mut skipped = Vec::new();
        let summary = clean_tree(&config, |report| skipped.push(report.path.clone()))
            .expect("skip run");

        assert_eq!(summary.scanned, 3);
        assert_eq!(summary.cleaned, 1);
        assert_eq!(summary.unchanged, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.blocks_removed, 1);
        assert_eq!(skipped, vec![temp.path().join("a/__init__.py")]);
        assert_eq!(
            fs::read_to_string(temp.path().join("b/__init__.py")).expect("read"),
            "x = 1\n\n"
        );
    }

    #[test]
    fn guard_with_else_arm_is_refused_and_file_kept() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("__init__.py");
        let text = "if __name__ == '__main__':\n    run()\nelse:\n    setup()\n";
        fs::write(&path, text).expect("write");

        let matcher = GuardMatcher::new().expect("matcher");
        let err = clean_file(&matcher, &path, false).expect_err("else arm");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert_eq!(err.path(), Some(path.as_path()));
        assert_eq!(err.line(), Some(3));

        let mut config = CleanConfig::new(temp.path());
        config.errors = ErrorPolicy::Skip;
        let summary = clean_tree(&config, |_| {}).expect("skip run");
        assert_eq!(summary.skipped, 1);
        assert_eq!(fs::read_to_string(&path).expect("read"), text);
    }

    #[test]
    fn stale_temp_file_is_not_clobbered() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("__init__.py");
        let stale = temp.path().join(".__init__.py.initclean.tmp");
        fs::write(&path, GUARDED).expect("write");
        fs::write(&stale, "keep me").expect("write");

        let matcher = GuardMatcher::new().expect("matcher");
        let err = clean_file(&matcher, &path, false).expect_err("temp exists");
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.hint().is_some());
        assert_eq!(fs::read_to_string(&stale).expect("read"), "keep me");
        assert_eq!(fs::read_to_string(&path).expect("read"), GUARDED);
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_file_is_cleaned_through_the_link() {
        use std::os::unix::fs::symlink;

        let temp = tempfile::tempdir().expect("tempdir");
        let real = temp.path().join("real.py");
        let pkg = temp.path().join("pkg");
        let link = pkg.join("__init__.py");
        fs::write(&real, "if __name__ == '__main__':\n    run()\n").expect("write");
        fs::create_dir_all(&pkg).expect("mkdir");
        symlink(&real, &link).expect("symlink");

        let mut config = CleanConfig::new(temp.path());
        config.follow_links = true;
        let summary = clean_tree(&config, |_| {}).expect("run");
        assert_eq!(summary.cleaned, 1);
        assert!(fs::symlink_metadata(&link).expect("lstat").file_type().is_symlink());
        assert_eq!(fs::read_to_string(&real).expect("read"), "");

        fs::write(&real, GUARDED).expect("rewrite");
        let summary = clean_tree(&CleanConfig::new(&link), |_| {}).expect("file root");
        assert_eq!(summary.cleaned, 1);
        assert!(fs::symlink_metadata(&link).expect("lstat").file_type().is_symlink());
        assert_eq!(fs::read_to_string(&real).expect("read"), "x = 1\n\n");
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_file_is_ignored_without_follow_links() {
        use std::os::unix::fs::symlink;

        let temp = tempfile::tempdir().expect("tempdir");
        let real = temp.path().join("real.py");
        fs::write(&real, GUARDED).expect("write");
        symlink(&real, temp.path().join("__init__.py")).expect("symlink");

        let summary = clean_tree(&CleanConfig::new(temp.path()), |_| {}).expect("run");
        assert_eq!(summary.scanned, 0);
        assert_eq!(fs::read_to_string(&real).expect("read"), GUARDED);
    }

    #[cfg(unix)]
    #[test]
    fn symlink_loop_follows_error_policy() {
        use std::os::unix::fs::symlink;

        let temp = tempfile::tempdir().expect("tempdir");
        let pkg = temp.path().join("pkg");
        fs::create_dir_all(&pkg).expect("mkdir");
        fs::write(pkg.join("__init__.py"), "import os\n").expect("write");
        symlink(&pkg, pkg.join("loop")).expect("symlink");

        let mut config = CleanConfig::new(temp.path());
        config.follow_links = true;
        let err = clean_tree(&config, |_| {}).expect_err("loop under stop");
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(err.message(), Some("symlink loop while scanning"));

        config.errors = ErrorPolicy::Skip;
        let mut skipped = Vec::new();
        let summary = clean_tree(&config, |report| skipped.push(report.path.clone()))
            .expect("loop under skip");
        assert_eq!(summary.unchanged, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(skipped, vec![pkg.join("loop")]);
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_directory_follows_error_policy() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir().expect("tempdir");
        let locked = temp.path().join("locked");
        fs::create_dir_all(&locked).expect("mkdir");
        fs::write(locked.join("__init__.py"), GUARDED).expect("write");
        fs::write(temp.path().join("__init__.py"), "import locked\n").expect("write");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).expect("chmod");

        // Privileged users read through mode 000; nothing to observe then.
        if fs::read_dir(&locked).is_ok() {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).expect("chmod");
            return;
        }

        let mut config = CleanConfig::new(temp.path());
        let stopped = clean_tree(&config, |_| {});
        config.errors = ErrorPolicy::Skip;
        let skipped = clean_tree(&config, |_| {});
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).expect("chmod");

        let err = stopped.expect_err("stop");
        assert_eq!(err.kind(), ErrorKind::Permission);
        assert_eq!(err.path(), Some(locked.as_path()));

        let summary = skipped.expect("skip");
        assert_eq!(summary.unchanged, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.files[1].path, locked);
    }
}
