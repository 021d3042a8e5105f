//! Purpose: `initclean` CLI entry point.
//! Role: Binary crate root; parses args, runs a clean, emits a summary on stdout.
//! Invariants: Stdout carries only the run summary (human on a TTY, JSON otherwise).
//! Invariants: Errors and notices go to stderr; JSON when stderr is not a terminal.
//! Invariants: Process exit code is derived from `to_exit_code`.
use std::error::Error as StdError;
use std::ffi::OsString;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum, ValueHint, error::ErrorKind as ClapErrorKind};
use serde_json::{Map, Value, json};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing_subscriber::EnvFilter;

use initclean::core::clean::{CleanConfig, ErrorPolicy, FileStatus, RunSummary, clean_tree};
use initclean::core::error::{Error, ErrorKind, to_exit_code};
use initclean::core::scan::DEFAULT_FILE_NAME;
use initclean::notice::{Notice, notice_json};
use initclean::report_json::summary_json;

fn main() {
    let exit_code = match parse_args(std::env::args_os()) {
        Ok(Parsed::Exit(code)) => code,
        Ok(Parsed::Run(cli)) => {
            init_tracing();
            let stderr = Diagnostics::for_stderr(cli.color);
            execute(&cli, &stderr).unwrap_or_else(|err| stderr.error(&err))
        }
        Err(err) => Diagnostics::for_stderr(ColorMode::Auto).error(&err),
    };
    std::process::exit(exit_code);
}

/// Result of argument parsing: either a run to execute or an exit clap already handled.
#[derive(Debug)]
enum Parsed {
    Run(Cli),
    Exit(i32),
}

fn parse_args<I, T>(args: I) -> Result<Parsed, Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let err = match Cli::try_parse_from(args) {
        Ok(cli) => return Ok(Parsed::Run(cli)),
        Err(err) => err,
    };
    let exit_code = match err.kind() {
        ClapErrorKind::DisplayHelp | ClapErrorKind::DisplayVersion => 0,
        ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => to_exit_code(ErrorKind::Usage),
        _ => {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(clap_error_summary(&err))
                .with_hint("Try `initclean --help`."));
        }
    };
    err.print().map_err(|io_err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to write help")
            .with_source(io_err)
    })?;
    Ok(Parsed::Exit(exit_code))
}

/// First meaningful line of clap's rendered error, without its `error:` prefix.
fn clap_error_summary(err: &clap::Error) -> String {
    err.to_string()
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.strip_prefix("error:").unwrap_or(line).trim().to_string())
        .unwrap_or_else(|| "invalid arguments".to_string())
}

#[derive(Debug, Parser)]
#[command(
    name = "initclean",
    version,
    about = "Strip `if __name__ == \"__main__\":` blocks from Python package initializers",
    help_template = r#"{about-with-newline}
{before-help}USAGE
  {usage}

OPTIONS
{options}

{after-help}
"#,
    long_about = None,
    before_help = r#"Walks a directory, finds every __init__.py, and removes top-level main-guard
blocks in place. Everything outside those blocks is left byte-for-byte intact.
"#,
    after_help = r#"EXAMPLES
  $ initclean --dir src/                 # clean every __init__.py under src/
  $ initclean --dir src/ --dry-run       # show what would change
  $ initclean --dir src/ --check         # CI: exit 7 if anything would change
  $ initclean --dir . --errors skip      # keep going past unreadable files

EXIT CODES
  0 ok, 2 usage, 3 not found, 4 permission, 5 i/o, 6 encoding, 7 unclean (--check)"#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        short,
        long,
        help = "Directory to scan for target files",
        value_hint = ValueHint::DirPath
    )]
    dir: PathBuf,
    #[arg(long, default_value = DEFAULT_FILE_NAME, help = "File name to clean")]
    name: String,
    #[arg(short = 'n', long, help = "Report what would change without writing")]
    dry_run: bool,
    #[arg(long, help = "Like --dry-run, but exit 7 when any file would change")]
    check: bool,
    #[arg(long, help = "Follow symlinked directories")]
    follow_links: bool,
    #[arg(long, value_name = "N", help = "Limit recursion depth (1 = files directly in --dir)")]
    max_depth: Option<usize>,
    #[arg(
        short = 'e',
        long = "errors",
        default_value = "stop",
        value_enum,
        help = "Per-file error policy: stop|skip"
    )]
    errors: ErrorPolicyCli,
    #[arg(long, help = "Emit the JSON summary even on a terminal")]
    json: bool,
    #[arg(short, long, help = "Print nothing on success")]
    quiet: bool,
    #[arg(
        long,
        default_value = "auto",
        value_enum,
        help = "Colorize human output and stderr diagnostics: auto|always|never"
    )]
    color: ColorMode,
}

#[derive(Copy, Clone, Debug, PartialEq, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

#[derive(Copy, Clone, Debug, PartialEq, ValueEnum)]
enum ErrorPolicyCli {
    Stop,
    Skip,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

fn error_policy_from_cli(policy: ErrorPolicyCli) -> ErrorPolicy {
    match policy {
        ErrorPolicyCli::Stop => ErrorPolicy::Stop,
        ErrorPolicyCli::Skip => ErrorPolicy::Skip,
    }
}

fn clean_config_from_cli(cli: &Cli) -> CleanConfig {
    CleanConfig {
        root: cli.dir.clone(),
        file_name: cli.name.clone(),
        dry_run: cli.dry_run || cli.check,
        follow_links: cli.follow_links,
        max_depth: cli.max_depth,
        errors: error_policy_from_cli(cli.errors),
    }
}

fn execute(cli: &Cli, stderr: &Diagnostics) -> Result<i32, Error> {
    if cli.name.is_empty() || cli.name.contains(['/', '\\']) {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--name must be a bare file name")
            .with_hint("Use a name like __init__.py, without directories."));
    }

    let config = clean_config_from_cli(cli);
    let summary = clean_tree(&config, |report| stderr.notice(Notice::skipped(report)))?;
    if config.dry_run {
        stderr.notice(Notice::dry_run(&summary));
    }

    if !cli.quiet {
        emit_summary(&summary, cli);
    }

    if cli.check && summary.cleaned > 0 {
        return Ok(to_exit_code(ErrorKind::Unclean));
    }
    Ok(0)
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn emit_summary(summary: &RunSummary, cli: &Cli) {
    let is_tty = io::stdout().is_terminal();
    if cli.json || !is_tty {
        let value = summary_json(summary);
        if is_tty {
            println!("{value:#}");
        } else {
            println!("{value}");
        }
        return;
    }
    println!("{}", render_summary_human(summary, cli.color.use_color(is_tty)));
}

fn short_display_path(path: &Path, base_dir: &Path) -> String {
    if let Ok(relative) = path.strip_prefix(base_dir) {
        if !relative.as_os_str().is_empty() {
            return relative.display().to_string();
        }
    }
    path.display().to_string()
}

fn plural(count: usize, word: &str) -> String {
    if count == 1 {
        format!("{count} {word}")
    } else {
        format!("{count} {word}s")
    }
}

fn render_summary_human(summary: &RunSummary, use_color: bool) -> String {
    let verb = if summary.dry_run { "would clean" } else { "cleaned" };
    let mut lines = Vec::new();
    for report in &summary.files {
        if report.status != FileStatus::Cleaned {
            continue;
        }
        let ranges = report
            .blocks
            .iter()
            .map(|block| format!("{}-{}", block.start_line, block.end_line))
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(format!(
            "{} {}  ({}, lines {ranges})",
            AnsiColor::Green.paint(verb, use_color),
            short_display_path(&report.path, &summary.root),
            plural(report.blocks.len(), "block"),
        ));
    }
    lines.push(format!(
        "{} scanned, {} {verb}, {} unchanged, {} skipped",
        plural(summary.scanned, "file"),
        summary.cleaned,
        summary.unchanged,
        summary.skipped,
    ));
    lines.join("\n")
}

#[derive(Copy, Clone, Debug)]
enum AnsiColor {
    Red,
    Yellow,
    Green,
}

impl AnsiColor {
    fn paint(self, text: &str, enabled: bool) -> String {
        if !enabled {
            return text.to_string();
        }
        let code = match self {
            AnsiColor::Red => 31,
            AnsiColor::Yellow => 33,
            AnsiColor::Green => 32,
        };
        format!("\u{1b}[{code}m{text}\u{1b}[0m")
    }
}

/// Stderr sink for errors and notices: one JSON object per line off a terminal.
struct Diagnostics {
    json: bool,
    color: bool,
}

impl Diagnostics {
    fn for_stderr(color_mode: ColorMode) -> Self {
        let is_tty = io::stderr().is_terminal();
        Self {
            json: !is_tty,
            color: color_mode.use_color(is_tty),
        }
    }

    /// Report a fatal error and return the process exit code for it.
    fn error(&self, err: &Error) -> i32 {
        let view = ErrorView::of(err);
        if self.json {
            eprintln!("{}", view.to_json());
        } else {
            eprintln!("{}", view.to_text(self.color));
        }
        to_exit_code(err.kind())
    }

    fn notice(&self, notice: Notice) {
        let notice = match OffsetDateTime::now_utc().format(&Rfc3339) {
            Ok(stamp) => notice.at(stamp),
            Err(_) => notice,
        };
        if self.json {
            eprintln!("{}", notice_json(&notice));
        } else {
            let label = format!("{}:", notice.kind.as_str());
            eprintln!("{} {}", AnsiColor::Yellow.paint(&label, self.color), notice.human_line());
        }
    }
}

/// Flattened view of an `Error` for rendering, with its source chain as strings.
struct ErrorView<'a> {
    kind: ErrorKind,
    message: &'a str,
    hint: Option<&'a str>,
    path: Option<&'a Path>,
    line: Option<usize>,
    causes: Vec<String>,
}

impl<'a> ErrorView<'a> {
    fn of(err: &'a Error) -> Self {
        let causes = std::iter::successors(err.source(), |&source| source.source())
            .map(|source| source.to_string())
            .collect();
        Self {
            kind: err.kind(),
            message: err.describe(),
            hint: err.hint(),
            path: err.path(),
            line: err.line(),
            causes,
        }
    }

    fn to_json(&self) -> Value {
        let mut inner = Map::new();
        inner.insert("kind".to_string(), json!(format!("{:?}", self.kind)));
        inner.insert("message".to_string(), json!(self.message));
        if let Some(hint) = self.hint {
            inner.insert("hint".to_string(), json!(hint));
        }
        if let Some(path) = self.path {
            inner.insert("path".to_string(), json!(path.display().to_string()));
        }
        if let Some(line) = self.line {
            inner.insert("line".to_string(), json!(line));
        }
        if !self.causes.is_empty() {
            inner.insert("causes".to_string(), json!(self.causes));
        }
        json!({ "error": inner })
    }

    fn to_text(&self, color: bool) -> String {
        let context = [
            ("hint:", self.hint.map(str::to_string)),
            ("path:", self.path.map(|path| path.display().to_string())),
            ("line:", self.line.map(|line| line.to_string())),
            ("caused by:", self.causes.first().cloned()),
        ];
        let mut lines = vec![format!("{} {}", AnsiColor::Red.paint("error:", color), self.message)];
        lines.extend(context.into_iter().filter_map(|(label, value)| {
            value.map(|value| format!("{} {value}", AnsiColor::Yellow.paint(label, color)))
        }));
        lines.join("\n")
    }
}
