//! Purpose: Locate and remove top-level `if __name__ == "__main__":` blocks in Python source.
//! Exports: `GuardMatcher`, `GuardBlock`, `StripOutcome`.
//! Role: Pure text transform used by `core::clean`; performs no I/O.
//! Invariants: Bytes outside removed blocks are preserved exactly (CRLF included).
//! Invariants: Only column-0 guards are recognized; nested guards are left alone.
//! Invariants: Stripping is idempotent.
//! Invariants: A removal that would leave an `else`/`elif` arm or an unterminated
//! Invariants: triple-quoted string behind is refused, never partially applied.
use std::ops::Range;

use regex::Regex;

use crate::core::error::{Error, ErrorKind};

const ELSE_PATTERN: &str = r"^(?:else[ \t]*:|elif\b)";
// Either operand order, either quote style, optional parens, optional trailing comment.
const GUARD_PATTERN: &str = r#"^if[ \t]*\(?[ \t]*(?:__name__[ \t]*==[ \t]*['"]__main__['"]|['"]__main__['"][ \t]*==[ \t]*__name__)[ \t]*\)?[ \t]*:[ \t]*(?:#.*)?$"#;

/// One removed block. Lines are 1-based and inclusive.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GuardBlock {
    pub start_line: usize,
    pub end_line: usize,
    pub byte_range: Range<usize>,
}

impl GuardBlock {
    pub fn line_count(&self) -> usize {
        self.end_line - self.start_line + 1
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StripOutcome {
    pub text: String,
    pub blocks: Vec<GuardBlock>,
}

impl StripOutcome {
    pub fn changed(&self) -> bool {
        !self.blocks.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct GuardMatcher {
    guard: Regex,
    else_arm: Regex,
}

struct Extent {
    block: GuardBlock,
    // 0-based index of the column-0 line that ended the block, if any.
    closer: Option<usize>,
}

struct Line<'a> {
    start: usize,
    end: usize,
    content: &'a str,
}

impl Line<'_> {
    fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }

    fn is_indented(&self) -> bool {
        self.content.starts_with([' ', '\t'])
    }

    /// Column-0 comments may sit inside an indented suite.
    fn is_neutral(&self) -> bool {
        self.is_blank() || self.content.starts_with('#')
    }
}

fn split_lines(text: &str) -> Vec<Line<'_>> {
    let mut lines = Vec::new();
    let mut start = 0;
    for raw in text.split_inclusive('\n') {
        let end = start + raw.len();
        let content = raw.trim_end_matches('\n').trim_end_matches('\r');
        lines.push(Line {
            start,
            end,
            content,
        });
        start = end;
    }
    lines
}

impl GuardMatcher {
    pub fn new() -> Result<Self, Error> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|err| {
                Error::new(ErrorKind::Internal)
                    .with_message("failed to compile main-guard pattern")
                    .with_source(err)
            })
        };
        Ok(Self {
            guard: compile(GUARD_PATTERN)?,
            else_arm: compile(ELSE_PATTERN)?,
        })
    }

    pub fn is_guard_line(&self, line: &str) -> bool {
        self.guard.is_match(line.trim_end_matches(['\r', '\n']))
    }

    /// A block is the guard line plus every following indented, blank, or
    /// column-0 comment line, minus any such trailing lines that are not indented.
    pub fn find_blocks(&self, text: &str) -> Vec<GuardBlock> {
        self.extents(&split_lines(text))
            .into_iter()
            .map(|extent| extent.block)
            .collect()
    }

    fn extents(&self, lines: &[Line<'_>]) -> Vec<Extent> {
        let mut extents = Vec::new();
        let mut idx = 0;
        while idx < lines.len() {
            if !self.guard.is_match(lines[idx].content) {
                idx += 1;
                continue;
            }

            let mut last = idx;
            let mut closer = None;
            for (cursor, line) in lines.iter().enumerate().skip(idx + 1) {
                if line.is_indented() && !line.is_blank() {
                    last = cursor;
                } else if !line.is_neutral() {
                    closer = Some(cursor);
                    break;
                }
            }

            extents.push(Extent {
                block: GuardBlock {
                    start_line: idx + 1,
                    end_line: last + 1,
                    byte_range: lines[idx].start..lines[last].end,
                },
                closer,
            });
            idx = last + 1;
        }
        extents
    }

    /// Fails with `Usage` when removing a block would leave broken or
    /// behavior-changing Python behind; the text is then left as is.
    pub fn strip(&self, text: &str) -> Result<StripOutcome, Error> {
        let lines = split_lines(text);
        let extents = self.extents(&lines);
        for extent in &extents {
            self.check_removable(text, &lines, extent)?;
        }

        let blocks: Vec<GuardBlock> = extents.into_iter().map(|extent| extent.block).collect();
        if blocks.is_empty() {
            return Ok(StripOutcome {
                text: text.to_string(),
                blocks,
            });
        }

        let removed: usize = blocks.iter().map(|block| block.byte_range.len()).sum();
        let mut out = String::with_capacity(text.len() - removed);
        let mut kept_from = 0;
        for block in &blocks {
            out.push_str(&text[kept_from..block.byte_range.start]);
            kept_from = block.byte_range.end;
        }
        out.push_str(&text[kept_from..]);

        Ok(StripOutcome { text: out, blocks })
    }

    fn check_removable(
        &self,
        text: &str,
        lines: &[Line<'_>],
        extent: &Extent,
    ) -> Result<(), Error> {
        if let Some(closer) = extent.closer {
            if self.else_arm.is_match(lines[closer].content) {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("main guard has an else/elif arm")
                    .with_line(closer + 1)
                    .with_hint("Remove the guard by hand, or rerun with --errors skip."));
            }
        }

        let removed = &text[extent.block.byte_range.clone()];
        let unbalanced = ["\"\"\"", "'''"]
            .iter()
            .any(|quote| removed.matches(*quote).count() % 2 == 1);
        if unbalanced {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("main guard body has a multi-line string reaching column 0")
                .with_line(extent.block.start_line)
                .with_hint("Remove the guard by hand, or rerun with --errors skip."));
        }
        Ok(())
    }
}
