//! Unified diff parsing.
//!
//! Turns the text of `git diff` into per-file records. Hunk bodies are read by
//! the line counts in their `@@` header, so content lines that happen to start
//! with `---` or `diff --git` are never mistaken for file headers.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static HUNK_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@ ?(.*)$")
        .expect("static regex is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Add,
    Delete,
    Normal,
}

/// One line inside a hunk. `content` excludes the leading marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Change {
    pub kind: ChangeKind,
    pub content: String,
    pub old_line: Option<u32>,
    pub new_line: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hunk {
    /// The full `@@ ... @@` line.
    pub header: String,
    pub old_start: u32,
    pub old_lines: u32,
    pub new_start: u32,
    pub new_lines: u32,
    pub changes: Vec<Change>,
}

/// Changes to a single file. `from`/`to` are `None` for `/dev/null`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileDiff {
    pub from: Option<String>,
    pub to: Option<String>,
    pub new_file: bool,
    pub deleted_file: bool,
    pub renamed: bool,
    pub binary: bool,
    /// Contents of the `index` line, e.g. `e69de29..8b13789 100644`.
    pub index: Option<String>,
    pub hunks: Vec<Hunk>,
    pub additions: usize,
    pub deletions: usize,
}

impl FileDiff {
    /// The path this record is about: the new path, or the old one for
    /// deletions.
    pub fn path(&self) -> &str {
        self.to
            .as_deref()
            .or(self.from.as_deref())
            .unwrap_or_default()
    }
}

struct HunkCursor {
    old_remaining: u32,
    new_remaining: u32,
    old_line: u32,
    new_line: u32,
}

/// Parse `git diff` output into file records, in output order.
pub fn parse_diff(input: &str) -> Vec<FileDiff> {
    let mut files: Vec<FileDiff> = Vec::new();
    let mut cursor: Option<HunkCursor> = None;

    for line in input.lines() {
        if let Some(cur) = cursor.as_mut() {
            if cur.old_remaining > 0 || cur.new_remaining > 0 {
                if let Some(file) = files.last_mut() {
                    if take_hunk_line(file, cur, line) {
                        continue;
                    }
                }
            }
            cursor = None;
        }

        if line.starts_with('\\') {
            // "\ No newline at end of file"
            continue;
        }

        if let Some(rest) = line.strip_prefix("diff --git ") {
            let (from, to) = split_git_header(rest);
            files.push(FileDiff {
                from,
                to,
                ..FileDiff::default()
            });
            continue;
        }

        if let Some(rest) = line.strip_prefix("--- ") {
            if files.last().is_none_or(|f| !f.hunks.is_empty()) {
                files.push(FileDiff::default());
            }
            if let Some(file) = files.last_mut() {
                file.from = header_path(rest, "a/");
            }
            continue;
        }

        let Some(file) = files.last_mut() else {
            continue;
        };

        if let Some(rest) = line.strip_prefix("+++ ") {
            file.to = header_path(rest, "b/");
        } else if line.starts_with("new file mode") {
            file.new_file = true;
        } else if line.starts_with("deleted file mode") {
            file.deleted_file = true;
        } else if let Some(rest) = line.strip_prefix("index ") {
            file.index = Some(rest.to_string());
        } else if let Some(rest) = line.strip_prefix("rename from ") {
            file.from = Some(rest.to_string());
            file.renamed = true;
        } else if let Some(rest) = line.strip_prefix("rename to ") {
            file.to = Some(rest.to_string());
            file.renamed = true;
        } else if line.starts_with("Binary files ") {
            file.binary = true;
        } else if let Some(caps) = HUNK_HEADER.captures(line) {
            let num = |i: usize, default: u32| {
                caps.get(i)
                    .and_then(|m| m.as_str().parse().ok())
                    .unwrap_or(default)
            };
            let hunk = Hunk {
                header: line.to_string(),
                old_start: num(1, 0),
                old_lines: num(2, 1),
                new_start: num(3, 0),
                new_lines: num(4, 1),
                changes: Vec::new(),
            };
            cursor = Some(HunkCursor {
                old_remaining: hunk.old_lines,
                new_remaining: hunk.new_lines,
                old_line: hunk.old_start,
                new_line: hunk.new_start,
            });
            file.hunks.push(hunk);
        }
    }

    files
}

/// Consume one hunk body line. Returns `false` if the line does not belong
/// to the hunk.
fn take_hunk_line(file: &mut FileDiff, cur: &mut HunkCursor, line: &str) -> bool {
    let Some(hunk) = file.hunks.last_mut() else {
        return false;
    };

    let (kind, content) = match line.chars().next() {
        Some('+') if cur.new_remaining > 0 => (ChangeKind::Add, &line[1..]),
        Some('-') if cur.old_remaining > 0 => (ChangeKind::Delete, &line[1..]),
        Some(' ') if cur.old_remaining > 0 && cur.new_remaining > 0 => {
            (ChangeKind::Normal, &line[1..])
        }
        None if cur.old_remaining > 0 && cur.new_remaining > 0 => (ChangeKind::Normal, ""),
        Some('\\') => return true,
        _ => return false,
    };

    let change = match kind {
        ChangeKind::Add => {
            file.additions += 1;
            cur.new_remaining -= 1;
            cur.new_line += 1;
            Change {
                kind,
                content: content.to_string(),
                old_line: None,
                new_line: Some(cur.new_line - 1),
            }
        }
        ChangeKind::Delete => {
            file.deletions += 1;
            cur.old_remaining -= 1;
            cur.old_line += 1;
            Change {
                kind,
                content: content.to_string(),
                old_line: Some(cur.old_line - 1),
                new_line: None,
            }
        }
        ChangeKind::Normal => {
            cur.old_remaining -= 1;
            cur.new_remaining -= 1;
            cur.old_line += 1;
            cur.new_line += 1;
            Change {
                kind,
                content: content.to_string(),
                old_line: Some(cur.old_line - 1),
                new_line: Some(cur.new_line - 1),
            }
        }
    };
    hunk.changes.push(change);
    true
}

/// `a/<old> b/<new>` from a `diff --git` line.
fn split_git_header(rest: &str) -> (Option<String>, Option<String>) {
    match rest.rfind(" b/") {
        Some(idx) => (
            header_path(&rest[..idx], "a/"),
            header_path(&rest[idx + 1..], "b/"),
        ),
        None => (None, None),
    }
}

fn header_path(raw: &str, prefix: &str) -> Option<String> {
    // `--- a/file\t<timestamp>` in non-git diffs
    let raw = raw.split('\t').next().unwrap_or_default().trim_end();
    if raw == "/dev/null" {
        return None;
    }
    Some(raw.strip_prefix(prefix).unwrap_or(raw).to_string())
}
