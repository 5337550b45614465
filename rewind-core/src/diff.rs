use crate::models::FileStatus;
use serde::{Deserialize, Serialize};
use similar::{ChangeTag, TextDiff};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDiff {
    pub path: String,
    pub old_content: Option<String>,
    pub new_content: Option<String>,
    pub diff_lines: Vec<DiffLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffLine {
    pub line_type: DiffLineType,
    pub content: String,
    pub old_line_number: Option<usize>,
    pub new_line_number: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffLineType {
    Context,
    Addition,
    Deletion,
}

impl FileDiff {
    /// Diff between the file as it is now and as it will be after a rollback.
    /// Missing sides are treated as empty; non UTF-8 content yields no lines.
    pub fn from_contents(path: impl Into<String>, old: Option<Vec<u8>>, new: Option<Vec<u8>>) -> Self {
        let old_content = old.and_then(|bytes| String::from_utf8(bytes).ok());
        let new_content = new.and_then(|bytes| String::from_utf8(bytes).ok());

        let diff_lines = Self::compute_diff(
            old_content.as_deref().unwrap_or_default(),
            new_content.as_deref().unwrap_or_default(),
        );

        FileDiff {
            path: path.into(),
            old_content,
            new_content,
            diff_lines,
        }
    }

    fn compute_diff(old_text: &str, new_text: &str) -> Vec<DiffLine> {
        let diff = TextDiff::from_lines(old_text, new_text);
        let mut lines = Vec::new();
        let mut old_line_num = 1;
        let mut new_line_num = 1;

        for change in diff.iter_all_changes() {
            let (line_type, old_num, new_num) = match change.tag() {
                ChangeTag::Delete => {
                    let num = old_line_num;
                    old_line_num += 1;
                    (DiffLineType::Deletion, Some(num), None)
                }
                ChangeTag::Insert => {
                    let num = new_line_num;
                    new_line_num += 1;
                    (DiffLineType::Addition, None, Some(num))
                }
                ChangeTag::Equal => {
                    let old_num = old_line_num;
                    let new_num = new_line_num;
                    old_line_num += 1;
                    new_line_num += 1;
                    (DiffLineType::Context, Some(old_num), Some(new_num))
                }
            };

            lines.push(DiffLine {
                line_type,
                content: change.to_string(),
                old_line_number: old_num,
                new_line_number: new_num,
            });
        }

        lines
    }

    pub fn has_changes(&self) -> bool {
        self.diff_lines
            .iter()
            .any(|l| l.line_type != DiffLineType::Context)
    }

    pub fn format_unified(&self, context_lines: usize) -> String {
        let old = self.old_content.as_deref().unwrap_or_default();
        let new = self.new_content.as_deref().unwrap_or_default();
        let a = format!("a/{}", self.path);
        let b = format!("b/{}", self.path);

        TextDiff::from_lines(old, new)
            .unified_diff()
            .context_radius(context_lines)
            .header(&a, &b)
            .to_string()
    }
}

/// One `@@ -a,b +c,d @@` header of a zero-context diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hunk {
    pub old_start: u64,
    pub old_len: u64,
    pub new_start: u64,
    pub new_len: u64,
}

impl Hunk {
    fn parse_header(line: &str) -> Option<Self> {
        let body = line.strip_prefix("@@ ")?;
        let end = body.find(" @@")?;
        let mut parts = body[..end].split_whitespace();
        let (old_start, old_len) = parse_range(parts.next()?.strip_prefix('-')?)?;
        let (new_start, new_len) = parse_range(parts.next()?.strip_prefix('+')?)?;

        Some(Hunk {
            old_start,
            old_len,
            new_start,
            new_len,
        })
    }
}

fn parse_range(range: &str) -> Option<(u64, u64)> {
    match range.split_once(',') {
        Some((start, len)) => Some((start.parse().ok()?, len.parse().ok()?)),
        None => Some((range.parse().ok()?, 1)),
    }
}

/// Closed line intervals that touch or overlap. Adjacent edits count, as
/// they do for git's merge machinery.
fn intervals_touch(a_start: u64, a_len: u64, b_start: u64, b_len: u64) -> bool {
    let a_end = a_start + a_len;
    let b_end = b_start + b_len;
    a_start <= b_end && b_start <= a_end
}

/// Hunks of one file in a zero-context diff.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilePatch {
    pub old_path: Option<String>,
    pub new_path: Option<String>,
    pub hunks: Vec<Hunk>,
    /// Binary or mode-only changes carry no hunks and count as touching
    /// the whole file.
    pub whole_file: bool,
}

impl FilePatch {
    /// Whether this patch's result lines (new side) touch lines that a later
    /// patch rewrites (its old side).
    pub fn touches_later(&self, later: &FilePatch) -> bool {
        if self.whole_file || later.whole_file {
            return true;
        }
        self.hunks.iter().any(|mine| {
            later.hunks.iter().any(|theirs| {
                intervals_touch(mine.new_start, mine.new_len, theirs.old_start, theirs.old_len)
            })
        })
    }

    /// The path on which reverting this patch would collide with `later`.
    ///
    /// A patch that deletes a file collides with any later commit that
    /// brings the path back or touches it again, since reverting recreates
    /// the file.
    pub fn conflicts_with_later<'a>(&'a self, later: &FilePatch) -> Option<&'a str> {
        match (self.new_path.as_deref(), self.old_path.as_deref()) {
            (Some(path), _) => {
                (later.old_path.as_deref() == Some(path) && self.touches_later(later)).then_some(path)
            }
            (None, Some(path)) => (later.old_path.as_deref() == Some(path)
                || later.new_path.as_deref() == Some(path))
            .then_some(path),
            (None, None) => None,
        }
    }
}

/// Parses `git diff -U0` output.
pub fn parse_zero_context(diff: &str) -> Vec<FilePatch> {
    let mut patches: Vec<FilePatch> = Vec::new();

    for line in diff.lines() {
        if let Some(rest) = line.strip_prefix("diff --git ") {
            let (old, new) = match rest.split_once(" b/") {
                Some((a, b)) => (a.strip_prefix("a/").map(str::to_string), Some(b.to_string())),
                None => (None, None),
            };
            patches.push(FilePatch {
                old_path: old,
                new_path: new,
                hunks: Vec::new(),
                whole_file: true,
            });
            continue;
        }

        let Some(current) = patches.last_mut() else {
            continue;
        };

        if let Some(path) = line.strip_prefix("--- ") {
            current.old_path = strip_side(path, "a/");
        } else if let Some(path) = line.strip_prefix("+++ ") {
            current.new_path = strip_side(path, "b/");
        } else if line.starts_with("@@ ") {
            if let Some(hunk) = Hunk::parse_header(line) {
                current.hunks.push(hunk);
                current.whole_file = false;
            }
        }
    }

    patches
}

fn strip_side(path: &str, prefix: &str) -> Option<String> {
    let path = path.trim_end();
    if path == "/dev/null" {
        None
    } else {
        Some(path.strip_prefix(prefix).unwrap_or(path).to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumstatEntry {
    pub path: String,
    /// `None` for binary files.
    pub added: Option<u64>,
    pub removed: Option<u64>,
}

/// Parses `git diff --numstat -z`. Renames report the new path.
pub fn parse_numstat_z(output: &str) -> Vec<NumstatEntry> {
    let mut entries = Vec::new();
    let mut fields = output.split('\0');

    while let Some(record) = fields.next() {
        if record.is_empty() {
            continue;
        }
        let mut parts = record.splitn(3, '\t');
        let added = parts.next().and_then(|n| n.parse().ok());
        let removed = parts.next().and_then(|n| n.parse().ok());
        let mut path = parts.next().unwrap_or_default().to_string();

        if path.is_empty() {
            // Rename: "<a>\t<r>\t\0<old>\0<new>\0"
            let _old = fields.next();
            path = fields.next().unwrap_or_default().to_string();
        }

        entries.push(NumstatEntry {
            path,
            added,
            removed,
        });
    }

    entries
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameStatusEntry {
    pub status: FileStatus,
    pub path: String,
    pub old_path: Option<String>,
}

/// Parses `git diff --name-status -z`.
pub fn parse_name_status_z(output: &str) -> Vec<NameStatusEntry> {
    let mut entries = Vec::new();
    let mut fields = output.split('\0');

    while let Some(code) = fields.next() {
        let Some(letter) = code.chars().next() else {
            continue;
        };
        let first = fields.next().unwrap_or_default().to_string();

        let (path, old_path) = if letter == 'R' || letter == 'C' {
            let new = fields.next().unwrap_or_default().to_string();
            (new, Some(first))
        } else {
            (first, None)
        };

        if let Some(status) = FileStatus::from_git_letter(letter) {
            entries.push(NameStatusEntry {
                status,
                path,
                old_path,
            });
        }
    }

    entries
}
