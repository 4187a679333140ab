//! Git integration: the sole interface to `git`, producing the shape the
//! pipeline's external inputs assume (spec §6: pre/post text per changed
//! file, hunks with absolute line numbers, optional commit history).
//!
//! All other modules work with [`DiffFile`]/[`DiffHunk`] and
//! [`CommitRecord`] rather than raw git output.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{ContextRankError, Result};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Options controlling which diff to produce.
#[derive(Debug, Clone)]
pub struct DiffOptions {
    /// Repository root directory.
    pub root: PathBuf,
    /// Optional revision range (e.g. "HEAD~3..HEAD").
    pub rev_range: Option<String>,
    /// If true, diff staged (index) changes only.
    pub staged: bool,
    /// If true, include untracked files in the diff.
    pub untracked: bool,
    /// Optional base reference or duration (e.g. "2h", "2024-01-01").
    pub since: Option<String>,
}

/// A single file affected by the diff, with both the parsed hunks and
/// (when available) the full pre/post text the pipeline's fragmenter
/// operates on (spec §6 input shape).
#[derive(Debug, Clone, PartialEq)]
pub struct DiffFile {
    /// Path to the file (relative to repo root).
    pub path: String,
    /// Previous path if the file was renamed.
    pub old_path: Option<String>,
    /// How the file was changed.
    pub status: FileStatus,
    /// Individual change regions within the file.
    pub hunks: Vec<DiffHunk>,
    /// Full pre-image content. `None` if the file was added.
    pub pre_text: Option<String>,
    /// Full post-image content. `None` if the file was deleted.
    pub post_text: Option<String>,
}

/// The kind of change applied to a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Added,
    Modified,
    Deleted,
    Renamed,
}

/// A contiguous region of changes within a file.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffHunk {
    /// Starting line number in the old file.
    pub old_start: usize,
    /// Number of lines from the old file.
    pub old_count: usize,
    /// Starting line number in the new file.
    pub new_start: usize,
    /// Number of lines in the new file.
    pub new_count: usize,
    /// The `@@` header line (e.g. `@@ -10,7 +10,8 @@ fn main()`).
    pub header: String,
    /// Individual lines in this hunk.
    pub lines: Vec<DiffLine>,
}

impl DiffHunk {
    /// Added-line range on the post-image side, if any added lines exist.
    pub fn added_range(&self) -> Option<(usize, usize)> {
        line_range(&self.lines, LineKind::Added, |l| l.new_lineno)
    }

    /// Removed-line range on the pre-image side, if any removed lines exist.
    pub fn removed_range(&self) -> Option<(usize, usize)> {
        line_range(&self.lines, LineKind::Removed, |l| l.old_lineno)
    }
}

fn line_range(
    lines: &[DiffLine],
    kind: LineKind,
    lineno: impl Fn(&DiffLine) -> Option<usize>,
) -> Option<(usize, usize)> {
    let nums: Vec<usize> = lines
        .iter()
        .filter(|l| l.kind == kind)
        .filter_map(lineno)
        .collect();
    let min = *nums.iter().min()?;
    let max = *nums.iter().max()?;
    Some((min, max))
}

/// A single line within a [`DiffHunk`].
#[derive(Debug, Clone, PartialEq)]
pub struct DiffLine {
    /// Whether this line was added, removed, or is context.
    pub kind: LineKind,
    /// The text content of the line (without the leading +/-/space).
    pub content: String,
    /// Line number in the old file, if applicable.
    pub old_lineno: Option<usize>,
    /// Line number in the new file, if applicable.
    pub new_lineno: Option<usize>,
}

/// Classification of a diff line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Context,
    Added,
    Removed,
}

/// One historical commit's metadata, used by the History edge family
/// (spec §4.5).
#[derive(Debug, Clone, PartialEq)]
pub struct CommitRecord {
    pub commit_sha: String,
    pub changed_paths: Vec<String>,
}

// ---------------------------------------------------------------------------
// Git command execution
// ---------------------------------------------------------------------------

/// Run a git command in the given directory and return its stdout.
fn run_git(args: &[&str], cwd: &Path) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .output()
        .map_err(|e| ContextRankError::Git {
            message: format!("failed to execute git: {e}"),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(ContextRankError::Git {
            message: if stderr.is_empty() {
                format!("git exited with status {}", output.status)
            } else {
                stderr
            },
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Verify that the given path is inside a git repository.
pub fn verify_git_repo(root: &Path) -> Result<()> {
    run_git(&["rev-parse", "--git-dir"], root).map(|_| ())
}

// ---------------------------------------------------------------------------
// Diff retrieval
// ---------------------------------------------------------------------------

/// Obtain a parsed diff from the repository, including pre/post file text
/// (spec §6), according to the given options.
pub fn get_diff(options: &DiffOptions) -> Result<Vec<DiffFile>> {
    verify_git_repo(&options.root)?;

    let mut args = vec!["diff", "--no-color", "-u"];

    if options.staged {
        args.push("--cached");
    }

    let since_rev;
    if let Some(ref range) = options.rev_range {
        args.push(range);
    } else if let Some(ref since) = options.since {
        since_rev = resolve_since_rev(&options.root, since)?;
        args.push(&since_rev);
    }

    let raw = run_git(&args, &options.root)?;
    let mut files = parse_unified_diff(&raw);

    for file in &mut files {
        fill_pre_post_text(file, &options.root, options.staged);
    }

    if options.untracked {
        let untracked = get_untracked_files(&options.root)?;
        for path in untracked {
            let content = std::fs::read_to_string(options.root.join(&path)).unwrap_or_default();
            let lines: Vec<DiffLine> = content
                .lines()
                .enumerate()
                .map(|(i, line)| DiffLine {
                    kind: LineKind::Added,
                    content: line.to_string(),
                    old_lineno: None,
                    new_lineno: Some(i + 1),
                })
                .collect();

            let line_count = lines.len();
            if line_count == 0 {
                continue;
            }

            files.push(DiffFile {
                path: path.clone(),
                old_path: None,
                status: FileStatus::Added,
                hunks: vec![DiffHunk {
                    old_start: 0,
                    old_count: 0,
                    new_start: 1,
                    new_count: line_count,
                    header: format!("@@ -0,0 +1,{line_count} @@"),
                    lines,
                }],
                pre_text: None,
                post_text: Some(content),
            });
        }
    }

    Ok(files)
}

/// Populate `pre_text`/`post_text` by reading from the worktree (or the
/// index, for `--staged` diffs) and git's object store for the pre-image.
fn fill_pre_post_text(file: &mut DiffFile, root: &Path, staged: bool) {
    if file.status != FileStatus::Added {
        let old_ref = if staged { "HEAD" } else { ":0" };
        let old_path = file.old_path.as_deref().unwrap_or(&file.path);
        if let Ok(text) = run_git(&["show", &format!("{old_ref}:{old_path}")], root) {
            file.pre_text = Some(text);
        }
    }
    if file.status != FileStatus::Deleted {
        if staged {
            if let Ok(text) = run_git(&["show", &format!(":0:{}", file.path)], root) {
                file.post_text = Some(text);
            }
        } else if let Ok(text) = std::fs::read_to_string(root.join(&file.path)) {
            file.post_text = Some(text);
        }
    }
}

/// Resolve a `--since` value to a revision range string (e.g. "abc123..HEAD").
fn resolve_since_rev(root: &Path, since: &str) -> Result<String> {
    let output = run_git(
        &["rev-list", "-1", &format!("--before={since}"), "HEAD"],
        root,
    )?;
    let base = output.trim();
    if base.is_empty() {
        return Err(ContextRankError::Git {
            message: format!("no commits found before '{since}'"),
        });
    }
    Ok(format!("{base}..HEAD"))
}

/// List untracked files in the repository.
fn get_untracked_files(root: &Path) -> Result<Vec<String>> {
    let output = run_git(&["ls-files", "--others", "--exclude-standard"], root)?;
    Ok(output
        .lines()
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect())
}

/// Fetch up to `window` of the most recent commits and the paths each
/// touched, newest first (spec §6 "Optional commit history", feeding the
/// History edge family, spec §4.5).
pub fn get_commit_history(root: &Path, window: usize) -> Result<Vec<CommitRecord>> {
    verify_git_repo(root)?;
    let max_count = format!("-{window}");
    let output = run_git(
        &["log", &max_count, "--name-only", "--pretty=format:%x01%H"],
        root,
    )?;

    let mut records = Vec::new();
    let mut current: Option<CommitRecord> = None;
    for line in output.lines() {
        if let Some(sha) = line.strip_prefix('\x01') {
            if let Some(rec) = current.take() {
                records.push(rec);
            }
            current = Some(CommitRecord {
                commit_sha: sha.to_string(),
                changed_paths: Vec::new(),
            });
        } else if !line.trim().is_empty() {
            if let Some(ref mut rec) = current {
                rec.changed_paths.push(line.trim().to_string());
            }
        }
    }
    if let Some(rec) = current.take() {
        records.push(rec);
    }
    Ok(records)
}

// ---------------------------------------------------------------------------
// Unified diff parser
// ---------------------------------------------------------------------------

/// Parse the full output of `git diff -u` into structured [`DiffFile`] values.
pub fn parse_unified_diff(input: &str) -> Vec<DiffFile> {
    let mut files: Vec<DiffFile> = Vec::new();
    let mut current_file: Option<DiffFile> = None;
    let mut current_hunk: Option<DiffHunk> = None;
    let mut old_lineno: usize = 0;
    let mut new_lineno: usize = 0;

    for line in input.lines() {
        if line.starts_with("diff --git ") {
            flush_hunk(&mut current_file, &mut current_hunk);
            if let Some(file) = current_file.take() {
                files.push(file);
            }

            let (a_path, b_path) = parse_diff_header(line);
            let status = if a_path != b_path {
                FileStatus::Renamed
            } else {
                FileStatus::Modified
            };

            current_file = Some(DiffFile {
                path: b_path.clone(),
                old_path: if a_path != b_path { Some(a_path) } else { None },
                status,
                hunks: Vec::new(),
                pre_text: None,
                post_text: None,
            });
            continue;
        }

        if line.starts_with("--- /dev/null") {
            if let Some(ref mut f) = current_file {
                f.status = FileStatus::Added;
            }
            continue;
        }
        if line.starts_with("+++ /dev/null") {
            if let Some(ref mut f) = current_file {
                f.status = FileStatus::Deleted;
            }
            continue;
        }

        if line.starts_with("--- ") || line.starts_with("+++ ") {
            continue;
        }

        if line.starts_with("@@ ") {
            flush_hunk(&mut current_file, &mut current_hunk);
            if let Some(hunk) = parse_hunk_header(line) {
                old_lineno = hunk.old_start;
                new_lineno = hunk.new_start;
                current_hunk = Some(hunk);
            }
            continue;
        }

        if let Some(ref mut hunk) = current_hunk {
            if let Some(stripped) = line.strip_prefix('+') {
                hunk.lines.push(DiffLine {
                    kind: LineKind::Added,
                    content: stripped.to_string(),
                    old_lineno: None,
                    new_lineno: Some(new_lineno),
                });
                new_lineno += 1;
            } else if let Some(stripped) = line.strip_prefix('-') {
                hunk.lines.push(DiffLine {
                    kind: LineKind::Removed,
                    content: stripped.to_string(),
                    old_lineno: Some(old_lineno),
                    new_lineno: None,
                });
                old_lineno += 1;
            } else if let Some(stripped) = line.strip_prefix(' ') {
                hunk.lines.push(DiffLine {
                    kind: LineKind::Context,
                    content: stripped.to_string(),
                    old_lineno: Some(old_lineno),
                    new_lineno: Some(new_lineno),
                });
                old_lineno += 1;
                new_lineno += 1;
            } else if line == "\\ No newline at end of file" {
                // skip silently
            } else {
                hunk.lines.push(DiffLine {
                    kind: LineKind::Context,
                    content: line.to_string(),
                    old_lineno: Some(old_lineno),
                    new_lineno: Some(new_lineno),
                });
                old_lineno += 1;
                new_lineno += 1;
            }
        }
    }

    flush_hunk(&mut current_file, &mut current_hunk);
    if let Some(file) = current_file.take() {
        files.push(file);
    }

    files
}

fn flush_hunk(file: &mut Option<DiffFile>, hunk: &mut Option<DiffHunk>) {
    if let (Some(ref mut f), Some(h)) = (file, hunk.take()) {
        f.hunks.push(h);
    }
}

fn parse_diff_header(line: &str) -> (String, String) {
    let rest = line.strip_prefix("diff --git ").unwrap_or(line);
    let parts: Vec<&str> = rest.splitn(2, " b/").collect();
    let a_path = parts
        .first()
        .unwrap_or(&"")
        .strip_prefix("a/")
        .unwrap_or(parts.first().unwrap_or(&""))
        .to_string();
    let b_path = parts.get(1).unwrap_or(&"").to_string();
    (a_path, b_path)
}

fn parse_hunk_header(line: &str) -> Option<DiffHunk> {
    let trimmed = line.strip_prefix("@@ ")?;
    let end = trimmed.find(" @@")?;
    let range_str = &trimmed[..end];

    let parts: Vec<&str> = range_str.split(' ').collect();
    if parts.len() < 2 {
        return None;
    }

    let (old_start, old_count) = parse_range(parts[0].strip_prefix('-')?)?;
    let (new_start, new_count) = parse_range(parts[1].strip_prefix('+')?)?;

    Some(DiffHunk {
        old_start,
        old_count,
        new_start,
        new_count,
        header: line.to_string(),
        lines: Vec::new(),
    })
}

fn parse_range(s: &str) -> Option<(usize, usize)> {
    if let Some((start, count)) = s.split_once(',') {
        Some((start.parse().ok()?, count.parse().ok()?))
    } else {
        Some((s.parse().ok()?, 1))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
