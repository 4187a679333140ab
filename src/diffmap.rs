//! Diff Mapper: maps hunk line ranges onto fragments to produce the core
//! set E₀ (spec §4.2).

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::fragment::{Fragment, FragmentId};
use crate::fragmenter::{self, FragmentationResult};
use crate::gitdiff::{DiffFile, FileStatus, LineKind};
use crate::utils;

/// All fragments produced for one file, split by which image they belong
/// to (added hunks map onto post-image fragments, removed hunks onto
/// pre-image fragments — spec §4.2).
pub struct FileFragments {
    pub path: PathBuf,
    pub pre: FragmentationResult,
    pub post: FragmentationResult,
}

/// Fragment every changed file's pre- and post-images.
pub fn fragment_diff_files(files: &[DiffFile]) -> Vec<FileFragments> {
    files
        .iter()
        .map(|f| {
            let path = PathBuf::from(&f.path);
            let language = utils::infer_language(&f.path);
            let pre = fragmenter::fragment_file(
                &path,
                f.pre_text.as_deref().unwrap_or(""),
                &language,
            );
            let post = fragmenter::fragment_file(
                &path,
                f.post_text.as_deref().unwrap_or(""),
                &language,
            );
            FileFragments { path, pre, post }
        })
        .collect()
}

/// Compute the core set E₀: every fragment whose line range intersects a
/// hunk on the matching side, plus — for each touched fragment — its
/// innermost enclosing container, if the fragmenter identified one (spec
/// §3: "their enclosing syntactic container when the parser identifies
/// one"). Nested fragments are both included; no dedup is attempted
/// beyond the set's own identity (spec §4.2).
pub fn compute_core_set(
    files: &[DiffFile],
    fragmented: &[FileFragments],
) -> BTreeSet<FragmentId> {
    let mut core = BTreeSet::new();

    for file in files {
        let Some(ff) = fragmented.iter().find(|ff| ff.path == Path::new(&file.path)) else {
            continue;
        };

        for hunk in &file.hunks {
            if let Some((start, end)) = hunk.added_range() {
                for frag in &ff.post.tiles {
                    if frag.intersects_lines(start, end) {
                        core.insert(frag.id());
                        if let Some(container) = innermost_container(frag, &ff.post.containers) {
                            core.insert(container.id());
                        }
                    }
                }
            }
            if let Some((start, end)) = hunk.removed_range() {
                // Removed lines only exist meaningfully against the
                // pre-image; skip entirely-added files (no pre-image).
                if file.status != FileStatus::Added {
                    for frag in &ff.pre.tiles {
                        if frag.intersects_lines(start, end) {
                            core.insert(frag.id());
                            if let Some(container) = innermost_container(frag, &ff.pre.containers) {
                                core.insert(container.id());
                            }
                        }
                    }
                }
            }
        }
    }

    core
}

/// Find the innermost container (spec §9 open question, resolved: smallest
/// enclosing span) strictly containing `frag` among `containers`.
pub fn innermost_container<'a>(frag: &Fragment, containers: &'a [Fragment]) -> Option<&'a Fragment> {
    containers
        .iter()
        .filter(|c| {
            c.file_path == frag.file_path
                && c.start_line <= frag.start_line
                && c.end_line >= frag.end_line
                && c.line_count() > frag.line_count()
        })
        .min_by_key(|c| c.line_count())
}

/// Lines touched by a hunk, used by the concept extractor (spec §4.3).
pub fn changed_line_texts(file: &DiffFile) -> Vec<String> {
    file.hunks
        .iter()
        .flat_map(|h| &h.lines)
        .filter(|l| l.kind == LineKind::Added || l.kind == LineKind::Removed)
        .map(|l| l.content.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gitdiff::{DiffHunk, DiffLine};

    fn sample_file() -> DiffFile {
        DiffFile {
            path: "src/a.py".to_string(),
            old_path: None,
            status: FileStatus::Modified,
            pre_text: Some("def foo():\n    return 1\n\n\ndef bar():\n    return 2\n".to_string()),
            post_text: Some(
                "def foo():\n    return 42\n\n\ndef bar():\n    return 2\n".to_string(),
            ),
            hunks: vec![DiffHunk {
                old_start: 2,
                old_count: 1,
                new_start: 2,
                new_count: 1,
                header: "@@ -2,1 +2,1 @@".to_string(),
                lines: vec![
                    DiffLine {
                        kind: LineKind::Removed,
                        content: "    return 1".to_string(),
                        old_lineno: Some(2),
                        new_lineno: None,
                    },
                    DiffLine {
                        kind: LineKind::Added,
                        content: "    return 42".to_string(),
                        old_lineno: None,
                        new_lineno: Some(2),
                    },
                ],
            }],
        }
    }

    #[test]
    fn core_set_contains_touched_fragment_only() {
        let files = vec![sample_file()];
        let fragmented = fragment_diff_files(&files);
        let core = compute_core_set(&files, &fragmented);
        assert_eq!(core.len(), 1);
        let (path, start, _) = core.iter().next().unwrap();
        assert_eq!(path, Path::new("src/a.py"));
        assert_eq!(*start, 1);
    }

    #[test]
    fn added_file_has_no_pre_image_contribution() {
        let mut file = sample_file();
        file.status = FileStatus::Added;
        file.pre_text = None;
        let fragmented = fragment_diff_files(std::slice::from_ref(&file));
        let core = compute_core_set(std::slice::from_ref(&file), &fragmented);
        assert!(!core.is_empty());
    }

    #[test]
    fn innermost_container_picks_smallest_enclosing() {
        let frag = Fragment {
            file_path: PathBuf::from("a.rs"),
            start_line: 5,
            end_line: 6,
            kind: crate::fragment::FragmentKind::Method,
            symbol: None,
            content: String::new(),
            identifiers: Default::default(),
            token_count: 0,
        };
        let outer = Fragment {
            start_line: 1,
            end_line: 20,
            ..frag.clone()
        };
        let inner = Fragment {
            start_line: 3,
            end_line: 10,
            ..frag.clone()
        };
        let containers = vec![outer, inner.clone()];
        let picked = innermost_container(&frag, &containers).unwrap();
        assert_eq!(picked.start_line, inner.start_line);
    }

    #[test]
    fn core_set_includes_enclosing_container() {
        let text = "struct Foo {\n    x: i32,\n}\n\nimpl Foo {\n    fn bar(&self) -> i32 {\n        self.x\n    }\n}\n";
        let file = DiffFile {
            path: "a.rs".to_string(),
            old_path: None,
            status: FileStatus::Modified,
            pre_text: Some(text.to_string()),
            post_text: Some(text.replace("self.x", "self.x + 1")),
            hunks: vec![DiffHunk {
                old_start: 7,
                old_count: 1,
                new_start: 7,
                new_count: 1,
                header: "@@ -7,1 +7,1 @@".to_string(),
                lines: vec![
                    DiffLine {
                        kind: LineKind::Removed,
                        content: "        self.x".to_string(),
                        old_lineno: Some(7),
                        new_lineno: None,
                    },
                    DiffLine {
                        kind: LineKind::Added,
                        content: "        self.x + 1".to_string(),
                        old_lineno: None,
                        new_lineno: Some(7),
                    },
                ],
            }],
        };
        let files = vec![file];
        let fragmented = fragment_diff_files(&files);
        let core = compute_core_set(&files, &fragmented);

        let ff = &fragmented[0];
        let container = ff
            .post
            .containers
            .iter()
            .find(|c| c.start_line <= 7 && c.end_line >= 7)
            .expect("impl block should be fragmented as a container enclosing line 7");
        assert!(core.contains(&container.id()));
    }

    #[test]
    fn changed_line_texts_excludes_context() {
        let file = sample_file();
        let lines = changed_line_texts(&file);
        assert_eq!(lines.len(), 2);
    }
}
