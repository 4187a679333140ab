//! Concept Extractor: identifier tokens on added/removed lines, each
//! carrying the set of universe fragments that contain it (spec §4.3).

use std::collections::{BTreeMap, BTreeSet};

use crate::fragment::{Fragment, FragmentId};
use crate::gitdiff::DiffFile;
use crate::identifiers;

/// A diff concept: an identifier appearing on a changed line, plus every
/// universe fragment that contains it. The sentinel "structural
/// relatedness" concept of the utility model (spec §4.9) is not stored
/// here — it is injected by the Utility Model itself from R.
#[derive(Debug, Clone, PartialEq)]
pub struct Concept {
    pub token: String,
    pub fragments: BTreeSet<FragmentId>,
}

/// Extract the vocabulary of the change: every non-stopword identifier
/// token on an added or removed line, across all changed files.
pub fn extract_changed_tokens(files: &[DiffFile]) -> BTreeSet<String> {
    let mut tokens = BTreeSet::new();
    for file in files {
        for hunk in &file.hunks {
            for line in &hunk.lines {
                if matches!(
                    line.kind,
                    crate::gitdiff::LineKind::Added | crate::gitdiff::LineKind::Removed
                ) {
                    tokens.extend(identifiers::tokenize(&line.content));
                }
            }
        }
    }
    tokens
}

/// Build the concept index over the finalized universe: for each changed
/// token, the set of fragments (in V) containing it.
pub fn build_concepts(changed_tokens: &BTreeSet<String>, universe: &[Fragment]) -> Vec<Concept> {
    let mut by_token: BTreeMap<String, BTreeSet<FragmentId>> = changed_tokens
        .iter()
        .map(|t| (t.clone(), BTreeSet::new()))
        .collect();

    for frag in universe {
        for token in &frag.identifiers {
            if let Some(set) = by_token.get_mut(token) {
                set.insert(frag.id());
            }
        }
    }

    by_token
        .into_iter()
        .map(|(token, fragments)| Concept { token, fragments })
        .collect()
}

/// Concepts occurring in at most `threshold` distinct files across the
/// universe (spec §4.4's "rare" concept, used to seed universe expansion).
pub fn rare_concepts<'a>(concepts: &'a [Concept], threshold: usize) -> Vec<&'a Concept> {
    concepts
        .iter()
        .filter(|c| {
            let files: BTreeSet<_> = c.fragments.iter().map(|(path, _, _)| path.clone()).collect();
            !files.is_empty() && files.len() <= threshold
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::FragmentKind;
    use crate::gitdiff::{DiffHunk, DiffLine, FileStatus, LineKind};
    use std::path::PathBuf;

    fn frag(path: &str, start: usize, end: usize, ids: &[&str]) -> Fragment {
        Fragment {
            file_path: PathBuf::from(path),
            start_line: start,
            end_line: end,
            kind: FragmentKind::Function,
            symbol: None,
            content: String::new(),
            identifiers: ids.iter().map(|s| s.to_string()).collect(),
            token_count: 0,
        }
    }

    fn diff_with_token(token: &str) -> DiffFile {
        DiffFile {
            path: "a.py".into(),
            old_path: None,
            status: FileStatus::Modified,
            pre_text: None,
            post_text: None,
            hunks: vec![DiffHunk {
                old_start: 1,
                old_count: 1,
                new_start: 1,
                new_count: 1,
                header: String::new(),
                lines: vec![DiffLine {
                    kind: LineKind::Added,
                    content: format!("call_{token}()"),
                    old_lineno: None,
                    new_lineno: Some(1),
                }],
            }],
        }
    }

    #[test]
    fn extract_changed_tokens_ignores_context() {
        let files = vec![diff_with_token("xyzgizmo")];
        let tokens = extract_changed_tokens(&files);
        assert!(tokens.contains("call"));
        assert!(tokens.contains("xyzgizmo"));
    }

    #[test]
    fn build_concepts_indexes_fragments() {
        let changed: BTreeSet<String> = ["gizmo".to_string()].into_iter().collect();
        let universe = vec![
            frag("a.py", 1, 5, &["gizmo", "call"]),
            frag("b.py", 1, 5, &["other"]),
        ];
        let concepts = build_concepts(&changed, &universe);
        assert_eq!(concepts.len(), 1);
        assert_eq!(concepts[0].token, "gizmo");
        assert_eq!(concepts[0].fragments.len(), 1);
    }

    #[test]
    fn rare_concepts_filters_by_file_count() {
        let c1 = Concept {
            token: "rare".into(),
            fragments: [("a.py".into(), 1, 5)].into_iter().collect(),
        };
        let c2 = Concept {
            token: "common".into(),
            fragments: (0..5)
                .map(|i| (PathBuf::from(format!("f{i}.py")), 1, 5))
                .collect(),
        };
        let rare = rare_concepts(&[c1.clone(), c2], 3);
        assert_eq!(rare.len(), 1);
        assert_eq!(rare[0].token, "rare");
    }
}
