//! Edge builders: six independent producers that each emit candidate
//! edges over the finalized universe (spec §4.5). Every builder is
//! infallible — on unparsable input it emits no edges rather than
//! raising, matching the resilience the teacher's symbol search shows
//! for per-file read failures.

use std::collections::{BTreeMap, HashMap};

use regex::Regex;

use crate::config::Config;
use crate::fragment::{Fragment, FragmentId, FragmentKind};
use crate::gitdiff::CommitRecord;
use crate::utils;

/// The family an edge was produced by, kept for `explain` diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeFamily {
    Semantic,
    Configuration,
    Structural,
    Document,
    Similarity,
    History,
}

impl EdgeFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Semantic => "semantic",
            Self::Configuration => "configuration",
            Self::Structural => "structural",
            Self::Document => "document",
            Self::Similarity => "similarity",
            Self::History => "history",
        }
    }
}

/// One candidate directed edge, before the Graph Assembler aggregates
/// builder outputs by max.
#[derive(Debug, Clone)]
pub struct Edge {
    pub from: FragmentId,
    pub to: FragmentId,
    pub weight: f64,
    pub family: EdgeFamily,
}

fn lang_of(frag: &Fragment) -> String {
    utils::infer_language(&frag.file_path.to_string_lossy())
}

// ---------------------------------------------------------------------------
// Semantic: name-matching references
// ---------------------------------------------------------------------------

/// A fragment "references" another's declared symbol when its identifier
/// set contains that symbol's name. Resolution is name-matching, not
/// true def-use (spec §4.5 design decision).
pub fn semantic_edges(fragments: &[Fragment], config: &Config) -> Vec<Edge> {
    let mut by_symbol: HashMap<&str, Vec<FragmentId>> = HashMap::new();
    for frag in fragments {
        if let Some(symbol) = &frag.symbol {
            by_symbol.entry(symbol.as_str()).or_default().push(frag.id());
        }
    }

    let mut edges = Vec::new();
    for frag in fragments {
        let weight = config.semantic_weight(&lang_of(frag));
        for token in &frag.identifiers {
            let Some(targets) = by_symbol.get(token.as_str()) else {
                continue;
            };
            for target in targets {
                if *target == frag.id() {
                    continue;
                }
                edges.push(Edge {
                    from: frag.id(),
                    to: target.clone(),
                    weight,
                    family: EdgeFamily::Semantic,
                });
                edges.push(Edge {
                    from: target.clone(),
                    to: frag.id(),
                    weight: weight * 0.55,
                    family: EdgeFamily::Semantic,
                });
            }
        }
    }
    edges
}

// ---------------------------------------------------------------------------
// Configuration: manifest <-> source, bidirectional
// ---------------------------------------------------------------------------

/// A configuration-block fragment referencing a source file's path or
/// stem gets a symmetric edge to every fragment of that file.
pub fn configuration_edges(fragments: &[Fragment]) -> Vec<Edge> {
    const WEIGHT: f64 = 0.65;

    let mut by_file: BTreeMap<&std::path::Path, Vec<&Fragment>> = BTreeMap::new();
    for frag in fragments {
        by_file.entry(frag.file_path.as_path()).or_default().push(frag);
    }

    let mut edges = Vec::new();
    for frag in fragments {
        if frag.kind != FragmentKind::ConfigBlock {
            continue;
        }
        for (path, targets) in &by_file {
            if *path == frag.file_path.as_path() {
                continue;
            }
            let stem = path.file_stem().map(|s| s.to_string_lossy().to_string());
            let needle = path.to_string_lossy();
            let matches = frag.content.contains(needle.as_ref())
                || stem.as_deref().is_some_and(|s| !s.is_empty() && frag.content.contains(s));
            if !matches {
                continue;
            }
            for target in targets {
                edges.push(Edge {
                    from: frag.id(),
                    to: target.id(),
                    weight: WEIGHT,
                    family: EdgeFamily::Configuration,
                });
                edges.push(Edge {
                    from: target.id(),
                    to: frag.id(),
                    weight: WEIGHT,
                    family: EdgeFamily::Configuration,
                });
            }
        }
    }
    edges
}

// ---------------------------------------------------------------------------
// Structural: containment, sibling, test<->code
// ---------------------------------------------------------------------------

/// File-pair relationships broadcast across every fragment pair between
/// the two files, at a weight graded by relationship strength.
pub fn structural_edges(fragments: &[Fragment]) -> Vec<Edge> {
    let mut by_file: BTreeMap<&std::path::Path, Vec<&Fragment>> = BTreeMap::new();
    for frag in fragments {
        by_file.entry(frag.file_path.as_path()).or_default().push(frag);
    }
    let files: Vec<&std::path::Path> = by_file.keys().copied().collect();

    let mut edges = Vec::new();
    for (i, &a) in files.iter().enumerate() {
        for &b in &files[i + 1..] {
            let weight = if crate::universe::is_test_code_pair(a, b) {
                0.60
            } else if crate::universe::is_parent_child(a, b) {
                0.40
            } else if a.parent() == b.parent() {
                0.20
            } else {
                continue;
            };
            for fa in &by_file[a] {
                for fb in &by_file[b] {
                    edges.push(Edge {
                        from: fa.id(),
                        to: fb.id(),
                        weight,
                        family: EdgeFamily::Structural,
                    });
                    edges.push(Edge {
                        from: fb.id(),
                        to: fa.id(),
                        weight: weight * 0.5,
                        family: EdgeFamily::Structural,
                    });
                }
            }
        }
    }
    edges
}

// ---------------------------------------------------------------------------
// Document: Markdown section links
// ---------------------------------------------------------------------------

/// Markdown inline links (`[text](#anchor)` or `[text](file.md#anchor)`)
/// from a Section fragment to the section whose heading slugifies to the
/// same anchor.
pub fn document_edges(fragments: &[Fragment]) -> Vec<Edge> {
    let Ok(link_re) = Regex::new(r"\[[^\]]*\]\(([^)\s]+)\)") else {
        return Vec::new();
    };

    let sections: Vec<&Fragment> = fragments
        .iter()
        .filter(|f| f.kind == FragmentKind::Section)
        .collect();
    let mut by_slug: HashMap<String, FragmentId> = HashMap::new();
    for frag in &sections {
        if let Some(symbol) = &frag.symbol {
            by_slug.insert(slugify(symbol), frag.id());
        }
    }

    let mut edges = Vec::new();
    for frag in &sections {
        for cap in link_re.captures_iter(&frag.content) {
            let target_ref = &cap[1];
            let anchor = target_ref.rsplit('#').next().unwrap_or(target_ref);
            if anchor == target_ref && !target_ref.starts_with('#') {
                continue;
            }
            let Some(target_id) = by_slug.get(anchor) else {
                continue;
            };
            if *target_id == frag.id() {
                continue;
            }
            edges.push(Edge {
                from: frag.id(),
                to: target_id.clone(),
                weight: 0.45,
                family: EdgeFamily::Document,
            });
        }
    }
    edges
}

fn slugify(heading: &str) -> String {
    heading
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .trim_matches('-')
        .to_string()
}

// ---------------------------------------------------------------------------
// Similarity: TF-IDF weighted cosine over identifier sets
// ---------------------------------------------------------------------------

/// Cosine similarity over binary identifier-presence vectors, weighted by
/// inverse document frequency so common identifiers (`new`, `value`)
/// contribute less than rare, distinctive ones. Symmetric; only pairs
/// above the threshold produce an edge.
pub fn similarity_edges(fragments: &[Fragment]) -> Vec<Edge> {
    const THRESHOLD: f64 = 0.30;
    if fragments.len() < 2 {
        return Vec::new();
    }

    let n = fragments.len() as f64;
    let mut doc_freq: HashMap<&str, usize> = HashMap::new();
    for frag in fragments {
        for token in &frag.identifiers {
            *doc_freq.entry(token.as_str()).or_insert(0) += 1;
        }
    }
    let idf = |token: &str| -> f64 {
        let df = doc_freq.get(token).copied().unwrap_or(1) as f64;
        (n / df).ln().max(0.0) + 1.0
    };

    let norms: Vec<f64> = fragments
        .iter()
        .map(|f| {
            f.identifiers
                .iter()
                .map(|t| idf(t).powi(2))
                .sum::<f64>()
                .sqrt()
        })
        .collect();

    let mut edges = Vec::new();
    for i in 0..fragments.len() {
        if norms[i] == 0.0 {
            continue;
        }
        for j in (i + 1)..fragments.len() {
            if norms[j] == 0.0 {
                continue;
            }
            let dot: f64 = fragments[i]
                .identifiers
                .intersection(&fragments[j].identifiers)
                .map(|t| idf(t).powi(2))
                .sum();
            let cosine = dot / (norms[i] * norms[j]);
            if cosine < THRESHOLD {
                continue;
            }
            let weight = (0.10 + 0.25 * cosine).min(0.35);
            edges.push(Edge {
                from: fragments[i].id(),
                to: fragments[j].id(),
                weight,
                family: EdgeFamily::Similarity,
            });
            edges.push(Edge {
                from: fragments[j].id(),
                to: fragments[i].id(),
                weight,
                family: EdgeFamily::Similarity,
            });
        }
    }
    edges
}

// ---------------------------------------------------------------------------
// History: co-change across recent commits
// ---------------------------------------------------------------------------

/// Files that changed together in the same commit get a symmetric edge
/// across every fragment pair between them, weighted by how often that
/// co-occurrence recurs across the window. Commits touching more than
/// `max_files_per_commit` files are dropped (merges, mass reformats).
pub fn history_edges(
    fragments: &[Fragment],
    commits: &[CommitRecord],
    config: &Config,
) -> Vec<Edge> {
    if commits.is_empty() {
        return Vec::new();
    }

    let mut by_file: BTreeMap<&std::path::Path, Vec<&Fragment>> = BTreeMap::new();
    for frag in fragments {
        by_file.entry(frag.file_path.as_path()).or_default().push(frag);
    }

    let mut co_change: HashMap<(&std::path::Path, &std::path::Path), usize> = HashMap::new();
    for commit in commits.iter().take(config.history_commit_window) {
        if commit.changed_paths.len() > config.history_max_files_per_commit {
            continue;
        }
        let present: Vec<&std::path::Path> = commit
            .changed_paths
            .iter()
            .map(std::path::Path::new)
            .filter(|p| by_file.contains_key(p))
            .collect();
        for i in 0..present.len() {
            for j in (i + 1)..present.len() {
                let key = if present[i] < present[j] {
                    (present[i], present[j])
                } else {
                    (present[j], present[i])
                };
                *co_change.entry(key).or_insert(0) += 1;
            }
        }
    }

    let max_count = co_change.values().copied().max().unwrap_or(1) as f64;
    let mut edges = Vec::new();
    for ((a, b), count) in co_change {
        let weight = 0.10 + 0.30 * (count as f64 / max_count);
        for fa in &by_file[a] {
            for fb in &by_file[b] {
                edges.push(Edge {
                    from: fa.id(),
                    to: fb.id(),
                    weight,
                    family: EdgeFamily::History,
                });
                edges.push(Edge {
                    from: fb.id(),
                    to: fa.id(),
                    weight,
                    family: EdgeFamily::History,
                });
            }
        }
    }
    edges
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn frag(path: &str, start: usize, end: usize, symbol: Option<&str>, ids: &[&str]) -> Fragment {
        Fragment {
            file_path: PathBuf::from(path),
            start_line: start,
            end_line: end,
            kind: FragmentKind::Function,
            symbol: symbol.map(|s| s.to_string()),
            content: String::new(),
            identifiers: ids.iter().map(|s| s.to_string()).collect(),
            token_count: 0,
        }
    }

    #[test]
    fn semantic_edges_connect_reference_to_definition() {
        let def = frag("a.rs", 1, 3, Some("helper"), &["helper"]);
        let caller = frag("b.rs", 1, 3, Some("run"), &["run", "helper"]);
        let edges = semantic_edges(&[def.clone(), caller.clone()], &Config::default());
        assert!(edges
            .iter()
            .any(|e| e.from == caller.id() && e.to == def.id() && e.family == EdgeFamily::Semantic));
        // reverse edge at a discount
        let fwd = edges.iter().find(|e| e.from == caller.id()).unwrap().weight;
        let rev = edges.iter().find(|e| e.from == def.id()).unwrap().weight;
        assert!(rev < fwd);
    }

    #[test]
    fn configuration_edges_are_bidirectional() {
        let mut config_frag = frag("Cargo.toml", 1, 2, Some("dependencies"), &[]);
        config_frag.kind = FragmentKind::ConfigBlock;
        config_frag.content = "serde = \"1\" # src/models.rs uses this".to_string();
        let source = frag("src/models.rs", 1, 5, Some("Model"), &[]);
        let edges = configuration_edges(&[config_frag.clone(), source.clone()]);
        assert!(edges.iter().any(|e| e.from == config_frag.id() && e.to == source.id()));
        assert!(edges.iter().any(|e| e.from == source.id() && e.to == config_frag.id()));
    }

    #[test]
    fn structural_edges_connect_test_code_pair() {
        let src = frag("src/foo.py", 1, 5, None, &[]);
        let test = frag("test_foo.py", 1, 5, None, &[]);
        let edges = structural_edges(&[src.clone(), test.clone()]);
        assert!(!edges.is_empty());
        assert!(edges.iter().all(|e| e.family == EdgeFamily::Structural));
    }

    #[test]
    fn document_edges_follow_anchor_links() {
        let mut intro = frag("doc.md", 1, 3, Some("Intro"), &[]);
        intro.kind = FragmentKind::Section;
        intro.content = "see [details](#details)".to_string();
        let mut details = frag("doc.md", 4, 6, Some("Details"), &[]);
        details.kind = FragmentKind::Section;
        let edges = document_edges(&[intro.clone(), details.clone()]);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].from, intro.id());
        assert_eq!(edges[0].to, details.id());
    }

    #[test]
    fn similarity_edges_connect_overlapping_vocabularies() {
        let a = frag("a.py", 1, 3, None, &["gizmo", "widget", "frobnicate"]);
        let b = frag("b.py", 1, 3, None, &["gizmo", "widget", "spindle"]);
        let c = frag("c.py", 1, 3, None, &["completely", "different", "vocabulary"]);
        let edges = similarity_edges(&[a.clone(), b.clone(), c]);
        assert!(edges.iter().any(|e| e.from == a.id() && e.to == b.id()));
    }

    #[test]
    fn history_edges_require_cooccurrence_within_cap() {
        let a = frag("a.rs", 1, 3, None, &[]);
        let b = frag("b.rs", 1, 3, None, &[]);
        let commits = vec![CommitRecord {
            commit_sha: "abc".into(),
            changed_paths: vec!["a.rs".into(), "b.rs".into()],
        }];
        let edges = history_edges(&[a.clone(), b.clone()], &commits, &Config::default());
        assert_eq!(edges.len(), 2);

        let huge_commit = vec![CommitRecord {
            commit_sha: "def".into(),
            changed_paths: (0..40).map(|i| format!("f{i}.rs")).collect(),
        }];
        let none = history_edges(&[a, b], &huge_commit, &Config::default());
        assert!(none.is_empty());
    }

    #[test]
    fn similarity_edges_empty_for_single_fragment() {
        let a = frag("a.py", 1, 3, None, &["gizmo"]);
        assert!(similarity_edges(&[a]).is_empty());
    }
}
