//! Universe Builder: expands the core set E₀ into the candidate universe V
//! the rest of the pipeline ranks and selects from (spec §4.4).
//!
//! Candidate sources, in priority order for capping: (1) every fragment of
//! a file the diff touches, (2) fragments containing a "rare" diff
//! concept (occurring in at most three files across the repository), (3)
//! structurally related files (directory siblings, test↔code naming
//! pairs, parent/child containment), (4) configuration/manifest fragments
//! that reference a changed file.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::diffmap::FileFragments;
use crate::fragment::{Fragment, FragmentId};
use crate::fragmenter;
use crate::gitdiff::DiffFile;
use crate::indexer;
use crate::scanner::ScannedFile;
use crate::utils;

/// The finalized candidate set, plus whether capping dropped anything.
pub struct UniverseResult {
    pub fragments: Vec<Fragment>,
    pub truncated: bool,
}

/// Build the candidate universe V from the diff and the repository's full
/// file listing. `core_set` seeds tier 0 so its members are never dropped
/// by capping; `changed_tokens` drives the rare-concept expansion.
pub fn build_universe(
    diff_files: &[DiffFile],
    diff_fragmented: &[FileFragments],
    core_set: &BTreeSet<FragmentId>,
    changed_tokens: &BTreeSet<String>,
    all_files: &[ScannedFile],
    config: &Config,
) -> UniverseResult {
    let mut seen: HashSet<FragmentId> = HashSet::new();
    let mut cache: HashMap<PathBuf, Vec<Fragment>> = HashMap::new();
    let changed_paths: BTreeSet<PathBuf> =
        diff_files.iter().map(|f| PathBuf::from(&f.path)).collect();

    // Tier 0: every fragment of every touched file (source 1). E₀ is a
    // subset of this by construction (diffmap maps hunks onto these same
    // tiles), so seeding from core_set first just guarantees it survives
    // capping even if a bug elsewhere desyncs the two passes.
    let mut tier0 = Vec::new();
    for (path, start, end) in core_set {
        if let Some(frag) = diff_fragmented
            .iter()
            .find(|ff| &ff.path == path)
            .and_then(|ff| ff.post.tiles.iter().find(|t| t.start_line == *start && t.end_line == *end))
        {
            if seen.insert(frag.id()) {
                tier0.push(frag.clone());
            }
        }
    }
    for ff in diff_fragmented {
        for frag in &ff.post.tiles {
            if seen.insert(frag.id()) {
                tier0.push(frag.clone());
            }
        }
        cache.insert(ff.path.clone(), ff.post.tiles.clone());
    }

    // Tier 1: fragments containing a rare diff concept (source 2).
    let mut tier1: Vec<(usize, Fragment)> = Vec::new();
    let rare_files = rare_concept_files(changed_tokens, all_files);
    for (path, overlap) in &rare_files {
        for frag in fragments_for_path(path, all_files, &mut cache) {
            if seen.insert(frag.id()) {
                tier1.push((*overlap, frag));
            }
        }
    }
    tier1.sort_by(|a, b| b.0.cmp(&a.0));

    // Tier 2: structurally related files (source 3) and referencing
    // configuration fragments (source 4).
    let mut tier2 = Vec::new();
    for related in structural_neighbors(&changed_paths, all_files) {
        for frag in fragments_for_path(&related, all_files, &mut cache) {
            if seen.insert(frag.id()) {
                tier2.push(frag);
            }
        }
    }
    for config_path in referencing_config_files(&changed_paths, all_files) {
        for frag in fragments_for_path(&config_path, all_files, &mut cache) {
            if seen.insert(frag.id()) {
                tier2.push(frag);
            }
        }
    }

    let total = tier0.len() + tier1.len() + tier2.len();
    let cap = config.max_universe;
    let mut fragments = tier0;
    for (_, frag) in tier1 {
        if fragments.len() >= cap {
            break;
        }
        fragments.push(frag);
    }
    for frag in tier2 {
        if fragments.len() >= cap {
            break;
        }
        fragments.push(frag);
    }

    UniverseResult {
        truncated: total > fragments.len(),
        fragments,
    }
}

/// Read and fragment a file given its universe-relative path, caching
/// results so the same path is never re-fragmented.
fn fragments_for_path(
    path: &Path,
    all_files: &[ScannedFile],
    cache: &mut HashMap<PathBuf, Vec<Fragment>>,
) -> Vec<Fragment> {
    if let Some(tiles) = cache.get(path) {
        return tiles.clone();
    }
    let Some(scanned) = all_files.iter().find(|f| Path::new(&f.rel_path) == path) else {
        return Vec::new();
    };
    let Ok(text) = std::fs::read_to_string(&scanned.abs_path) else {
        return Vec::new();
    };
    let language = utils::infer_language(&scanned.rel_path);
    let result = fragmenter::fragment_file(path, &text, &language);
    cache.insert(path.to_path_buf(), result.tiles.clone());
    result.tiles
}

/// Files containing at least one changed-diff token that occurs in at
/// most three files repository-wide, paired with how many such tokens
/// they contain (used to prioritize tier 1 under capping).
fn rare_concept_files(changed_tokens: &BTreeSet<String>, all_files: &[ScannedFile]) -> Vec<(PathBuf, usize)> {
    let mut overlap: HashMap<PathBuf, usize> = HashMap::new();

    for token in changed_tokens {
        let pattern = format!(r"\b{}\b", regex::escape(token));
        let Ok(result) = indexer::search_files(all_files, &pattern) else {
            continue;
        };
        let files: BTreeSet<&str> = result.matches.iter().map(|m| m.file_path.as_str()).collect();
        if files.is_empty() || files.len() > 3 {
            continue;
        }
        for f in files {
            *overlap.entry(PathBuf::from(f)).or_insert(0) += 1;
        }
    }

    let mut out: Vec<(PathBuf, usize)> = overlap.into_iter().collect();
    out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    out
}

/// Directory siblings, test↔code naming pairs, and parent/child module
/// files related to any changed path (source 3).
fn structural_neighbors(changed_paths: &BTreeSet<PathBuf>, all_files: &[ScannedFile]) -> BTreeSet<PathBuf> {
    let mut out = BTreeSet::new();

    for changed in changed_paths {
        let parent = changed.parent().unwrap_or_else(|| Path::new(""));
        for file in all_files {
            let candidate = Path::new(&file.rel_path);
            if candidate == changed {
                continue;
            }
            let same_dir = candidate.parent().unwrap_or_else(|| Path::new("")) == parent;
            if same_dir || is_test_code_pair(changed, candidate) || is_parent_child(changed, candidate) {
                out.insert(candidate.to_path_buf());
            }
        }
    }

    out
}

/// Whether two paths look like a test↔code pair by naming convention:
/// `test_X.py ↔ X.py`, `X.test.ts ↔ X.ts`, or a `tests/` directory
/// mirroring a `src/` module of the same stem.
pub(crate) fn is_test_code_pair(a: &Path, b: &Path) -> bool {
    let (Some(a_stem), Some(b_stem)) = (stem_str(a), stem_str(b)) else {
        return false;
    };

    if let Some(rest) = a_stem.strip_prefix("test_") {
        if rest == b_stem {
            return true;
        }
    }
    if let Some(rest) = b_stem.strip_prefix("test_") {
        if rest == a_stem {
            return true;
        }
    }
    if a_stem.ends_with(".test") || a_stem.ends_with(".spec") {
        let bare = a_stem.trim_end_matches(".test").trim_end_matches(".spec");
        if bare == b_stem {
            return true;
        }
    }
    if b_stem.ends_with(".test") || b_stem.ends_with(".spec") {
        let bare = b_stem.trim_end_matches(".test").trim_end_matches(".spec");
        if bare == a_stem {
            return true;
        }
    }

    let a_str = a.to_string_lossy();
    let b_str = b.to_string_lossy();
    if a_stem == b_stem && (a_str.contains("/tests/") || a_str.starts_with("tests/"))
        && (b_str.contains("/src/") || b_str.starts_with("src/"))
    {
        return true;
    }
    if a_stem == b_stem && (b_str.contains("/tests/") || b_str.starts_with("tests/"))
        && (a_str.contains("/src/") || a_str.starts_with("src/"))
    {
        return true;
    }

    false
}

fn stem_str(p: &Path) -> Option<String> {
    p.file_stem().map(|s| s.to_string_lossy().to_string())
}

/// Whether `b` is a parent "index" module (`mod.rs`, `index.ts`,
/// `__init__.py`) of the directory containing `a`, or vice versa.
pub(crate) fn is_parent_child(a: &Path, b: &Path) -> bool {
    let index_names = ["mod.rs", "index.ts", "index.js", "__init__.py"];
    let a_parent = a.parent().unwrap_or_else(|| Path::new(""));
    let b_parent = b.parent().unwrap_or_else(|| Path::new(""));
    let b_name = b.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let a_name = a.file_name().and_then(|n| n.to_str()).unwrap_or("");

    (index_names.contains(&b_name) && b_parent == a_parent)
        || (index_names.contains(&a_name) && a_parent == b_parent)
}

/// Configuration/manifest files whose content mentions a changed path
/// (source 4; the reverse direction of the Configuration edge family,
/// spec §4.5).
fn referencing_config_files(changed_paths: &BTreeSet<PathBuf>, all_files: &[ScannedFile]) -> BTreeSet<PathBuf> {
    let mut out = BTreeSet::new();
    for file in all_files {
        if !utils::is_config_language(&file.language) {
            continue;
        }
        let Ok(content) = std::fs::read_to_string(&file.abs_path) else {
            continue;
        };
        for changed in changed_paths {
            let needle = changed.to_string_lossy();
            let stem = stem_str(changed).unwrap_or_default();
            if content.contains(needle.as_ref()) || (!stem.is_empty() && content.contains(&stem)) {
                out.insert(PathBuf::from(&file.rel_path));
                break;
            }
        }
    }
    out
}
