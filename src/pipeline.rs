//! Orchestrates the nine-stage pipeline end to end: Fragmenter (via the
//! Diff Mapper) → Diff Mapper → Concept Extractor → Universe Builder →
//! Edge Builders → Graph Assembler → PPR Engine → Utility Model →
//! Selector.
//!
//! Stage functions elsewhere in the crate are pure; this module is the
//! only place that sequences them, checks the deadline between stages,
//! and turns the result into a [`crate::manifest::Manifest`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::concepts;
use crate::config::Config;
use crate::diffmap;
use crate::edges::{self, Edge};
use crate::error::{ContextRankError, Result};
use crate::fragment::{Fragment, FragmentId};
use crate::gitdiff::{CommitRecord, DiffFile};
use crate::graph;
use crate::manifest::{self, Manifest, ManifestEntry};
use crate::ppr::{self, PprResult};
use crate::scanner::ScannedFile;
use crate::selector::{self, Selection, StoppingReason};
use crate::universe::{self, UniverseResult};
use crate::utility;

/// Wall-clock budget for one pipeline run (spec §5 cancellation model).
pub struct PipelineDeadline {
    start: Instant,
    limit: Option<Duration>,
}

impl PipelineDeadline {
    pub fn new(limit: Option<Duration>) -> Self {
        Self {
            start: Instant::now(),
            limit,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    /// `Err(Timeout)` once the configured limit has elapsed; `Ok(())`
    /// under an unbounded deadline or before it expires.
    pub fn check(&self) -> Result<()> {
        let Some(limit) = self.limit else {
            return Ok(());
        };
        let elapsed = self.start.elapsed();
        if elapsed > limit {
            Err(ContextRankError::Timeout {
                elapsed_ms: elapsed.as_millis(),
                deadline_ms: limit.as_millis(),
            })
        } else {
            Ok(())
        }
    }
}

/// Everything the pipeline needs from the outside world, already parsed
/// into the crate's internal shapes (spec §6 input).
pub struct PipelineInput {
    pub diff_files: Vec<DiffFile>,
    pub commits: Vec<CommitRecord>,
    pub all_files: Vec<ScannedFile>,
}

/// Full result of a run: the selection, the graph's PPR convergence
/// stats, and the universe it was drawn from — enough to build both the
/// rendered output and the run manifest.
pub struct PipelineResult {
    pub selection: Selection,
    pub universe: UniverseResult,
    pub ppr: PprResult,
    pub manifest: Manifest,
}

/// Run the full pipeline against one diff.
pub fn run(input: &PipelineInput, config: &Config, deadline: &PipelineDeadline) -> Result<PipelineResult> {
    deadline.check()?;

    let diff_fragmented = diffmap::fragment_diff_files(&input.diff_files);
    let core_set = diffmap::compute_core_set(&input.diff_files, &diff_fragmented);
    if core_set.is_empty() {
        return Err(ContextRankError::EmptyDiff);
    }
    let changed_tokens = concepts::extract_changed_tokens(&input.diff_files);

    deadline.check()?;

    let universe_result = universe::build_universe(
        &input.diff_files,
        &diff_fragmented,
        &core_set,
        &changed_tokens,
        &input.all_files,
        config,
    );
    debug_assert!(
        core_set
            .iter()
            .all(|id| universe_result.fragments.iter().any(|f| &f.id() == id)),
        "core set must survive universe capping"
    );
    if core_set
        .iter()
        .any(|id| !universe_result.fragments.iter().any(|f| &f.id() == id))
    {
        return Err(ContextRankError::invariant(
            "core set fragment missing from universe after capping",
        ));
    }

    if config.full {
        return Ok(full_bypass_result(universe_result, core_set));
    }

    if deadline.check().is_err() {
        // Timeout before PPR: return E₀ only (spec §5).
        return Ok(timeout_before_ppr_result(universe_result, core_set));
    }

    let all_edges = build_edges(&universe_result.fragments, &input.commits, config);
    let connecting_families = families_connecting_to_core(&all_edges, &core_set);
    let graph = graph::assemble(&universe_result.fragments, all_edges, &core_set);
    let ppr_result = ppr::compute(&graph, &core_set, config.alpha);

    let concepts_vec = concepts::build_concepts(&changed_tokens, &universe_result.fragments);
    let utility_model = utility::build(&concepts_vec, &ppr_result.scores);

    if deadline.check().is_err() {
        // Timeout after PPR but before the Selector ran: the partial S
        // assembled so far is E₀ itself (spec §5).
        return Ok(timeout_after_ppr_result(
            universe_result,
            core_set,
            ppr_result,
            &utility_model,
        ));
    }

    let by_id: HashMap<FragmentId, &Fragment> = universe_result
        .fragments
        .iter()
        .map(|f| (f.id(), f))
        .collect();
    let core_fragments: Vec<Fragment> = core_set
        .iter()
        .filter_map(|id| by_id.get(id).map(|f| (*f).clone()))
        .collect();
    let candidates: Vec<Fragment> = universe_result
        .fragments
        .iter()
        .filter(|f| !core_set.contains(&f.id()))
        .cloned()
        .collect();

    let selection = selector::select(
        &core_fragments,
        &candidates,
        &ppr_result.scores,
        &utility_model,
        config.budget,
        config.overhead_per_fragment,
        config.tau,
    );

    let entries = build_manifest_entries(
        &universe_result.fragments,
        &core_set,
        &ppr_result.scores,
        &utility_model,
        &selection,
        &connecting_families,
    );
    let manifest = manifest::build_manifest(
        entries,
        config.budget,
        universe_result.fragments.len(),
        universe_result.truncated,
        selection.stopping_reason,
        ppr_result.iterations,
        ppr_result.converged,
    );

    Ok(PipelineResult {
        selection,
        universe: universe_result,
        ppr: ppr_result,
        manifest,
    })
}

fn build_edges(fragments: &[Fragment], commits: &[CommitRecord], config: &Config) -> Vec<Edge> {
    let mut all = Vec::new();
    all.extend(edges::semantic_edges(fragments, config));
    all.extend(edges::configuration_edges(fragments));
    all.extend(edges::structural_edges(fragments));
    all.extend(edges::document_edges(fragments));
    all.extend(edges::similarity_edges(fragments));
    all.extend(edges::history_edges(fragments, commits, config));
    all
}

/// Map each non-core fragment to the edge-builder families that gave it
/// an edge to or from an E₀ fragment (SPEC_FULL.md "Run manifest": "the
/// builder(s) that connected it to E₀").
fn families_connecting_to_core(
    all_edges: &[Edge],
    core_set: &std::collections::BTreeSet<FragmentId>,
) -> HashMap<FragmentId, std::collections::BTreeSet<&'static str>> {
    let mut families: HashMap<FragmentId, std::collections::BTreeSet<&'static str>> = HashMap::new();
    for edge in all_edges {
        if core_set.contains(&edge.from) && !core_set.contains(&edge.to) {
            families.entry(edge.to.clone()).or_default().insert(edge.family.as_str());
        }
        if core_set.contains(&edge.to) && !core_set.contains(&edge.from) {
            families.entry(edge.from.clone()).or_default().insert(edge.family.as_str());
        }
    }
    families
}

fn build_manifest_entries(
    universe: &[Fragment],
    core_set: &std::collections::BTreeSet<FragmentId>,
    ppr: &HashMap<FragmentId, f64>,
    utility_model: &utility::UtilityModel,
    selection: &Selection,
    connecting_families: &HashMap<FragmentId, std::collections::BTreeSet<&'static str>>,
) -> Vec<ManifestEntry> {
    let selected: std::collections::HashSet<&FragmentId> = selection.fragments.iter().collect();
    universe
        .iter()
        .map(|frag| {
            let id = frag.id();
            ManifestEntry {
                file_path: frag.file_path.to_string_lossy().to_string(),
                start_line: frag.start_line,
                end_line: frag.end_line,
                token_estimate: frag.token_count,
                symbol: frag.symbol.clone(),
                kind: frag.kind.as_str().to_string(),
                in_core_set: core_set.contains(&id),
                ppr_score: ppr.get(&id).copied().unwrap_or(0.0),
                concepts: utility_model
                    .concepts_covered_by(&id)
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
                density: selection.densities.get(&id).copied().unwrap_or(0.0),
                connecting_families: connecting_families
                    .get(&id)
                    .map(|families| families.iter().map(|f| f.to_string()).collect())
                    .unwrap_or_default(),
                included: selected.contains(&id),
            }
        })
        .collect()
}

fn full_bypass_result(
    universe_result: UniverseResult,
    core_set: std::collections::BTreeSet<FragmentId>,
) -> PipelineResult {
    let fragments: Vec<FragmentId> = universe_result.fragments.iter().map(|f| f.id()).collect();
    let total_cost: usize = universe_result.fragments.iter().map(|f| f.token_count).sum();
    let empty_ppr: HashMap<FragmentId, f64> = HashMap::new();
    let empty_model = utility::build(&[], &empty_ppr);
    let entries = build_manifest_entries(
        &universe_result.fragments,
        &core_set,
        &empty_ppr,
        &empty_model,
        &Selection {
            fragments: fragments.clone(),
            total_cost,
            utility: 0.0,
            stopping_reason: StoppingReason::Full,
            densities: HashMap::new(),
        },
        &HashMap::new(),
    );
    let manifest = manifest::build_manifest(
        entries,
        None,
        universe_result.fragments.len(),
        universe_result.truncated,
        StoppingReason::Full,
        0,
        true,
    );
    PipelineResult {
        selection: Selection {
            fragments,
            total_cost,
            utility: 0.0,
            stopping_reason: StoppingReason::Full,
            densities: HashMap::new(),
        },
        universe: universe_result,
        ppr: PprResult {
            scores: HashMap::new(),
            iterations: 0,
            converged: true,
        },
        manifest,
    }
}

fn timeout_before_ppr_result(
    universe_result: UniverseResult,
    core_set: std::collections::BTreeSet<FragmentId>,
) -> PipelineResult {
    let fragments: Vec<FragmentId> = core_set.iter().cloned().collect();
    let total_cost: usize = universe_result
        .fragments
        .iter()
        .filter(|f| core_set.contains(&f.id()))
        .map(|f| f.token_count)
        .sum();
    let empty_ppr: HashMap<FragmentId, f64> = HashMap::new();
    let empty_model = utility::build(&[], &empty_ppr);
    let selection = Selection {
        fragments,
        total_cost,
        utility: 0.0,
        stopping_reason: StoppingReason::Timeout,
        densities: HashMap::new(),
    };
    let entries = build_manifest_entries(
        &universe_result.fragments,
        &core_set,
        &empty_ppr,
        &empty_model,
        &selection,
        &HashMap::new(),
    );
    let manifest = manifest::build_manifest(
        entries,
        None,
        universe_result.fragments.len(),
        universe_result.truncated,
        StoppingReason::Timeout,
        0,
        false,
    );
    PipelineResult {
        selection,
        universe: universe_result,
        ppr: PprResult {
            scores: HashMap::new(),
            iterations: 0,
            converged: false,
        },
        manifest,
    }
}

fn timeout_after_ppr_result(
    universe_result: UniverseResult,
    core_set: std::collections::BTreeSet<FragmentId>,
    ppr_result: PprResult,
    utility_model: &utility::UtilityModel,
) -> PipelineResult {
    let fragments: Vec<FragmentId> = core_set.iter().cloned().collect();
    let total_cost: usize = universe_result
        .fragments
        .iter()
        .filter(|f| core_set.contains(&f.id()))
        .map(|f| f.token_count)
        .sum();
    let selection = Selection {
        fragments,
        total_cost,
        utility: utility_model.utility(&core_set.iter().cloned().collect::<Vec<_>>()),
        stopping_reason: StoppingReason::Timeout,
        densities: HashMap::new(),
    };
    let entries = build_manifest_entries(
        &universe_result.fragments,
        &core_set,
        &ppr_result.scores,
        utility_model,
        &selection,
        &HashMap::new(),
    );
    let manifest = manifest::build_manifest(
        entries,
        None,
        universe_result.fragments.len(),
        universe_result.truncated,
        StoppingReason::Timeout,
        ppr_result.iterations,
        ppr_result.converged,
    );
    PipelineResult {
        selection,
        universe: universe_result,
        ppr: ppr_result,
        manifest,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gitdiff::{DiffHunk, DiffLine, FileStatus, LineKind};

    fn sample_input() -> PipelineInput {
        PipelineInput {
            diff_files: vec![DiffFile {
                path: "src/a.py".to_string(),
                old_path: None,
                status: FileStatus::Modified,
                pre_text: Some("def foo():\n    return 1\n".to_string()),
                post_text: Some("def foo():\n    return 42\n".to_string()),
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
            }],
            commits: Vec::new(),
            all_files: Vec::new(),
        }
    }

    #[test]
    fn run_produces_selection_containing_core_set() {
        let input = sample_input();
        let config = Config::default();
        let deadline = PipelineDeadline::unbounded();
        let result = run(&input, &config, &deadline).unwrap();
        assert!(!result.selection.fragments.is_empty());
        assert!(result.manifest.summary.core_set_size > 0);
    }

    #[test]
    fn empty_diff_returns_error() {
        let input = PipelineInput {
            diff_files: Vec::new(),
            commits: Vec::new(),
            all_files: Vec::new(),
        };
        let config = Config::default();
        let deadline = PipelineDeadline::unbounded();
        let err = run(&input, &config, &deadline).unwrap_err();
        assert!(matches!(err, ContextRankError::EmptyDiff));
    }

    #[test]
    fn full_bypass_returns_entire_universe() {
        let input = sample_input();
        let mut config = Config::default();
        config.full = true;
        let deadline = PipelineDeadline::unbounded();
        let result = run(&input, &config, &deadline).unwrap();
        assert_eq!(result.selection.fragments.len(), result.universe.fragments.len());
        assert_eq!(result.selection.stopping_reason, StoppingReason::Full);
    }

    #[test]
    fn expired_deadline_before_run_returns_timeout_selection() {
        let input = sample_input();
        let config = Config::default();
        let deadline = PipelineDeadline::new(Some(Duration::from_secs(0)));
        std::thread::sleep(Duration::from_millis(5));
        let err = run(&input, &config, &deadline).unwrap_err();
        assert!(matches!(err, ContextRankError::Timeout { .. }));
    }

    #[test]
    fn families_connecting_to_core_finds_both_directions() {
        use crate::edges::EdgeFamily;
        use crate::fragment::FragmentKind;
        use std::path::PathBuf;

        fn frag(path: &str) -> Fragment {
            Fragment {
                file_path: PathBuf::from(path),
                start_line: 1,
                end_line: 3,
                kind: FragmentKind::Function,
                symbol: None,
                content: String::new(),
                identifiers: Default::default(),
                token_count: 10,
            }
        }

        let core_frag = frag("core.rs");
        let referenced_by_core = frag("b.rs");
        let referencing_core = frag("c.rs");
        let unrelated = frag("d.rs");

        let core_set: std::collections::BTreeSet<FragmentId> =
            [core_frag.id()].into_iter().collect();
        let edges = vec![
            Edge {
                from: core_frag.id(),
                to: referenced_by_core.id(),
                weight: 0.8,
                family: EdgeFamily::Semantic,
            },
            Edge {
                from: referencing_core.id(),
                to: core_frag.id(),
                weight: 0.5,
                family: EdgeFamily::Structural,
            },
            Edge {
                from: referenced_by_core.id(),
                to: unrelated.id(),
                weight: 0.3,
                family: EdgeFamily::Similarity,
            },
        ];

        let families = families_connecting_to_core(&edges, &core_set);
        assert!(families[&referenced_by_core.id()].contains("semantic"));
        assert!(families[&referencing_core.id()].contains("structural"));
        assert!(!families.contains_key(&unrelated.id()));
    }

    #[test]
    fn manifest_sibling_path_matches_util() {
        assert_eq!(
            crate::utils::manifest_sibling_path(&PathBuf::from("out.md")),
            PathBuf::from("out.manifest.json")
        );
    }
}
