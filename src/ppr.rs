//! PPR Engine: personalized PageRank restart-biased on the core set E₀
//! (spec §4.7).

use std::collections::{BTreeSet, HashMap};

use petgraph::graph::NodeIndex;

use crate::fragment::FragmentId;
use crate::graph::AssembledGraph;

const MAX_ITERATIONS: usize = 50;
const CONVERGENCE_THRESHOLD: f64 = 1e-4;

/// Stationary distribution, keyed by fragment id for downstream lookups.
pub struct PprResult {
    pub scores: HashMap<FragmentId, f64>,
    pub iterations: usize,
    pub converged: bool,
}

/// Run power iteration with restart distribution uniform over
/// `core_set`, damping `alpha`, and teleportation for dangling nodes
/// (those with no out-edges).
pub fn compute(graph: &AssembledGraph, core_set: &BTreeSet<FragmentId>, alpha: f64) -> PprResult {
    let n = graph.node_count();
    if n == 0 {
        return PprResult {
            scores: HashMap::new(),
            iterations: 0,
            converged: true,
        };
    }

    let restart_indices: Vec<NodeIndex> = core_set
        .iter()
        .filter_map(|id| graph.index_of.get(id).copied())
        .collect();
    let restart_mass = if restart_indices.is_empty() {
        1.0 / n as f64
    } else {
        1.0 / restart_indices.len() as f64
    };

    let p: HashMap<NodeIndex, f64> = if restart_indices.is_empty() {
        // No recognizable core set (e.g. an empty diff in `--full` mode):
        // fall back to a uniform restart over the whole universe so PPR
        // degrades to ordinary PageRank rather than producing nothing.
        graph.index_of.values().map(|&idx| (idx, restart_mass)).collect()
    } else {
        restart_indices.iter().map(|&idx| (idx, restart_mass)).collect()
    };

    let out_degree: HashMap<NodeIndex, f64> = graph
        .index_of
        .values()
        .map(|&idx| {
            let total: f64 = graph.out_edges(idx).map(|(_, w)| w).sum();
            (idx, total)
        })
        .collect();

    let mut r: HashMap<NodeIndex, f64> = graph
        .index_of
        .values()
        .map(|&idx| (idx, p.get(&idx).copied().unwrap_or(0.0)))
        .collect();

    let mut converged = false;
    let mut iterations = 0;
    for iter in 1..=MAX_ITERATIONS {
        iterations = iter;
        let mut next: HashMap<NodeIndex, f64> =
            graph.index_of.values().map(|&idx| (idx, 0.0)).collect();

        let mut dangling_mass = 0.0;
        for &u in graph.index_of.values() {
            let r_u = r[&u];
            let deg = out_degree[&u];
            if deg <= 0.0 {
                dangling_mass += r_u;
                continue;
            }
            for (v, w) in graph.out_edges(u) {
                *next.get_mut(&v).unwrap() += r_u * w / deg;
            }
        }

        let mut diff = 0.0;
        for &idx in graph.index_of.values() {
            let restart = p.get(&idx).copied().unwrap_or(0.0);
            // Dangling nodes teleport their mass back out according to
            // the restart distribution, same as a genuine (1-alpha) jump.
            let dangling_share = dangling_mass * restart;
            let value = (1.0 - alpha) * restart + alpha * (next[&idx] + dangling_share);
            diff += (value - r[&idx]).abs();
            *next.get_mut(&idx).unwrap() = value;
        }

        r = next;
        if diff < CONVERGENCE_THRESHOLD {
            converged = true;
            break;
        }
    }

    let scores = graph
        .index_of
        .iter()
        .map(|(id, &idx)| (id.clone(), r[&idx]))
        .collect();

    PprResult {
        scores,
        iterations,
        converged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edges::{Edge, EdgeFamily};
    use crate::fragment::{Fragment, FragmentKind};
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
            token_count: 0,
        }
    }

    #[test]
    fn mass_concentrates_near_core_set() {
        let a = frag("a.rs");
        let b = frag("b.rs");
        let c = frag("c.rs");
        let edges = vec![
            Edge {
                from: a.id(),
                to: b.id(),
                weight: 0.8,
                family: EdgeFamily::Semantic,
            },
            Edge {
                from: b.id(),
                to: a.id(),
                weight: 0.4,
                family: EdgeFamily::Semantic,
            },
        ];
        let core: BTreeSet<FragmentId> = [a.id()].into_iter().collect();
        let graph = crate::graph::assemble(&[a.clone(), b.clone(), c.clone()], edges, &core);
        let result = compute(&graph, &core, 0.60);
        assert!(result.scores[&a.id()] > result.scores[&c.id()]);
        assert!(result.scores[&b.id()] > result.scores[&c.id()]);
    }

    #[test]
    fn scores_sum_to_approximately_one() {
        let a = frag("a.rs");
        let b = frag("b.rs");
        let edges = vec![
            Edge {
                from: a.id(),
                to: b.id(),
                weight: 1.0,
                family: EdgeFamily::Semantic,
            },
            Edge {
                from: b.id(),
                to: a.id(),
                weight: 1.0,
                family: EdgeFamily::Semantic,
            },
        ];
        let core: BTreeSet<FragmentId> = [a.id()].into_iter().collect();
        let graph = crate::graph::assemble(&[a.clone(), b.clone()], edges, &core);
        let result = compute(&graph, &core, 0.60);
        let total: f64 = result.scores.values().sum();
        assert!((total - 1.0).abs() < 1e-3);
    }

    #[test]
    fn converges_within_iteration_cap() {
        let a = frag("a.rs");
        let core: BTreeSet<FragmentId> = [a.id()].into_iter().collect();
        let graph = crate::graph::assemble(&[a.clone()], Vec::new(), &core);
        let result = compute(&graph, &core, 0.60);
        assert!(result.converged);
        assert!(result.iterations <= MAX_ITERATIONS);
    }

    #[test]
    fn empty_graph_returns_empty_scores() {
        let core = BTreeSet::new();
        let graph = crate::graph::assemble(&[], Vec::new(), &core);
        let result = compute(&graph, &core, 0.60);
        assert!(result.scores.is_empty());
    }
}
