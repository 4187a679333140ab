//! Graph Assembler: aggregates edge-builder output into a single weighted
//! digraph over the universe, with hub suppression (spec §4.6).

use std::collections::{BTreeSet, HashMap};

use petgraph::graph::{DiGraph, NodeIndex};

use crate::edges::Edge;
use crate::fragment::{Fragment, FragmentId};

/// The assembled graph: node identity via petgraph's `DiGraph`, edge
/// weights kept in a side table (petgraph edge weights would duplicate
/// the `()` payload for no benefit here — the map is the weight source
/// of truth the PPR engine reads).
pub struct AssembledGraph {
    pub graph: DiGraph<FragmentId, ()>,
    pub index_of: HashMap<FragmentId, NodeIndex>,
    pub weights: HashMap<(NodeIndex, NodeIndex), f64>,
}

impl AssembledGraph {
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn out_edges(&self, node: NodeIndex) -> impl Iterator<Item = (NodeIndex, f64)> + '_ {
        self.graph
            .neighbors(node)
            .map(move |target| (target, self.weights[&(node, target)]))
    }
}

/// Build the graph from every builder's edges, aggregating parallel
/// edges by max weight, then suppress hubs: fragments with in-degree
/// above the 95th percentile that are not in E₀ have every incoming
/// weight scaled by `1 / log(1 + in_degree)` (spec §4.6). Suppression is
/// applied before any `deg_out` renormalization elsewhere in the
/// pipeline (resolves spec §9's open question on ordering).
pub fn assemble(universe: &[Fragment], all_edges: Vec<Edge>, core_set: &BTreeSet<FragmentId>) -> AssembledGraph {
    let mut graph = DiGraph::new();
    let mut index_of = HashMap::with_capacity(universe.len());
    // Sorted order keeps node assignment deterministic across runs.
    let mut ids: Vec<FragmentId> = universe.iter().map(|f| f.id()).collect();
    ids.sort();
    for id in ids {
        let idx = graph.add_node(id.clone());
        index_of.insert(id, idx);
    }

    let mut max_weight: HashMap<(NodeIndex, NodeIndex), f64> = HashMap::new();
    for edge in all_edges {
        let (Some(&from), Some(&to)) = (index_of.get(&edge.from), index_of.get(&edge.to)) else {
            continue;
        };
        if from == to {
            continue;
        }
        let entry = max_weight.entry((from, to)).or_insert(0.0);
        if edge.weight > *entry {
            *entry = edge.weight;
        }
    }

    for &(from, to) in max_weight.keys() {
        graph.update_edge(from, to, ());
    }

    let mut in_degree: HashMap<NodeIndex, usize> =
        index_of.values().map(|&idx| (idx, 0)).collect();
    for &(_, to) in max_weight.keys() {
        *in_degree.entry(to).or_insert(0) += 1;
    }

    let theta = percentile_95(&in_degree.values().copied().collect::<Vec<_>>());

    let mut weights = max_weight;
    for (node, &idx) in &index_of {
        let degree = in_degree.get(&idx).copied().unwrap_or(0);
        if degree as f64 <= theta || core_set.contains(node) {
            continue;
        }
        let scale = 1.0 / (1.0 + degree as f64).ln();
        for (key, w) in weights.iter_mut() {
            if key.1 == idx {
                *w *= scale;
            }
        }
    }

    AssembledGraph {
        graph,
        index_of,
        weights,
    }
}

/// Nearest-rank 95th percentile over a (possibly empty) sample.
fn percentile_95(values: &[usize]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let rank = ((0.95 * sorted.len() as f64).ceil() as usize).saturating_sub(1);
    sorted[rank.min(sorted.len() - 1)] as f64
}
