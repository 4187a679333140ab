//! Selector: lazy-greedy submodular maximization with τ-stopping over a
//! token budget (spec §4.8).

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use crate::fragment::{Fragment, FragmentId};
use crate::utility::UtilityModel;

/// Per-fragment token cost: `token_count + overhead` (spec §4.8).
pub fn cost(fragment: &Fragment, overhead_per_fragment: usize) -> usize {
    fragment.token_count + overhead_per_fragment
}

/// Why the Selector stopped growing S.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoppingReason {
    /// The heap emptied before budget or τ intervened.
    HeapExhausted,
    /// A popped candidate's density fell below `τ_abs`.
    BelowThreshold,
    /// The budget was exhausted (no remaining candidate fit).
    BudgetExhausted,
    /// E₀ alone exceeds the budget; S is E₀ truncated to the
    /// highest-PPR fragments that fit (spec §7 BudgetInfeasible policy).
    CoreSetExceedsBudget,
    /// `full` bypassed the Selector entirely; S = V.
    Full,
    /// The pipeline deadline expired; S is whatever had been assembled
    /// (E₀ only if the timeout landed before PPR produced scores).
    Timeout,
}

pub struct Selection {
    pub fragments: Vec<FragmentId>,
    pub total_cost: usize,
    pub utility: f64,
    pub stopping_reason: StoppingReason,
    /// Marginal-utility density each selected fragment had at the moment
    /// it was accepted into S. Absent for fragments never selected.
    pub densities: HashMap<FragmentId, f64>,
}

struct HeapEntry {
    density: f64,
    ppr: f64,
    id: FragmentId,
}

impl HeapEntry {
    fn key(&self) -> (f64, f64) {
        (self.density, self.ppr)
    }
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key() && self.id == other.id
    }
}
impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap on (density, ppr), tie-broken by path/start_line for
        // determinism (spec §4.8 ordering rule); BinaryHeap pops the
        // greatest, so ties favor the lexicographically *smaller* id by
        // reversing the id comparison.
        self.key()
            .partial_cmp(&other.key())
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// Run the Selector. `core_set` seeds S; `candidates` is `V \ E₀` (the
/// caller is expected to have already excluded E₀, since E₀ is
/// unconditionally included regardless of budget feasibility).
pub fn select(
    core_set: &[Fragment],
    candidates: &[Fragment],
    ppr: &HashMap<FragmentId, f64>,
    utility: &UtilityModel,
    budget: Option<usize>,
    overhead_per_fragment: usize,
    tau: f64,
) -> Selection {
    let mut selected: Vec<FragmentId> = Vec::new();
    let mut current_best: HashMap<String, f64> = HashMap::new();
    let mut total_cost = 0usize;

    let core_cost: usize = core_set.iter().map(|f| cost(f, overhead_per_fragment)).sum();
    let core_over_budget = budget.is_some_and(|b| core_cost > b);

    if core_over_budget {
        // §7's BudgetInfeasible policy: truncate E₀ itself, keeping the
        // highest-PPR fragments until the budget fits, and surface this
        // as a distinct stopping reason rather than silently dropping
        // fragments the diff actually touched.
        let budget = budget.unwrap();
        let mut densities: HashMap<FragmentId, f64> = HashMap::new();
        let mut by_ppr: Vec<&Fragment> = core_set.iter().collect();
        by_ppr.sort_by(|a, b| {
            let pa = ppr.get(&a.id()).copied().unwrap_or(0.0);
            let pb = ppr.get(&b.id()).copied().unwrap_or(0.0);
            pb.partial_cmp(&pa).unwrap_or(Ordering::Equal).then_with(|| a.id().cmp(&b.id()))
        });
        for frag in by_ppr {
            let frag_cost = cost(frag, overhead_per_fragment);
            if total_cost + frag_cost > budget {
                continue;
            }
            densities.insert(frag.id(), density_of(frag, utility, &current_best, overhead_per_fragment));
            utility.apply(&frag.id(), &mut current_best);
            selected.push(frag.id());
            total_cost += frag_cost;
        }
        return Selection {
            utility: utility.utility(&selected),
            fragments: selected,
            total_cost,
            stopping_reason: StoppingReason::CoreSetExceedsBudget,
            densities,
        };
    }

    let mut densities: HashMap<FragmentId, f64> = HashMap::new();
    for frag in core_set {
        densities.insert(frag.id(), density_of(frag, utility, &current_best, overhead_per_fragment));
        utility.apply(&frag.id(), &mut current_best);
        selected.push(frag.id());
        total_cost += cost(frag, overhead_per_fragment);
    }

    let by_id: HashMap<FragmentId, &Fragment> =
        candidates.iter().map(|f| (f.id(), f)).collect();

    let mut heap: BinaryHeap<HeapEntry> = BinaryHeap::new();
    for frag in candidates {
        let density = density_of(frag, utility, &current_best, overhead_per_fragment);
        heap.push(HeapEntry {
            density,
            ppr: ppr.get(&frag.id()).copied().unwrap_or(0.0),
            id: frag.id(),
        });
    }

    let mut baseline_samples: Vec<f64> = Vec::new();
    let mut tau_abs: Option<f64> = None;
    let mut reason = StoppingReason::HeapExhausted;
    let mut generation: HashMap<FragmentId, usize> = HashMap::new();
    let mut current_generation = 0usize;

    while let Some(entry) = heap.pop() {
        let Some(frag) = by_id.get(&entry.id) else {
            continue;
        };

        let seen_generation = generation.get(&entry.id).copied().unwrap_or(0);
        if seen_generation != current_generation {
            let density = density_of(frag, utility, &current_best, overhead_per_fragment);
            generation.insert(entry.id.clone(), current_generation);
            heap.push(HeapEntry {
                density,
                ppr: entry.ppr,
                id: entry.id.clone(),
            });
            continue;
        }

        if baseline_samples.len() < 5 {
            baseline_samples.push(entry.density);
            if baseline_samples.len() == 5 {
                tau_abs = Some(tau * median(&mut baseline_samples.clone()));
            }
        }
        if let Some(threshold) = tau_abs {
            if entry.density < threshold {
                reason = StoppingReason::BelowThreshold;
                break;
            }
        }

        let frag_cost = cost(frag, overhead_per_fragment);
        if let Some(budget) = budget {
            if total_cost + frag_cost > budget {
                reason = StoppingReason::BudgetExhausted;
                continue;
            }
        }

        densities.insert(entry.id.clone(), entry.density);
        selected.push(entry.id.clone());
        total_cost += frag_cost;
        utility.apply(&entry.id, &mut current_best);
        current_generation += 1;
    }

    if heap.is_empty() && !matches!(reason, StoppingReason::BudgetExhausted) {
        reason = StoppingReason::HeapExhausted;
    }

    Selection {
        utility: utility.utility(&selected),
        fragments: selected,
        total_cost,
        stopping_reason: reason,
        densities,
    }
}

fn density_of(
    frag: &Fragment,
    utility: &UtilityModel,
    current_best: &HashMap<String, f64>,
    overhead_per_fragment: usize,
) -> f64 {
    let gain = utility.marginal_gain(&frag.id(), current_best);
    let c = cost(frag, overhead_per_fragment) as f64;
    if c <= 0.0 {
        0.0
    } else {
        gain / c
    }
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concepts::Concept;
    use crate::fragment::FragmentKind;
    use std::path::PathBuf;

    fn frag(path: &str, tokens: usize) -> Fragment {
        Fragment {
            file_path: PathBuf::from(path),
            start_line: 1,
            end_line: 3,
            kind: FragmentKind::Function,
            symbol: None,
            content: String::new(),
            identifiers: Default::default(),
            token_count: tokens,
        }
    }

    #[test]
    fn core_set_exceeding_budget_truncates_by_ppr_descending() {
        // Three core fragments, none fit all together, but the two with
        // higher PPR fit individually under the budget.
        let low = frag("a.rs", 40);
        let mid = frag("b.rs", 40);
        let high = frag("c.rs", 40);
        let core = vec![low.clone(), mid.clone(), high.clone()];
        let ppr: HashMap<FragmentId, f64> = [
            (low.id(), 0.1),
            (mid.id(), 0.5),
            (high.id(), 0.9),
        ]
        .into_iter()
        .collect();
        let model = crate::utility::build(&[], &ppr);
        let selection = select(&core, &[], &ppr, &model, Some(80), 0, 0.08);
        assert_eq!(selection.stopping_reason, StoppingReason::CoreSetExceedsBudget);
        assert_eq!(selection.fragments.len(), 2);
        assert!(selection.fragments.contains(&high.id()));
        assert!(selection.fragments.contains(&mid.id()));
        assert!(!selection.fragments.contains(&low.id()));
    }

    #[test]
    fn core_set_exceeding_budget_with_single_oversized_fragment_excludes_it() {
        let core = vec![frag("a.rs", 1000)];
        let model = crate::utility::build(&[], &HashMap::new());
        let selection = select(&core, &[], &HashMap::new(), &model, Some(100), 18, 0.08);
        assert_eq!(selection.stopping_reason, StoppingReason::CoreSetExceedsBudget);
        assert!(selection.fragments.is_empty());
    }

    #[test]
    fn selector_respects_budget_and_stops() {
        let core = vec![frag("core.rs", 10)];
        let candidates: Vec<Fragment> = (0..10).map(|i| frag(&format!("c{i}.rs"), 10)).collect();
        let concepts: Vec<Concept> = candidates
            .iter()
            .map(|f| Concept {
                token: f.file_path.to_string_lossy().to_string(),
                fragments: [f.id()].into_iter().collect(),
            })
            .collect();
        let ppr: HashMap<FragmentId, f64> = candidates
            .iter()
            .enumerate()
            .map(|(i, f)| (f.id(), 1.0 / (i as f64 + 1.0)))
            .chain(std::iter::once((core[0].id(), 1.0)))
            .collect();
        let model = crate::utility::build(&concepts, &ppr);
        let selection = select(&core, &candidates, &ppr, &model, Some(60), 0, 0.08);
        assert!(selection.total_cost <= 60);
        assert!(selection.fragments.contains(&core[0].id()));
    }

    #[test]
    fn no_budget_runs_until_heap_exhausted_or_threshold() {
        let core = vec![frag("core.rs", 10)];
        let candidates = vec![frag("c1.rs", 10)];
        let concepts = vec![Concept {
            token: "c1.rs".into(),
            fragments: [candidates[0].id()].into_iter().collect(),
        }];
        let ppr: HashMap<FragmentId, f64> =
            [(candidates[0].id(), 0.5), (core[0].id(), 1.0)].into_iter().collect();
        let model = crate::utility::build(&concepts, &ppr);
        let selection = select(&core, &candidates, &ppr, &model, None, 0, 0.08);
        assert!(matches!(
            selection.stopping_reason,
            StoppingReason::HeapExhausted | StoppingReason::BelowThreshold
        ));
    }

    #[test]
    fn median_helper_even_and_odd() {
        assert_eq!(median(&mut [1.0, 2.0, 3.0]), 2.0);
        assert_eq!(median(&mut [1.0, 2.0, 3.0, 4.0]), 2.5);
    }
}
