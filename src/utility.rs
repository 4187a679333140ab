//! Utility Model: `U(S) = Σ_z φ(max_{f∈S} a(f,z))`, the submodular
//! objective the Selector maximizes (spec §4.9).

use std::collections::HashMap;

use crate::concepts::Concept;
use crate::fragment::FragmentId;

/// Sentinel concept key for "structural relatedness", whose activation
/// is a fragment's own PPR score rather than concept containment.
pub const STRUCTURAL_CONCEPT: &str = "\0structural-relatedness";

/// Precomputed activation table `a(f, z)` for every (fragment, concept)
/// pair with nonzero activation, plus the full concept key set Z.
pub struct UtilityModel {
    /// concept -> (fragment -> activation)
    activations: HashMap<String, HashMap<FragmentId, f64>>,
    concepts: Vec<String>,
}

/// Build the utility model: `a(f, z) = R(f)` for every diff concept `z`
/// fragment `f` contains, plus the sentinel structural concept whose
/// activation is `R(f)` for every fragment (every fragment is "near
/// itself" structurally).
pub fn build(concepts: &[Concept], ppr: &HashMap<FragmentId, f64>) -> UtilityModel {
    let mut activations: HashMap<String, HashMap<FragmentId, f64>> = HashMap::new();
    let mut keys = Vec::with_capacity(concepts.len() + 1);

    for concept in concepts {
        let mut per_fragment = HashMap::new();
        for frag_id in &concept.fragments {
            let r = ppr.get(frag_id).copied().unwrap_or(0.0);
            if r > 0.0 {
                per_fragment.insert(frag_id.clone(), r);
            }
        }
        if !per_fragment.is_empty() {
            keys.push(concept.token.clone());
            activations.insert(concept.token.clone(), per_fragment);
        }
    }

    let structural: HashMap<FragmentId, f64> = ppr
        .iter()
        .filter(|(_, &r)| r > 0.0)
        .map(|(id, &r)| (id.clone(), r))
        .collect();
    if !structural.is_empty() {
        keys.push(STRUCTURAL_CONCEPT.to_string());
        activations.insert(STRUCTURAL_CONCEPT.to_string(), structural);
    }

    UtilityModel {
        activations,
        concepts: keys,
    }
}

impl UtilityModel {
    /// `φ(x) = √x`: nondecreasing, strictly concave, so a second fragment
    /// covering an already-covered concept contributes strictly less than
    /// the first (spec §4.9 diminishing returns).
    fn phi(x: f64) -> f64 {
        x.max(0.0).sqrt()
    }

    /// `U(S)`, evaluated directly (used for tests and the final report,
    /// not the per-candidate hot path — see [`Self::marginal_gain`]).
    pub fn utility(&self, selected: &[FragmentId]) -> f64 {
        self.concepts
            .iter()
            .map(|z| {
                let best = self.activations[z]
                    .iter()
                    .filter(|(f, _)| selected.contains(f))
                    .map(|(_, &a)| a)
                    .fold(0.0, f64::max);
                Self::phi(best)
            })
            .sum()
    }

    /// `ΔU(f, S) = U(S ∪ {f}) − U(S)`, computed in time proportional to
    /// the concepts `f` activates rather than all of Z.
    pub fn marginal_gain(&self, candidate: &FragmentId, current_best: &HashMap<String, f64>) -> f64 {
        let mut gain = 0.0;
        for z in &self.concepts {
            let Some(&a) = self.activations[z].get(candidate) else {
                continue;
            };
            let prior_best = current_best.get(z).copied().unwrap_or(0.0);
            if a > prior_best {
                gain += Self::phi(a) - Self::phi(prior_best);
            }
        }
        gain
    }

    /// Update the running per-concept best-activation table after adding
    /// `candidate` to S, for the next marginal-gain computation.
    pub fn apply(&self, candidate: &FragmentId, current_best: &mut HashMap<String, f64>) {
        for z in &self.concepts {
            if let Some(&a) = self.activations[z].get(candidate) {
                let entry = current_best.entry(z.clone()).or_insert(0.0);
                if a > *entry {
                    *entry = a;
                }
            }
        }
    }

    /// The concepts a fragment activates at all, used by `explain` to
    /// show why a fragment was selected.
    pub fn concepts_covered_by(&self, fragment: &FragmentId) -> Vec<&str> {
        self.concepts
            .iter()
            .filter(|z| self.activations[z.as_str()].contains_key(fragment))
            .map(|z| z.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn id(path: &str) -> FragmentId {
        (PathBuf::from(path), 1, 3)
    }

    fn sample_concepts() -> Vec<Concept> {
        vec![
            Concept {
                token: "gizmo".into(),
                fragments: [id("a.rs"), id("b.rs")].into_iter().collect(),
            },
            Concept {
                token: "widget".into(),
                fragments: [id("b.rs")].into_iter().collect(),
            },
        ]
    }

    fn sample_ppr() -> HashMap<FragmentId, f64> {
        HashMap::from([(id("a.rs"), 0.4), (id("b.rs"), 0.16), (id("c.rs"), 0.09)])
    }

    #[test]
    fn utility_grows_with_diminishing_returns() {
        let model = build(&sample_concepts(), &sample_ppr());
        let u_empty = model.utility(&[]);
        let u_one = model.utility(&[id("a.rs")]);
        let u_two = model.utility(&[id("a.rs"), id("b.rs")]);
        assert!(u_one > u_empty);
        assert!(u_two > u_one);
        // structural concept alone contributes sqrt(R) for the first
        // fragment and (since both a and b have distinct R) a further
        // nonzero but strictly smaller increment for the second.
        let gain_first = u_one - u_empty;
        let gain_second = u_two - u_one;
        assert!(gain_second < gain_first);
    }

    #[test]
    fn marginal_gain_matches_utility_delta() {
        let model = build(&sample_concepts(), &sample_ppr());
        let mut best = HashMap::new();
        let gain_a = model.marginal_gain(&id("a.rs"), &best);
        assert!((gain_a - (model.utility(&[id("a.rs")]) - model.utility(&[]))).abs() < 1e-9);
        model.apply(&id("a.rs"), &mut best);
        let gain_b = model.marginal_gain(&id("b.rs"), &best);
        let expected = model.utility(&[id("a.rs"), id("b.rs")]) - model.utility(&[id("a.rs")]);
        assert!((gain_b - expected).abs() < 1e-9);
    }

    #[test]
    fn fragment_with_zero_ppr_contributes_nothing() {
        let concepts = vec![Concept {
            token: "gizmo".into(),
            fragments: [id("zero.rs")].into_iter().collect(),
        }];
        let ppr = HashMap::from([(id("zero.rs"), 0.0)]);
        let model = build(&concepts, &ppr);
        assert_eq!(model.utility(&[id("zero.rs")]), 0.0);
    }

    #[test]
    fn concepts_covered_by_lists_containing_concepts() {
        let model = build(&sample_concepts(), &sample_ppr());
        let covered = model.concepts_covered_by(&id("b.rs"));
        assert!(covered.contains(&"gizmo"));
        assert!(covered.contains(&"widget"));
    }
}
