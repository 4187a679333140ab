//! Manifest: a structured record of a selection run, naming every
//! candidate fragment considered, its PPR score, selection density, and
//! whether it was included — backing the `explain` command and external
//! tooling that wants machine-readable output.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ContextRankError, Result};
use crate::selector::StoppingReason;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Complete manifest describing one selection run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    pub summary: ManifestSummary,
    pub entries: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManifestSummary {
    pub total_tokens: usize,
    pub budget: Option<usize>,
    pub core_set_size: usize,
    pub universe_size: usize,
    pub included_count: usize,
    pub universe_truncated: bool,
    pub stopping_reason: String,
    pub ppr_iterations: usize,
    pub ppr_converged: bool,
}

/// A single candidate fragment and the scores it accrued through the
/// pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManifestEntry {
    pub file_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub token_estimate: usize,
    pub symbol: Option<String>,
    pub kind: String,
    /// Whether this fragment was in E₀ (directly touched by the diff).
    pub in_core_set: bool,
    pub ppr_score: f64,
    /// Concepts this fragment activates, for `explain` diagnostics.
    pub concepts: Vec<String>,
    /// Marginal-utility density (marginal gain / cost) at the point the
    /// Selector considered this fragment. `0.0` for fragments the
    /// Selector never popped (e.g. excluded by a budget/τ cutoff before
    /// reaching them).
    pub density: f64,
    /// Edge-builder families that connected this fragment to E₀ in the
    /// assembled graph (empty for fragments with no incoming edge from
    /// any core-set fragment, e.g. E₀ members themselves).
    pub connecting_families: Vec<String>,
    pub included: bool,
}

// ---------------------------------------------------------------------------
// Functions
// ---------------------------------------------------------------------------

/// Summarize a run's entries into a manifest.
pub fn build_manifest(
    entries: Vec<ManifestEntry>,
    budget: Option<usize>,
    universe_size: usize,
    universe_truncated: bool,
    stopping_reason: StoppingReason,
    ppr_iterations: usize,
    ppr_converged: bool,
) -> Manifest {
    let total_tokens: usize = entries
        .iter()
        .filter(|e| e.included)
        .map(|e| e.token_estimate)
        .sum();
    let included_count = entries.iter().filter(|e| e.included).count();
    let core_set_size = entries.iter().filter(|e| e.in_core_set).count();

    Manifest {
        summary: ManifestSummary {
            total_tokens,
            budget,
            core_set_size,
            universe_size,
            included_count,
            universe_truncated,
            stopping_reason: format!("{stopping_reason:?}"),
            ppr_iterations,
            ppr_converged,
        },
        entries,
    }
}

/// Write a manifest to a JSON file.
pub fn write_manifest(manifest: &Manifest, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(manifest)
        .map_err(|e| ContextRankError::config_with_source("failed to serialize manifest as JSON", e))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            ContextRankError::io(format!("creating directory '{}'", parent.display()), e)
        })?;
    }

    std::fs::write(path, json)
        .map_err(|e| ContextRankError::io(format!("writing manifest to '{}'", path.display()), e))
}

/// Read a manifest from a JSON file.
pub fn read_manifest(path: &Path) -> Result<Manifest> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ContextRankError::io(format!("reading manifest '{}'", path.display()), e))?;

    serde_json::from_str(&content).map_err(|e| {
        ContextRankError::config_with_source(format!("failed to parse manifest '{}'", path.display()), e)
    })
}
