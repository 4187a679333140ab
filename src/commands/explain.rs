//! Handler for the `contextrank explain` command.
//!
//! Reads a manifest JSON file written by `select` and prints a
//! human-readable explanation of what was included/excluded and why.
//! Useful for debugging budget decisions and understanding why the
//! Selector stopped where it did.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use colored::Colorize;

use crate::error::{ContextRankError, Result};
use crate::manifest::{self, Manifest};

/// All inputs needed to run the explain command.
#[derive(Debug)]
pub struct ExplainCommandOptions {
    /// Path to manifest.json or directory containing it.
    pub manifest: Option<PathBuf>,
    /// Print per-fragment concept coverage.
    pub detailed: bool,
    /// Limit to top N entries.
    pub top: Option<usize>,
    /// Print the resolved (alpha, tau, budget) policy.
    pub show_weights: bool,
    /// Suppress non-essential output.
    pub quiet: bool,
}

/// Run the explain command.
pub fn run(options: ExplainCommandOptions) -> Result<()> {
    let manifest_path = resolve_manifest_path(options.manifest.as_deref())?;
    let manifest = manifest::read_manifest(&manifest_path)?;

    if options.show_weights {
        print_weights(&manifest);
    }

    let mut entries = manifest.entries.clone();
    sort_entries_for_display(&mut entries);

    if let Some(top) = options.top {
        entries.truncate(top);
    }

    for entry in &entries {
        let status = if entry.included {
            "included".green().to_string()
        } else {
            "excluded".dimmed().to_string()
        };

        let location = format!("{}:{}-{}", entry.file_path, entry.start_line, entry.end_line);
        let symbol = entry.symbol.as_deref().unwrap_or("-");

        println!(
            "  {} ({} tokens, R={:.4}, {})  `{}`",
            location.bold(),
            entry.token_estimate,
            entry.ppr_score,
            status,
            symbol,
        );

        if options.detailed {
            let core_marker = if entry.in_core_set { "yes" } else { "no" };
            println!(
                "    kind: {}, in E0: {}, concepts: {}",
                entry.kind,
                core_marker,
                if entry.concepts.is_empty() {
                    "-".to_string()
                } else {
                    entry.concepts.join(", ")
                },
            );
            println!(
                "    density: {:.4}, connected via: {}",
                entry.density,
                if entry.connecting_families.is_empty() {
                    "-".to_string()
                } else {
                    entry.connecting_families.join(", ")
                },
            );
        }
    }

    if !options.quiet {
        println!();
        let summary = &manifest.summary;
        let budget_info = match summary.budget {
            Some(b) => format!(" / {b} budget"),
            None => String::new(),
        };
        println!(
            "{} ~{} tokens{}, {} of {} fragments included ({}, {} PPR iterations{})",
            "summary:".green().bold(),
            summary.total_tokens,
            budget_info,
            summary.included_count,
            summary.universe_size,
            summary.stopping_reason,
            summary.ppr_iterations,
            if summary.ppr_converged { "" } else { ", did not converge" },
        );
        if summary.universe_truncated {
            println!("  {}", "universe was truncated by max_universe".yellow());
        }
    }

    Ok(())
}

/// Sort entries for deterministic explain output: PPR score descending,
/// ties broken by file path/line so repeated runs produce identical
/// ordering.
fn sort_entries_for_display(entries: &mut [crate::manifest::ManifestEntry]) {
    entries.sort_by(|a, b| {
        b.ppr_score
            .partial_cmp(&a.ppr_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.file_path.cmp(&b.file_path))
            .then_with(|| a.start_line.cmp(&b.start_line))
            .then_with(|| a.end_line.cmp(&b.end_line))
    });
}

/// Resolve the manifest path from user input.
///
/// - `Some(file.json)` -> use directly
/// - `Some(directory)` -> look for `manifest.json` in it
/// - `None` -> `./manifest.json`
fn resolve_manifest_path(input: Option<&Path>) -> Result<PathBuf> {
    match input {
        Some(p) => {
            if p.is_dir() {
                let candidate = p.join("manifest.json");
                if candidate.exists() {
                    Ok(candidate)
                } else {
                    Err(ContextRankError::invalid_path(
                        p.to_string_lossy(),
                        "no manifest.json found in directory",
                    ))
                }
            } else {
                Ok(p.to_path_buf())
            }
        }
        None => {
            let default = PathBuf::from("manifest.json");
            if default.exists() {
                Ok(default)
            } else {
                Err(ContextRankError::invalid_path(
                    "manifest.json",
                    "no manifest.json found in current directory; specify a path",
                ))
            }
        }
    }
}

fn print_weights(manifest: &Manifest) {
    println!("{}", "Run policy:".bold());
    match manifest.summary.budget {
        Some(b) => println!("  budget: {b}"),
        None => println!("  budget: none (tau-stopping only)"),
    }
    println!("  core set size: {}", manifest.summary.core_set_size);
    println!("  universe size: {}", manifest.summary.universe_size);
    println!();
}
