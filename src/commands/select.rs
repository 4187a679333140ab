//! Handler for the `contextrank select` command.
//!
//! Orchestrates the full pipeline: obtains a git diff, scans the
//! repository for universe-expansion candidates, runs `pipeline::run`,
//! and renders the resulting selection plus its manifest.

use std::path::PathBuf;
use std::time::Duration;

use colored::Colorize;
use tracing::{info, warn};

use crate::cli::OutputFormat;
use crate::config::Config;
use crate::error::{ContextRankError, Result};
use crate::gitdiff::{self, DiffOptions};
use crate::manifest;
use crate::pipeline::{self, PipelineDeadline, PipelineInput};
use crate::render::{Bundle, Format, FormatOptions, RenderedFragment};
use crate::scanner;
use crate::utils;

/// All inputs needed to run the select command.
#[derive(Debug)]
pub struct SelectCommandOptions {
    pub root: PathBuf,
    pub rev_range: Option<String>,
    pub staged: bool,
    pub untracked: bool,
    pub since: Option<String>,
    pub budget: Option<usize>,
    pub full: bool,
    pub format: OutputFormat,
    pub out: Option<PathBuf>,
    pub stdout: bool,
    pub timeout_ms: Option<u64>,
    pub quiet: bool,
    pub config_path: Option<PathBuf>,
}

/// Run the select command end-to-end.
pub fn run(options: SelectCommandOptions) -> Result<()> {
    let mut config = load_config(&options)?;
    config.budget = options.budget.or(config.budget);
    config.full = options.full || config.full;

    gitdiff::verify_git_repo(&options.root)?;

    let diff_files = gitdiff::get_diff(&DiffOptions {
        root: options.root.clone(),
        rev_range: options.rev_range,
        staged: options.staged,
        untracked: options.untracked,
        since: options.since,
    })?;

    if diff_files.is_empty() {
        if !options.quiet {
            println!("{}", "No changes found.".dimmed());
        }
        return Ok(());
    }

    let commits = gitdiff::get_commit_history(&options.root, config.history_commit_window)
        .unwrap_or_else(|e| {
            warn!("failed to read commit history, history edges will be skipped: {e}");
            Vec::new()
        });

    let scan_options = scanner::scan_options_from_config(&config, &options.root);
    let all_files = scanner::scan(&scan_options)?;

    info!(
        files_changed = diff_files.len(),
        files_scanned = all_files.len(),
        "running pipeline"
    );

    let input = PipelineInput {
        diff_files,
        commits,
        all_files,
    };
    let deadline = PipelineDeadline::new(options.timeout_ms.map(Duration::from_millis));

    let result = pipeline::run(&input, &config, &deadline)?;

    info!(
        universe_size = result.manifest.summary.universe_size,
        included = result.manifest.summary.included_count,
        stopping_reason = %result.manifest.summary.stopping_reason,
        ppr_iterations = result.manifest.summary.ppr_iterations,
        "pipeline finished"
    );

    if !result.ppr.converged && !options.quiet {
        eprintln!(
            "{} PPR did not converge within the iteration cap",
            "warning:".yellow().bold()
        );
    }
    if result.manifest.summary.universe_truncated && !options.quiet {
        eprintln!(
            "{} candidate universe was truncated by max_universe",
            "warning:".yellow().bold()
        );
    }

    let by_id: std::collections::HashMap<_, _> = result
        .universe
        .fragments
        .iter()
        .map(|f| (f.id(), f))
        .collect();
    let fragments: Vec<RenderedFragment> = result
        .selection
        .fragments
        .iter()
        .filter_map(|id| by_id.get(id))
        .map(|frag| RenderedFragment {
            file_path: frag.file_path.to_string_lossy().to_string(),
            start_line: frag.start_line,
            end_line: frag.end_line,
            language: utils::infer_language(&frag.file_path.to_string_lossy()),
            symbol: frag.symbol.clone(),
            content: frag.content.clone(),
        })
        .collect();

    let bundle = Bundle {
        summary: format!(
            "{} fragments selected, {} tokens, stopping reason: {:?}",
            fragments.len(),
            result.selection.total_cost,
            result.selection.stopping_reason,
        ),
        fragments,
    };

    let format = match options.format {
        OutputFormat::Markdown => Format::Markdown,
        OutputFormat::Json => Format::Json,
    };
    let rendered = crate::render::format_bundle(&bundle, format)?;
    crate::render::write_output(
        &rendered,
        &FormatOptions {
            format,
            stdout: options.stdout,
            out: options.out.clone(),
        },
    )?;

    if let Some(out_path) = &options.out {
        let manifest_path = utils::manifest_sibling_path(out_path);
        manifest::write_manifest(&result.manifest, &manifest_path)?;
    }

    Ok(())
}

fn load_config(options: &SelectCommandOptions) -> Result<Config> {
    match crate::config::find_config_file(options.config_path.as_deref()) {
        Some(path) => Config::load(&path),
        None => {
            if let Some(explicit) = &options.config_path {
                return Err(ContextRankError::invalid_path(
                    explicit.display().to_string(),
                    "config file not found",
                ));
            }
            Ok(Config::default())
        }
    }
}
