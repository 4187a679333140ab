use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "contextrank",
    about = "A diff-aware context selector: ranks and picks a token-budgeted, semantically coherent bundle of fragments around a git diff",
    version,
    propagate_version = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Project root directory
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Path to config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Color output mode
    #[arg(long, global = true, value_enum, default_value_t = ColorMode::Auto)]
    pub color: ColorMode,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    Auto,
    Always,
    Never,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Initialize a new contextrank project
    Init {
        /// Project root directory
        #[arg(long)]
        root: Option<PathBuf>,

        /// Path to write config file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Select a token-budgeted context bundle around a git diff
    #[command(alias = "s")]
    Select {
        /// Git revision range (e.g. HEAD~3..HEAD)
        rev_range: Option<String>,

        /// Include staged changes
        #[arg(long)]
        staged: bool,

        /// Include untracked files
        #[arg(long)]
        untracked: bool,

        /// Changes since timestamp or duration (e.g. "2h", "2024-01-01")
        #[arg(long)]
        since: Option<String>,

        /// Token budget for the final selection
        #[arg(long)]
        budget: Option<usize>,

        /// Bypass the Selector and return the entire candidate universe
        #[arg(long)]
        full: bool,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Markdown)]
        format: OutputFormat,

        /// Write output to file (also writes a sibling *.manifest.json)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Write to stdout
        #[arg(long)]
        stdout: bool,

        /// Pipeline deadline in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Explain how a previous `select` run assembled its bundle
    #[command(alias = "e")]
    Explain {
        /// Path to manifest.json or a directory containing it
        manifest: Option<PathBuf>,

        /// Print per-fragment concept coverage
        #[arg(long)]
        detailed: bool,

        /// Limit to top N entries
        #[arg(long)]
        top: Option<usize>,

        /// Print the resolved (alpha, tau, budget) policy
        #[arg(long)]
        show_weights: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Markdown,
    Json,
}
