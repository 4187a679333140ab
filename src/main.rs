use std::path::PathBuf;

use clap::Parser;
use colored::Colorize;

use contextrank::cli::{Cli, ColorMode, Command};
use contextrank::commands;
use contextrank::commands::explain::ExplainCommandOptions;
use contextrank::commands::init::{InitOptions, InitResult};
use contextrank::commands::select::SelectCommandOptions;
use contextrank::error::{ContextRankError, Result};

fn main() {
    let cli = Cli::parse();

    match cli.color {
        ColorMode::Always => colored::control::set_override(true),
        ColorMode::Never => colored::control::set_override(false),
        ColorMode::Auto => {}
    }

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    if let Err(err) = run(cli) {
        eprintln!("{} {err}", "error:".red().bold());
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Init {
            root,
            config,
            force,
        } => {
            let root = resolve_root(root.or_else(|| cli.root.clone()))?;
            let result = commands::init::run(InitOptions {
                root,
                config_path: config,
                force,
            })?;
            print_init_result(&result);
            Ok(())
        }
        Command::Select {
            rev_range,
            staged,
            untracked,
            since,
            budget,
            full,
            format,
            out,
            stdout,
            timeout_ms,
        } => {
            let root = resolve_root(cli.root.clone())?;
            commands::select::run(SelectCommandOptions {
                root,
                rev_range,
                staged,
                untracked,
                since,
                budget,
                full,
                format,
                out,
                stdout,
                timeout_ms,
                quiet: cli.quiet,
                config_path: cli.config,
            })
        }
        Command::Explain {
            manifest,
            detailed,
            top,
            show_weights,
        } => commands::explain::run(ExplainCommandOptions {
            manifest,
            detailed,
            top,
            show_weights,
            quiet: cli.quiet,
        }),
    }
}

fn resolve_root(root: Option<PathBuf>) -> Result<PathBuf> {
    match root {
        Some(p) => Ok(p),
        None => std::env::current_dir()
            .map_err(|e| ContextRankError::io("getting current directory", e)),
    }
}

fn print_init_result(result: &InitResult) {
    println!(
        "{} Created config at {}",
        "ok".green().bold(),
        result.config_path.display()
    );
    println!();
    println!("Next steps:");
    println!(
        "  1. Edit {} to customize settings",
        "contextrank.toml".bold()
    );
    println!(
        "  2. Run {} to pick a context bundle around your current diff",
        "contextrank select".bold()
    );
}
