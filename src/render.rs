//! Render a [`Selection`](crate::selector::Selection) into Markdown or
//! JSON output. Adapted from the teacher's bundle formatter, trimmed to
//! the two formats the CLI exposes (spec §6: "Markdown (default) or
//! JSON").

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{ContextRankError, Result};

/// Controls where and how output is written.
#[derive(Debug, Clone)]
pub struct FormatOptions {
    pub format: Format,
    pub stdout: bool,
    pub out: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Markdown,
    Json,
}

/// The rendering-ready view of one selected fragment.
#[derive(Debug, Clone, Serialize)]
pub struct RenderedFragment {
    pub file_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub language: String,
    pub symbol: Option<String>,
    pub content: String,
}

/// A complete bundle ready for formatting.
#[derive(Debug, Clone, Serialize)]
pub struct Bundle {
    pub summary: String,
    pub fragments: Vec<RenderedFragment>,
}

/// Render a bundle to a string in the given format.
pub fn format_bundle(bundle: &Bundle, format: Format) -> Result<String> {
    match format {
        Format::Markdown => Ok(format_markdown(bundle)),
        Format::Json => format_json(bundle),
    }
}

/// Markdown: fenced code blocks with file-path/line-range headers,
/// ordered as the Selector returned them.
fn format_markdown(bundle: &Bundle) -> String {
    let mut out = String::new();
    out.push_str("# Selected Context\n\n");
    if !bundle.summary.is_empty() {
        out.push_str(&format!("> {}\n\n", bundle.summary));
    }

    for frag in &bundle.fragments {
        let header = match &frag.symbol {
            Some(symbol) => format!(
                "## `{}` (lines {}-{}) — `{}`",
                frag.file_path, frag.start_line, frag.end_line, symbol
            ),
            None => format!(
                "## `{}` (lines {}-{})",
                frag.file_path, frag.start_line, frag.end_line
            ),
        };
        out.push_str(&header);
        out.push('\n');
        out.push_str(&format!("```{}\n", frag.language));
        out.push_str(&frag.content);
        if !frag.content.ends_with('\n') {
            out.push('\n');
        }
        out.push_str("```\n\n");
    }

    out
}

fn format_json(bundle: &Bundle) -> Result<String> {
    serde_json::to_string_pretty(bundle)
        .map_err(|e| ContextRankError::config_with_source("failed to serialize bundle as JSON", e))
}

/// Write a formatted string to the appropriate destination.
pub fn write_output(content: &str, options: &FormatOptions) -> Result<()> {
    if options.stdout {
        return write_stdout(content);
    }

    match &options.out {
        Some(path) => write_to_file(content, path),
        None => write_stdout(content),
    }
}

fn write_stdout(content: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout
        .write_all(content.as_bytes())
        .map_err(|e| ContextRankError::io("writing to stdout", e))
}

fn write_to_file(content: &str, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            ContextRankError::io(format!("creating directory '{}'", parent.display()), e)
        })?;
    }
    std::fs::write(path, content)
        .map_err(|e| ContextRankError::io(format!("writing output to '{}'", path.display()), e))
}
