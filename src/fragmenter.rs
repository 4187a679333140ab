//! The fragmenter: splits a file into an ordered, non-overlapping sequence
//! of fragments that tile it exactly (spec §4.1).
//!
//! Strategy pipeline, first applicable wins: language-aware heuristic
//! parsing (regex header detection + brace/indent scanning, in the spirit
//! of the teacher's `symbols.rs` definition patterns — no true AST, per
//! spec.md's "name-matching heuristics only" non-goal), Markdown section
//! splitting, structured-config top-level-key splitting, and a blank-line
//! paragraph fallback.
//!
//! A second output, `containers`, holds coarser non-tiling spans (e.g. a
//! class body enclosing its methods) that the Diff Mapper consults to find
//! a changed fragment's "enclosing syntactic container" (spec §4.2); these
//! deliberately overlap the tiling and are not part of it.

use std::path::Path;

use regex::Regex;

use crate::fragment::{Fragment, FragmentKind, MAX_FRAGMENT_LINES, MIN_FRAGMENT_LINES};
use crate::identifiers;

/// Output of fragmenting one file.
pub struct FragmentationResult {
    /// Non-overlapping fragments that tile the file exactly (invariant
    /// tested by spec §8 property 1).
    pub tiles: Vec<Fragment>,
    /// Coarser container spans (class/module bodies) that overlap the
    /// tiling; consulted only for "enclosing container" lookups.
    pub containers: Vec<Fragment>,
}

/// Fragment a file's text given its inferred language (see
/// [`crate::utils::infer_language`]). Never fails: on any internal
/// difficulty, strategies downgrade to the fallback text partitioner
/// (spec §4.1 "Failure").
pub fn fragment_file(path: &Path, text: &str, language: &str) -> FragmentationResult {
    if text.is_empty() {
        return FragmentationResult {
            tiles: Vec::new(),
            containers: Vec::new(),
        };
    }

    if language == "markdown" {
        return fragment_markdown(path, text);
    }
    if crate::utils::is_config_language(language) {
        return fragment_config(path, text, language);
    }
    if let Some(result) = fragment_code(path, text, language) {
        return result;
    }
    fragment_fallback(path, text)
}

// ---------------------------------------------------------------------------
// Strategy 1: language-aware heuristic code parsing
// ---------------------------------------------------------------------------

/// Per-language header patterns: `(regex, is_brace_delimited)`. Brace
/// languages use brace counting to find the body end; indent languages
/// (python/ruby) use indentation.
fn code_header_pattern(language: &str) -> Option<(Regex, bool)> {
    let (src, brace_delimited) = match language {
        "rust" => (
            r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:unsafe\s+)?(?:async\s+)?(?:extern\s+)?(fn|struct|enum|trait|impl|mod)\s+[A-Za-z_][A-Za-z0-9_]*",
            true,
        ),
        "go" => (r"^\s*func\s+(?:\([^)]*\)\s+)?[A-Za-z_][A-Za-z0-9_]*", true),
        "java" | "kotlin" => (
            r"^\s*(?:public|private|protected|static|final|abstract|\s)*\s*(?:class|interface|enum)\s+[A-Za-z_][A-Za-z0-9_]*|^\s*(?:public|private|protected|static|final|\s)*\s*[A-Za-z_<>\[\],\s]+\s+[A-Za-z_][A-Za-z0-9_]*\s*\([^;]*\)\s*\{",
            true,
        ),
        "c" | "cpp" => (
            r"^[A-Za-z_][A-Za-z0-9_:<>,\*&\s]*\s[A-Za-z_~][A-Za-z0-9_]*\s*\([^;]*\)\s*\{?$|^\s*(class|struct)\s+[A-Za-z_][A-Za-z0-9_]*",
            true,
        ),
        "javascript" | "typescript" => (
            r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*[A-Za-z_$][A-Za-z0-9_$]*|^\s*(?:export\s+)?(?:default\s+)?class\s+[A-Za-z_$][A-Za-z0-9_$]*|^\s*(?:export\s+)?(?:const|let|var)\s+[A-Za-z_$][A-Za-z0-9_$]*\s*=\s*(?:async\s*)?\(",
            true,
        ),
        "python" => (
            r"^\s*(?:async\s+)?def\s+[A-Za-z_][A-Za-z0-9_]*|^\s*class\s+[A-Za-z_][A-Za-z0-9_]*",
            false,
        ),
        "ruby" => (
            r"^\s*def\s+[A-Za-z_][A-Za-z0-9_?!=]*|^\s*class\s+[A-Za-z_][A-Za-z0-9_]*|^\s*module\s+[A-Za-z_][A-Za-z0-9_]*",
            false,
        ),
        "swift" => (
            r"^\s*(?:public\s+|private\s+|internal\s+)?(?:static\s+)?func\s+[A-Za-z_][A-Za-z0-9_]*|^\s*(?:public\s+)?(?:final\s+)?class\s+[A-Za-z_][A-Za-z0-9_]*",
            true,
        ),
        _ => return None,
    };
    Regex::new(src).ok().map(|re| (re, brace_delimited))
}

fn extract_symbol(header_line: &str) -> Option<String> {
    let re = Regex::new(r"(?:fn|func|def|class|struct|enum|trait|module|interface)\s+([A-Za-z_][A-Za-z0-9_]*)").ok()?;
    re.captures(header_line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn indent_of(line: &str) -> usize {
    line.chars().take_while(|c| *c == ' ' || *c == '\t').count()
}

/// Find the end line (1-based, inclusive) of a brace-delimited body
/// starting at `start_idx` (0-based), by counting braces across lines.
/// Falls back to end-of-file if braces never balance (e.g. a forward
/// declaration with no body).
fn brace_body_end(lines: &[&str], start_idx: usize) -> usize {
    let mut depth: i64 = 0;
    let mut seen_open = false;
    for (i, line) in lines.iter().enumerate().skip(start_idx) {
        for c in line.chars() {
            match c {
                '{' => {
                    depth += 1;
                    seen_open = true;
                }
                '}' => depth -= 1,
                _ => {}
            }
        }
        if seen_open && depth <= 0 {
            return i + 1;
        }
    }
    lines.len()
}

/// Find the end line (1-based, inclusive) of an indentation-delimited
/// body: everything more deeply indented than the header, plus the
/// header itself.
fn indent_body_end(lines: &[&str], start_idx: usize) -> usize {
    let header_indent = indent_of(lines[start_idx]);
    let mut end = start_idx + 1;
    for (i, line) in lines.iter().enumerate().skip(start_idx + 1) {
        if line.trim().is_empty() {
            end = i + 1;
            continue;
        }
        if indent_of(line) > header_indent {
            end = i + 1;
        } else {
            break;
        }
    }
    end
}

fn fragment_code(path: &Path, text: &str, language: &str) -> Option<FragmentationResult> {
    let (pattern, brace_delimited) = code_header_pattern(language)?;
    let lines: Vec<&str> = text.lines().collect();
    if lines.is_empty() {
        return Some(FragmentationResult {
            tiles: Vec::new(),
            containers: Vec::new(),
        });
    }

    #[derive(Clone)]
    struct Header {
        start_idx: usize,
        kind: FragmentKind,
        symbol: Option<String>,
        is_container: bool,
    }

    let mut headers = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        if pattern.is_match(line) {
            let is_container = line.contains("class ")
                || line.contains("struct ")
                || line.contains("trait ")
                || line.contains("impl ")
                || line.contains("interface ")
                || line.contains("module ");
            let kind = if is_container {
                FragmentKind::Class
            } else if indent_of(line) > 0 {
                FragmentKind::Method
            } else {
                FragmentKind::Function
            };
            headers.push(Header {
                start_idx: i,
                kind,
                symbol: extract_symbol(line),
                is_container,
            });
        }
    }

    if headers.is_empty() {
        return None;
    }

    let mut containers = Vec::new();
    for h in &headers {
        if h.is_container {
            let end_idx = if brace_delimited {
                brace_body_end(&lines, h.start_idx)
            } else {
                indent_body_end(&lines, h.start_idx)
            };
            containers.push(build_fragment(
                path,
                &lines,
                h.start_idx,
                end_idx.max(h.start_idx + 1),
                FragmentKind::Class,
                h.symbol.clone(),
            ));
        }
    }

    // Tiling: boundaries are every header's start line, in order; each
    // tile runs from its header to just before the next header (or EOF).
    // This keeps the tiling non-overlapping regardless of nested headers,
    // at the cost of not tracking precise per-function bodies for nested
    // cases — containers (above) carry the precise span for those.
    let mut tiles = Vec::new();
    // Leading lines before the first header become a generic fragment.
    if headers[0].start_idx > 0 {
        tiles.extend(fallback_tile(path, &lines, 0, headers[0].start_idx));
    }
    for (hi, header) in headers.iter().enumerate() {
        let start = header.start_idx;
        let end = headers
            .get(hi + 1)
            .map(|h| h.start_idx)
            .unwrap_or(lines.len());
        tiles.push(build_fragment(
            path,
            &lines,
            start,
            end,
            header.kind,
            header.symbol.clone(),
        ));
    }

    Some(split_oversized(FragmentationResult { tiles, containers }))
}

fn build_fragment(
    path: &Path,
    lines: &[&str],
    start_idx: usize,
    end_idx: usize,
    kind: FragmentKind,
    symbol: Option<String>,
) -> Fragment {
    let end_idx = end_idx.max(start_idx + 1).min(lines.len());
    let content = lines[start_idx..end_idx].join("\n");
    let identifiers = identifiers::tokenize(&content);
    Fragment {
        file_path: path.to_path_buf(),
        start_line: start_idx + 1,
        end_line: end_idx,
        kind,
        symbol,
        token_count: crate::tokens::estimate_tokens_default(&content),
        identifiers,
        content,
    }
}

/// Split any tile exceeding [`MAX_FRAGMENT_LINES`] at plain line-count
/// sub-boundaries (spec §3: "split at natural sub-boundaries if the
/// parser provides them" — absent richer structure, equal-sized chunks).
fn split_oversized(result: FragmentationResult) -> FragmentationResult {
    let mut tiles = Vec::with_capacity(result.tiles.len());
    for frag in result.tiles {
        if frag.line_count() <= MAX_FRAGMENT_LINES {
            tiles.push(frag);
            continue;
        }
        let lines: Vec<&str> = frag.content.lines().collect();
        let mut offset = 0usize;
        let mut first = true;
        while offset < lines.len() {
            let chunk_end = (offset + MAX_FRAGMENT_LINES).min(lines.len());
            let chunk = lines[offset..chunk_end].join("\n");
            let start_line = frag.start_line + offset;
            let end_line = frag.start_line + chunk_end - 1;
            tiles.push(Fragment {
                file_path: frag.file_path.clone(),
                start_line,
                end_line,
                kind: frag.kind,
                symbol: if first { frag.symbol.clone() } else { None },
                token_count: crate::tokens::estimate_tokens_default(&chunk),
                identifiers: identifiers::tokenize(&chunk),
                content: chunk,
            });
            offset = chunk_end;
            first = false;
        }
    }
    FragmentationResult {
        tiles,
        containers: result.containers,
    }
}

// ---------------------------------------------------------------------------
// Strategy 2: Markdown
// ---------------------------------------------------------------------------

fn fragment_markdown(path: &Path, text: &str) -> FragmentationResult {
    let lines: Vec<&str> = text.lines().collect();
    let heading_re = Regex::new(r"^#{1,6}\s+\S").unwrap();

    let mut boundaries = vec![0usize];
    for (i, line) in lines.iter().enumerate() {
        if i > 0 && heading_re.is_match(line) {
            boundaries.push(i);
        }
    }
    boundaries.push(lines.len());
    boundaries.dedup();

    let mut tiles = Vec::new();
    for w in boundaries.windows(2) {
        let (start, end) = (w[0], w[1]);
        if start >= end {
            continue;
        }
        let symbol = lines[start]
            .trim_start_matches('#')
            .trim()
            .to_string();
        let symbol = if symbol.is_empty() { None } else { Some(symbol) };
        tiles.push(build_fragment(
            path,
            &lines,
            start,
            end,
            FragmentKind::Section,
            symbol,
        ));
    }
    if tiles.is_empty() {
        return fragment_fallback(path, text);
    }
    split_oversized(FragmentationResult {
        tiles,
        containers: Vec::new(),
    })
}

// ---------------------------------------------------------------------------
// Strategy 3: structured config (JSON/YAML/TOML)
// ---------------------------------------------------------------------------

fn fragment_config(path: &Path, text: &str, language: &str) -> FragmentationResult {
    let lines: Vec<&str> = text.lines().collect();
    let boundaries = match language {
        "toml" => toml_top_level_boundaries(&lines),
        "yaml" => yaml_top_level_boundaries(&lines),
        "json" => json_top_level_boundaries(&lines),
        _ => Vec::new(),
    };

    if boundaries.len() < 2 {
        return fragment_fallback(path, text);
    }

    let mut tiles = Vec::new();
    for w in boundaries.windows(2) {
        let (start, end) = (w[0], w[1]);
        if start >= end {
            continue;
        }
        tiles.push(build_fragment(
            path,
            &lines,
            start,
            end,
            FragmentKind::ConfigBlock,
            config_key_at(lines[start]),
        ));
    }
    split_oversized(FragmentationResult {
        tiles,
        containers: Vec::new(),
    })
}

fn config_key_at(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if let Some(stripped) = trimmed.strip_prefix('[') {
        return stripped.split(']').next().map(|s| s.trim().to_string());
    }
    trimmed
        .split_once(':')
        .or_else(|| trimmed.split_once('='))
        .map(|(k, _)| k.trim().trim_matches('"').to_string())
}

fn toml_top_level_boundaries(lines: &[&str]) -> Vec<usize> {
    let mut boundaries = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        let t = line.trim_start();
        if t.starts_with('[') || (!line.starts_with(char::is_whitespace) && t.contains('=')) {
            boundaries.push(i);
        }
    }
    boundaries.push(lines.len());
    boundaries.dedup();
    boundaries
}

/// YAML top-level keys: lines with no leading whitespace that look like
/// `key:` (heuristic — no YAML-parsing crate is pulled in for this, see
/// DESIGN.md; the corpus carries no YAML dependency to ground one).
fn yaml_top_level_boundaries(lines: &[&str]) -> Vec<usize> {
    let mut boundaries = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        if line.starts_with(char::is_alphanumeric) && line.contains(':') {
            boundaries.push(i);
        }
    }
    boundaries.push(lines.len());
    boundaries.dedup();
    boundaries
}

fn json_top_level_boundaries(lines: &[&str]) -> Vec<usize> {
    let mut boundaries = Vec::new();
    let mut depth: i64 = 0;
    for (i, line) in lines.iter().enumerate() {
        if depth == 1 && line.trim_start().starts_with('"') {
            boundaries.push(i);
        }
        for c in line.chars() {
            match c {
                '{' | '[' => depth += 1,
                '}' | ']' => depth -= 1,
                _ => {}
            }
        }
    }
    boundaries.push(lines.len());
    boundaries.dedup();
    boundaries
}

// ---------------------------------------------------------------------------
// Strategy 4: fallback text partitioner
// ---------------------------------------------------------------------------

fn fragment_fallback(path: &Path, text: &str) -> FragmentationResult {
    let lines: Vec<&str> = text.lines().collect();
    FragmentationResult {
        tiles: fallback_tile(path, &lines, 0, lines.len()),
        containers: Vec::new(),
    }
}

/// Partition `lines[start..end]` into blank-line-separated paragraphs,
/// coalesced to honour [`MIN_FRAGMENT_LINES`] (spec §4.1 strategy 4).
fn fallback_tile(path: &Path, lines: &[&str], start: usize, end: usize) -> Vec<Fragment> {
    if start >= end {
        return Vec::new();
    }
    let mut paragraphs: Vec<(usize, usize)> = Vec::new();
    let mut seg_start = start;
    for i in start..end {
        if lines[i].trim().is_empty() {
            if i > seg_start {
                paragraphs.push((seg_start, i));
            }
            seg_start = i + 1;
        }
    }
    if seg_start < end {
        paragraphs.push((seg_start, end));
    }
    if paragraphs.is_empty() {
        paragraphs.push((start, end));
    }

    // Coalesce adjacent paragraphs shorter than MIN_FRAGMENT_LINES into
    // their neighbour, except the file's tail fragment which may be short.
    let mut coalesced: Vec<(usize, usize)> = Vec::new();
    for (s, e) in paragraphs {
        if let Some(last) = coalesced.last_mut() {
            if last.1 - last.0 < MIN_FRAGMENT_LINES {
                last.1 = e;
                continue;
            }
        }
        coalesced.push((s, e));
    }

    coalesced
        .into_iter()
        .map(|(s, e)| build_fragment(path, lines, s, e, FragmentKind::Generic, None))
        .collect()
}
