//! Shared utility functions used across the CLI layer: language inference
//! (reused by the fragmenter's strategy dispatch and by rendering) and
//! manifest path computation.

use std::path::Path;

// ---------------------------------------------------------------------------
// Language inference
// ---------------------------------------------------------------------------

/// Infer a language identifier from a file path.
///
/// Checks the file extension first, then falls back to well-known
/// filenames (e.g. `Dockerfile`, `.gitignore`). Used both for display and
/// to key the fragmenter's strategy pipeline (spec §4.1) and the semantic
/// edge builder's per-language weight table (spec §4.5).
pub fn infer_language(path: &str) -> String {
    let ext = path.rsplit('.').next().unwrap_or("");
    let from_ext = match ext {
        "rs" => "rust",
        "ts" | "tsx" => "typescript",
        "js" | "jsx" => "javascript",
        "py" => "python",
        "go" => "go",
        "rb" => "ruby",
        "java" => "java",
        "c" | "h" => "c",
        "cpp" | "cc" | "cxx" | "hpp" => "cpp",
        "swift" => "swift",
        "kt" | "kts" => "kotlin",
        "sh" | "bash" | "zsh" => "bash",
        "md" => "markdown",
        "toml" => "toml",
        "yaml" | "yml" => "yaml",
        "json" => "json",
        "xml" => "xml",
        "html" | "htm" => "html",
        "css" => "css",
        "sql" => "sql",
        "graphql" | "gql" => "graphql",
        "proto" => "protobuf",
        "tf" => "hcl",
        "lock" => "toml",
        _ => "",
    };

    if !from_ext.is_empty() {
        return from_ext.to_string();
    }

    let filename = path.rsplit('/').next().unwrap_or(path);
    match filename {
        "Dockerfile" | "Containerfile" => "dockerfile",
        "Makefile" | "GNUmakefile" => "makefile",
        "Justfile" | "justfile" => "makefile",
        "CMakeLists.txt" => "cmake",
        ".gitignore" | ".dockerignore" | ".prettierignore" | ".eslintignore" => "gitignore",
        ".env" | ".env.local" | ".env.example" => "dotenv",
        "Gemfile" => "ruby",
        "Rakefile" => "ruby",
        "Vagrantfile" => "ruby",
        _ => "",
    }
    .to_string()
}

/// Whether `infer_language` recognises the path as a structured config or
/// manifest format (spec §4.1 strategy 3, §4.5 Configuration family).
pub fn is_config_language(language: &str) -> bool {
    matches!(language, "json" | "yaml" | "toml" | "xml" | "dockerfile" | "hcl")
}

// ---------------------------------------------------------------------------
// Manifest path
// ---------------------------------------------------------------------------

/// Compute the manifest sibling path for a given output file.
///
/// `output.md` -> `output.manifest.json`
pub fn manifest_sibling_path(out_path: &Path) -> std::path::PathBuf {
    let stem = out_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    let parent = out_path.parent().unwrap_or(Path::new("."));
    parent.join(format!("{stem}.manifest.json"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
