//! Identifier tokenization shared by the fragmenter and the concept
//! extractor (spec §4.1, §4.3): split on non-alphanumeric boundaries, then
//! on case transitions (`camelCase`, `snake_case`, `PascalCase`), drop short
//! and stopword tokens.

use std::collections::BTreeSet;

const MIN_TOKEN_LEN: usize = 3;

/// Language keywords and very common short tokens that carry no
/// diff-concept signal on their own.
const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "can", "has", "was", "one", "our",
    "out", "use", "let", "mut", "fn", "pub", "impl", "struct", "enum", "trait", "mod", "use",
    "self", "this", "that", "with", "from", "into", "true", "false", "none", "some", "return",
    "if", "else", "match", "while", "loop", "for", "in", "as", "ref", "box", "dyn", "where",
    "async", "await", "move", "def", "class", "import", "export", "function", "const", "var",
    "let", "new", "null", "nil", "undefined", "void", "int", "str", "string", "bool", "float",
    "double", "char", "byte", "type", "interface", "package", "namespace", "static", "final",
    "public", "private", "protected", "override", "virtual", "abstract", "extends", "implements",
];

/// Split `ident` into its constituent words: snake/kebab case on
/// underscores/hyphens, camelCase/PascalCase on case transitions.
fn split_identifier(ident: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let chars: Vec<char> = ident.chars().collect();

    for (i, &c) in chars.iter().enumerate() {
        if c == '_' || c == '-' {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }
        if c.is_uppercase() && !current.is_empty() {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).map(|n| n.is_lowercase()).unwrap_or(false);
            // Boundary on lower->upper (camelCase) or on an acronym->Word
            // transition (XMLParser -> XML, Parser).
            if prev.is_lowercase() || (prev.is_uppercase() && next_is_lower) {
                words.push(std::mem::take(&mut current));
            }
        }
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(&word)
}

/// Tokenize free-form source text into a set of normalized, non-stopword
/// identifier tokens (lowercase), per spec §4.1's identifier extraction
/// rule: split on non-alphanumeric boundaries, then on case transitions,
/// drop tokens shorter than 3 characters and stopwords.
pub fn tokenize(text: &str) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    for raw in text.split(|c: char| !c.is_alphanumeric() && c != '_' && c != '-') {
        if raw.is_empty() || !raw.chars().next().unwrap().is_alphabetic() {
            continue;
        }
        for word in split_identifier(raw) {
            let lower = word.to_lowercase();
            if lower.len() < MIN_TOKEN_LEN || is_stopword(&lower) {
                continue;
            }
            out.insert(lower);
        }
    }
    out
}

/// Tokenize a single line (used by the diff mapper / concept extractor to
/// pull identifiers off added/removed lines, spec §4.3). The leading
/// `+`/`-` diff marker, if present, is stripped first.
pub fn tokenize_diff_line(line: &str) -> BTreeSet<String> {
    let stripped = line
        .strip_prefix('+')
        .or_else(|| line.strip_prefix('-'))
        .unwrap_or(line);
    tokenize(stripped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_snake_case() {
        assert_eq!(
            split_identifier("hello_world_foo"),
            vec!["hello", "world", "foo"]
        );
    }

    #[test]
    fn splits_camel_case() {
        assert_eq!(split_identifier("helloWorldFoo"), vec!["hello", "World", "Foo"]);
    }

    #[test]
    fn splits_pascal_case_and_acronyms() {
        assert_eq!(split_identifier("XMLParser"), vec!["XML", "Parser"]);
    }

    #[test]
    fn tokenize_drops_short_and_stopwords() {
        let tokens = tokenize("fn foo_bar(x: i32) -> bool { let mut a = x; a }");
        assert!(tokens.contains("foo"));
        assert!(tokens.contains("bar"));
        assert!(!tokens.contains("fn"));
        assert!(!tokens.contains("let"));
        // "x" and "a" are below MIN_TOKEN_LEN
        assert!(!tokens.contains("x"));
        assert!(!tokens.contains("a"));
    }

    #[test]
    fn tokenize_normalizes_case() {
        let tokens = tokenize("XyzGizmo");
        assert!(tokens.contains("xyz"));
        assert!(tokens.contains("gizmo"));
    }

    #[test]
    fn tokenize_diff_line_strips_marker() {
        let added = tokenize_diff_line("+    computeWidget(config);");
        assert!(added.contains("compute"));
        assert!(added.contains("widget"));
        assert!(added.contains("config"));
    }

    #[test]
    fn empty_text_yields_empty_set() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("+++ ---").is_empty());
    }
}
