//! Structural fallback for files too large to prompt in full.

use std::sync::OnceLock;

use regex::Regex;

/// Most declaration lines kept in one outline.
const MAX_OUTLINE_LINES: usize = 200;

/// Produces a compacted stand-in for one source file.
///
/// Returning `None` means the file could not be summarized and its raw
/// content is kept.
pub trait CodeSummarizer: Send + Sync {
    fn summarize(&self, language: &str, source: &str) -> Option<String>;
}

/// Keeps declaration-like lines and drops everything else. Cruder than a
/// parser-backed outline, but it works on any language the classifier
/// names.
pub struct OutlineSummarizer;

static DECLARATION: OnceLock<Regex> = OnceLock::new();

fn declaration_pattern() -> &'static Regex {
    DECLARATION.get_or_init(|| {
        Regex::new(r"^\s*(?:pub(?:\([a-z]+\))?\s+|export\s+|public\s+|private\s+|protected\s+|static\s+|abstract\s+|async\s+|default\s+)*(?:fn|func|def|function|class|struct|enum|trait|impl|interface|type|const|mod|module|package|import|use|from|require)\b")
            .expect("declaration pattern is valid")
    })
}

impl CodeSummarizer for OutlineSummarizer {
    fn summarize(&self, language: &str, source: &str) -> Option<String> {
        let pattern = declaration_pattern();
        let total = source.lines().count();
        let mut kept: Vec<&str> = Vec::new();
        for line in source.lines() {
            if pattern.is_match(line) {
                kept.push(line.trim_end());
                if kept.len() >= MAX_OUTLINE_LINES {
                    break;
                }
            }
        }
        if kept.is_empty() {
            return None;
        }
        let label = if language.trim().is_empty() {
            "source"
        } else {
            language
        };
        Some(format!(
            "[structural outline of a {label} file; {} of {total} lines kept, bodies omitted]\n{}",
            kept.len(),
            kept.join("\n")
        ))
    }
}
