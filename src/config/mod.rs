pub mod settings;

use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Persisted user configuration.
///
/// Every field has a serde default so configs written by older versions load
/// without migration. API keys may also come from the environment; the
/// values here win when both are set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    /// Model used when a command does not name one explicitly.
    pub default_model: Option<String>,
    /// Analysis output location; `None` keeps artifacts inside the analyzed
    /// project under `.repo-scribe/`.
    pub output_directory: Option<PathBuf>,
    /// Free-text description of the reader's background, injected into every
    /// prompt.
    pub user_expertise: Option<String>,
    /// Extra exclusion patterns applied on top of `.gitignore` files.
    pub ignore_patterns: HashSet<String>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        settings::load_config()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        let mut ignore_patterns = HashSet::new();
        let common_patterns = [
            "node_modules",
            "target",
            "dist",
            "build",
            "coverage",
            "venv",
            ".venv",
            "__pycache__",
            ".idea",
            ".vscode",
            ".DS_Store",
        ];
        for pattern in common_patterns {
            ignore_patterns.insert(pattern.to_string());
        }

        Self {
            openai_api_key: None,
            anthropic_api_key: None,
            gemini_api_key: None,
            default_model: Some("gemini-1.5-flash".to_string()),
            output_directory: None,
            user_expertise: None,
            ignore_patterns,
        }
    }
}
