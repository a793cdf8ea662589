use std::path::Path;

use globset::{Glob, GlobMatcher};

/// A single compiled exclusion rule.
#[derive(Debug, Clone)]
struct IgnoreRule {
    /// Normalized pattern text, without the trailing slash.
    pattern: String,
    /// The pattern ended with `/` and may only match directories.
    dir_only: bool,
    /// Compiled matcher for patterns containing glob metacharacters.
    glob: Option<GlobMatcher>,
}

/// An accumulating set of `.gitignore`-style exclusion patterns.
///
/// The scanner hands every directory level its own copy of the set, extended
/// with that directory's `.gitignore`, so patterns from a nested file apply
/// to its subtree but never leak into sibling directories. A candidate is
/// excluded as soon as any rule matches; caller-supplied patterns and
/// patterns read from `.gitignore` files carry equal weight.
#[derive(Debug, Clone, Default)]
pub struct IgnoreRuleSet {
    rules: Vec<IgnoreRule>,
}

impl IgnoreRuleSet {
    /// Creates the baseline rule set for a scan: the built-in `.git`
    /// exclusion plus any caller-supplied patterns. `.gitignore` files are
    /// folded in per directory while descending.
    pub fn baseline(extra_patterns: &[String]) -> Self {
        let mut set = Self::default();
        set.add_pattern(".git");
        for pattern in extra_patterns {
            set.add_pattern(pattern);
        }
        set
    }

    /// Returns a copy of this set extended with the patterns of the given
    /// directory's `.gitignore`, when one exists.
    pub fn with_local_gitignore(&self, dir: &Path) -> Self {
        let mut local = self.clone();
        local.add_gitignore(&dir.join(".gitignore"));
        local
    }

    /// Parses one `.gitignore` file line by line. A missing or unreadable
    /// file contributes nothing.
    fn add_gitignore(&mut self, path: &Path) {
        let Ok(text) = std::fs::read_to_string(path) else {
            return;
        };
        for line in text.lines() {
            self.add_pattern(line);
        }
    }

    /// Adds a single pattern. Blank lines and `#` comments are dropped.
    pub fn add_pattern(&mut self, pattern: &str) {
        let trimmed = pattern.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return;
        }

        let (text, dir_only) = match trimmed.strip_suffix('/') {
            Some(stripped) => (stripped, true),
            None => (trimmed, false),
        };

        let glob = if text.contains(['*', '?', '[']) {
            match Glob::new(text) {
                Ok(glob) => Some(glob.compile_matcher()),
                Err(e) => {
                    tracing::warn!("Skipping unparsable ignore pattern '{}': {}", trimmed, e);
                    return;
                }
            }
        } else {
            None
        };

        self.rules.push(IgnoreRule {
            pattern: text.to_string(),
            dir_only,
            glob,
        });
    }

    /// Tests a directory entry by its base name.
    pub fn matches_name(&self, name: &str, is_dir: bool) -> bool {
        self.matches(name, is_dir)
    }

    /// Tests a directory by its base name and by its path relative to the
    /// scan root, so patterns like `src/generated` take effect at depth.
    pub fn matches_directory(&self, name: &str, relative_path: &Path) -> bool {
        if self.matches(name, true) {
            return true;
        }
        let relative = relative_path.to_string_lossy();
        !relative.is_empty() && self.matches(&relative, true)
    }

    fn matches(&self, candidate: &str, is_dir: bool) -> bool {
        for rule in &self.rules {
            if rule.dir_only && !is_dir {
                continue;
            }
            if rule.pattern == candidate {
                return true;
            }
            // A rule for `p` also covers anything below `p/`.
            if candidate.len() > rule.pattern.len()
                && candidate.starts_with(rule.pattern.as_str())
                && candidate.as_bytes()[rule.pattern.len()] == b'/'
            {
                return true;
            }
            if let Some(glob) = &rule.glob {
                if glob.is_match(candidate) {
                    return true;
                }
            }
        }
        false
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
