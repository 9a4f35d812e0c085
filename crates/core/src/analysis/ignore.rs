//! Ignore rules for boilerplate-relative paths.
//!
//! A matching file has its resolution strategy forced to `Ignored` and is
//! left out of the "expected conflict" counts.
//!
//! # Pattern forms
//!
//! | Pattern | Matches |
//! |---------|---------|
//! | `config/*` | direct children of `config/` |
//! | `docs/` | everything under `docs/` (same as `docs/**`) |
//! | `**/*.snap` | any `.snap` file at any depth |
//! | `.env*` | a name without `/` matches in any directory |

use tracing::debug;

/// Ordered list of glob patterns; the first match wins.
#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
    patterns: Vec<String>,
}

impl IgnoreRules {
    pub fn new(patterns: Vec<String>) -> Self {
        Self { patterns }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// The first pattern matching `rel_path`, if any.
    pub fn matching_pattern(&self, rel_path: &str) -> Option<&str> {
        let path = rel_path.replace('\\', "/");
        let path = path.trim_start_matches("./");
        let hit = self
            .patterns
            .iter()
            .find(|pattern| matches_pattern(path, pattern))
            .map(String::as_str);
        if let Some(pattern) = hit {
            debug!(path, pattern, "file matches ignore pattern");
        }
        hit
    }

    pub fn is_ignored(&self, rel_path: &str) -> bool {
        self.matching_pattern(rel_path).is_some()
    }
}

impl From<&crate::config::IgnoreConfig> for IgnoreRules {
    fn from(config: &crate::config::IgnoreConfig) -> Self {
        Self::new(config.patterns.clone())
    }
}

fn matches_pattern(path: &str, pattern: &str) -> bool {
    let pat = pattern.trim().replace('\\', "/");
    let pat = pat.trim_start_matches("./");

    // directory-level glob
    if let Some(dir) = pat.strip_suffix('/') {
        return glob_match::glob_match(&format!("{dir}/**"), path);
    }
    if glob_match::glob_match(pat, path) {
        return true;
    }
    // bare names match at any depth
    !pat.contains('/') && glob_match::glob_match(&format!("**/{pat}"), path)
}
