use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

/// Ordered glob-like patterns applied during the index walk.
///
/// A path matching any rule never enters the index — excluded subtrees
/// are pruned before descent, not filtered after the fact. Two pattern
/// shapes are supported, matching how exclusion lists are written in
/// practice:
///
/// - a bare name without `/` or glob metacharacters (`node_modules`,
///   `.git`) excludes any path containing that component;
/// - anything else is compiled as a glob against the root-relative
///   path (`target/**`, `*.pyc`).
#[derive(Debug, Clone)]
pub struct ExclusionRuleset {
    patterns: Vec<String>,
    components: Vec<String>,
    globs: GlobSet,
}

const DEFAULT_EXCLUDES: &[&str] = &[
    // VCS internals
    ".git",
    ".hg",
    ".svn",
    // dependency / vendor trees
    "node_modules",
    "vendor",
    "third_party",
    "third-party",
    ".venv",
    "venv",
    "env",
    // build artifacts and caches
    "target",
    "build",
    "dist",
    "__pycache__",
    ".pytest_cache",
    ".cache",
    ".next",
    ".turbo",
    "coverage",
    "*.pyc",
];

impl ExclusionRuleset {
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns: Vec<String> = patterns.into_iter().map(Into::into).collect();
        let mut components = Vec::new();
        let mut builder = GlobSetBuilder::new();
        for pattern in &patterns {
            let trimmed = pattern.trim().trim_matches('/');
            if trimmed.is_empty() {
                continue;
            }
            if !trimmed.contains('/') && !trimmed.contains(['*', '?', '[']) {
                components.push(trimmed.to_string());
            } else {
                let glob = Glob::new(trimmed)
                    .with_context(|| format!("invalid exclusion pattern '{trimmed}'"))?;
                builder.add(glob);
            }
        }
        let globs = builder.build().context("failed to compile exclusion set")?;
        Ok(Self {
            patterns,
            components,
            globs,
        })
    }

    /// The default ruleset: VCS internals, dependency/vendor directories
    /// and build artifacts.
    pub fn standard() -> Self {
        Self::new(DEFAULT_EXCLUDES.iter().copied())
            .unwrap_or_else(|_| unreachable!("builtin exclusion patterns are valid"))
    }

    /// An empty ruleset that excludes nothing.
    pub fn permissive() -> Self {
        Self::new(std::iter::empty::<String>())
            .unwrap_or_else(|_| unreachable!("empty exclusion set is valid"))
    }

    /// Test a root-relative path (`/`-separated). Works for files and
    /// directories alike, so the walker can prune whole subtrees.
    pub fn is_excluded(&self, rel_path: &str) -> bool {
        let rel_path = rel_path.trim_matches('/');
        if rel_path.is_empty() {
            return false;
        }
        if rel_path
            .split('/')
            .any(|component| self.components.iter().any(|c| c == component))
        {
            return true;
        }
        self.globs.is_match(rel_path)
            || rel_path
                .rsplit_once('/')
                .is_some_and(|(_, name)| self.globs.is_match(name))
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

impl Default for ExclusionRuleset {
    fn default() -> Self {
        Self::standard()
    }
}
