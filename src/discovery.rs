//! File discovery module.
//!
//! Finds distillable source files under a root while respecting .gitignore
//! rules, default vendor/build excludes and a per-file size cap.

use crate::dialect::Dialect;
use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use std::fs;
use std::path::{Path, PathBuf};

/// Discovers source files for a set of dialects.
pub struct FileDiscovery {
    dialects: Vec<Dialect>,
    /// Patterns that override excludes
    include_patterns: Vec<String>,
    exclude_patterns: Vec<String>,
    default_excludes: bool,
    include_hidden: bool,
    /// Files larger than this are skipped
    max_file_size: u64,
}

impl Default for FileDiscovery {
    fn default() -> Self {
        Self {
            dialects: Dialect::ALL.to_vec(),
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            default_excludes: true,
            include_hidden: false,
            max_file_size: 2 * 1024 * 1024,
        }
    }
}

impl FileDiscovery {
    /// Discovery over every supported dialect.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict discovery to the given dialects.
    pub fn with_dialects(mut self, dialects: &[Dialect]) -> Self {
        self.dialects = dialects.to_vec();
        self
    }

    pub fn with_include(mut self, pattern: &str) -> Self {
        self.include_patterns.push(pattern.to_string());
        self
    }

    pub fn with_exclude(mut self, pattern: &str) -> Self {
        self.exclude_patterns.push(pattern.to_string());
        self
    }

    pub fn without_default_excludes(mut self) -> Self {
        self.default_excludes = false;
        self
    }

    pub fn include_hidden(mut self) -> Self {
        self.include_hidden = true;
        self
    }

    pub fn with_max_file_size(mut self, max_file_size: u64) -> Self {
        self.max_file_size = max_file_size;
        self
    }

    /// Discover all matching files under `root`, sorted by path.
    pub fn discover(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let default_excludes = if self.default_excludes {
            build_globset(DEFAULT_EXCLUDES.iter().copied())?
        } else {
            GlobSetBuilder::new().build()?
        };
        let user_excludes = build_globset(self.exclude_patterns.iter().map(|s| s.as_str()))?;
        let user_includes = build_globset(self.include_patterns.iter().map(|s| s.as_str()))?;

        let walker = WalkBuilder::new(root)
            .hidden(!self.include_hidden)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .require_git(false)
            .build();

        let mut files = Vec::new();
        for entry in walker.filter_map(|e| e.ok()) {
            let path = entry.path();
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }

            let rel = path.strip_prefix(root).unwrap_or(path);
            if is_excluded(rel, &default_excludes, &user_excludes, &user_includes) {
                continue;
            }

            if self.dialect_of(path).is_some() && self.within_size(path) {
                files.push(path.to_path_buf());
            }
        }

        files.sort();
        tracing::debug!(root = %root.display(), files = files.len(), "Discovered source files");
        Ok(files)
    }

    /// Dialect of `path` if it is one this discovery looks for.
    pub fn dialect_of(&self, path: &Path) -> Option<Dialect> {
        Dialect::from_path(path).filter(|d| self.dialects.contains(d))
    }

    fn within_size(&self, path: &Path) -> bool {
        fs::metadata(path).is_ok_and(|m| m.len() <= self.max_file_size)
    }
}

const DEFAULT_EXCLUDES: &[&str] = &[
    "**/.git/**",
    "**/target/**",
    "**/node_modules/**",
    "**/dist/**",
    "**/build/**",
    "**/out/**",
    "**/coverage/**",
    "**/vendor/**",
    "**/.venv/**",
    "**/venv/**",
    "**/__pycache__/**",
    "**/.tox/**",
    "**/.mypy_cache/**",
    "**/.next/**",
    "**/*.min.js",
    "**/*.d.ts",
];

fn build_globset<'a>(patterns: impl IntoIterator<Item = &'a str>) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {pattern}"))?);
    }
    Ok(builder.build()?)
}

fn is_excluded(path: &Path, default: &GlobSet, user: &GlobSet, include: &GlobSet) -> bool {
    let is_included = include.is_match(path);
    let is_excluded = default.is_match(path) || user.is_match(path);
    is_excluded && !is_included
}
