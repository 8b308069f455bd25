//! Ignore policy for the watch-set and change batches
//!
//! A path is ignored when any predicate matches it:
//! 1. Built-in version-control directory names (whole path segments)
//! 2. Regular expressions from the rule file
//! 3. `.gitignore` globs from the watch root (optional)
//!
//! The policy is immutable once built. Reloading means building a new
//! policy and swapping it in, so a failed reload never leaves a half-built
//! policy behind.

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Version-control directory names ignored by default
pub const DEFAULT_IGNORE: &[&str] = &[".git", ".hg", ".svn", ".bzr", "CVS"];

/// Errors raised while building an [`IgnorePolicy`]
#[derive(Debug, Error)]
pub enum IgnoreError {
    #[error("invalid ignore pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("failed to load {}: {source}", path.display())]
    Gitignore {
        path: PathBuf,
        #[source]
        source: ignore::Error,
    },
}

/// Ignore configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoreConfig {
    /// Keep the built-in VCS patterns (default: true)
    #[serde(default = "default_true")]
    pub default_ignore: bool,

    /// Use `<root>/.gitignore` patterns (default: false)
    #[serde(default)]
    pub gitignore: bool,

    /// Regular expressions matched against root-relative paths
    #[serde(default)]
    pub ignore: Vec<String>,
}

impl Default for IgnoreConfig {
    fn default() -> Self {
        Self {
            default_ignore: true,
            gitignore: false,
            ignore: vec![],
        }
    }
}

fn default_true() -> bool {
    true
}

/// Single ignore predicate
#[derive(Debug)]
enum Predicate {
    /// Any path segment equal to one of the names
    Segment(&'static [&'static str]),
    /// Regex tested against the whole normalized path
    Regex(Regex),
    /// Gitignore rules rooted at the watch root
    Gitignore(Gitignore),
}

impl Predicate {
    fn is_match(&self, root: &Path, path: &str) -> bool {
        match self {
            Predicate::Segment(names) => path
                .split(['/', std::path::MAIN_SEPARATOR])
                .any(|segment| names.contains(&segment)),
            Predicate::Regex(re) => re.is_match(path),
            Predicate::Gitignore(gi) => {
                let is_dir = root.join(path).is_dir();
                gi.matched_path_or_any_parents(path, is_dir).is_ignore()
            }
        }
    }
}

/// Union of path predicates
///
/// Paths are root-relative and `/`-separated (see [`crate::path::normalize`]).
#[derive(Debug)]
pub struct IgnorePolicy {
    root: PathBuf,
    predicates: Vec<Predicate>,
}

impl IgnorePolicy {
    /// Build a policy for the given watch root
    pub fn build(root: &Path, config: &IgnoreConfig) -> Result<Self, IgnoreError> {
        let mut predicates = Vec::new();

        if config.default_ignore {
            predicates.push(Predicate::Segment(DEFAULT_IGNORE));
        }

        for pattern in &config.ignore {
            let re = Regex::new(pattern).map_err(|source| IgnoreError::Pattern {
                pattern: pattern.clone(),
                source,
            })?;
            predicates.push(Predicate::Regex(re));
        }

        if config.gitignore {
            let path = root.join(".gitignore");
            if path.is_file() {
                let mut builder = GitignoreBuilder::new(root);
                if let Some(source) = builder.add(&path) {
                    return Err(IgnoreError::Gitignore { path, source });
                }
                let gi = builder
                    .build()
                    .map_err(|source| IgnoreError::Gitignore { path, source })?;
                predicates.push(Predicate::Gitignore(gi));
            }
        }

        Ok(Self {
            root: root.to_path_buf(),
            predicates,
        })
    }

    /// Policy holding only the built-in VCS patterns
    pub fn with_defaults(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            predicates: vec![Predicate::Segment(DEFAULT_IGNORE)],
        }
    }

    /// Check if path should be ignored
    pub fn is_match(&self, path: &str) -> bool {
        self.predicates.iter().any(|p| p.is_match(&self.root, path))
    }

    /// Number of active predicates
    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }
}
