//! Rule file format
//!
//! ```toml
//! ignore = ['^build$']
//!
//! [[watch]]
//! pattern = '\.rs$'
//! command = ["cargo", "test"]
//! ```

use anyhow::{Context, Result};
use lull_core::IgnoreConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default rule file name, looked up in the watch root
pub const DEFAULT_RULE_FILE: &str = "lull.toml";

/// Parsed rule file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    #[serde(flatten)]
    pub ignore: IgnoreConfig,

    /// Watch rules, evaluated in file order
    #[serde(default)]
    pub watch: Vec<WatchConfig>,
}

/// Single `[[watch]]` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Regex over root-relative paths
    pub pattern: String,

    /// Program and arguments; empty means log only
    #[serde(default)]
    pub command: Vec<String>,

    /// Append the matched paths to the arguments
    #[serde(default)]
    pub append_files: bool,

    /// Notification title (default: the pattern)
    #[serde(default)]
    pub title: Option<String>,
}

impl RuleConfig {
    /// Parse rule file contents
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse rule file")
    }

    /// Read and parse a rule file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid rule file {}", path.display()))
    }
}
