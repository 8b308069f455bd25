//! Rule file support for lull
//!
//! Loads `lull.toml`, matches debounced batches against its watch rules,
//! runs their commands, and reloads itself when the file changes.

pub mod config;
pub mod rule;
mod rulefile;

pub use config::{RuleConfig, WatchConfig, DEFAULT_RULE_FILE};
pub use rule::WatchRule;
pub use rulefile::{RuleFile, RELOAD_FAILED, RELOAD_TITLE};
