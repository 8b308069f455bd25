//! Core primitives shared by the lull crates
//!
//! This crate provides:
//! - Path normalization (root-relative, `/`-separated keys)
//! - The ignore policy (VCS defaults, regexes, gitignore globs)
//! - Collaborator traits for rule dispatch and reporting

pub mod ignore;
pub mod path;
pub mod report;
pub mod rules;

// Re-exports
pub use self::ignore::{IgnoreConfig, IgnoreError, IgnorePolicy};
pub use report::{Level, Notification, Reporter, TracingReporter};
pub use rules::{PathSet, RuleSet};
