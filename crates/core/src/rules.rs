//! Rule collaborator interface
//!
//! The watcher knows nothing about how rules are written. It only asks
//! whether a path is ignored, hands over finished batches, and checks
//! afterwards whether the rules were reloaded while the batch ran.

use async_trait::async_trait;
use std::collections::BTreeSet;
use tokio_util::sync::CancellationToken;

/// One dispatched batch of normalized, root-relative paths
pub type PathSet = BTreeSet<String>;

/// Rule collaborator
#[async_trait]
pub trait RuleSet: Send + Sync {
    /// Check if path matches the ignore policy
    fn ignore(&self, path: &str) -> bool;

    /// Deliver a batch to the matching rules
    ///
    /// Errors are reported by the caller and otherwise swallowed.
    async fn on_change(&self, cancel: &CancellationToken, paths: PathSet) -> anyhow::Result<()>;

    /// Whether a reload happened since the last call
    ///
    /// Consume-once: the flag is cleared by reading it.
    fn reloaded(&self) -> bool;

    /// Number of successful reloads so far
    fn generation(&self) -> u64 {
        0
    }
}
