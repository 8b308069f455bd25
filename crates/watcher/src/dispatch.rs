//! Dispatch bridge
//!
//! Hands a finished batch to the rule collaborator and resynchronizes the
//! watch-set when the rules were reloaded in the meantime.

use crate::error::WatchError;
use crate::watch_set::WatchSet;
use lull_core::path::ROOT;
use lull_core::{PathSet, Reporter, RuleSet};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Everything a dispatch needs, shared with the run loop
#[derive(Clone)]
pub struct Bridge {
    pub rules: Arc<dyn RuleSet>,
    pub reporter: Arc<dyn Reporter>,
    pub watch_set: Arc<WatchSet>,
    pub cancel: CancellationToken,
}

impl Bridge {
    /// Deliver one snapshot
    ///
    /// Rule errors are reported and swallowed. Returns `true` when the
    /// watch-set was resynchronized.
    pub async fn deliver(&self, snapshot: HashMap<String, u32>) -> bool {
        if snapshot.is_empty() {
            return false;
        }

        let generation = self.rules.generation();
        let paths: PathSet = snapshot.into_keys().collect();
        debug!("Dispatching {} changed path(s)", paths.len());

        if let Err(e) = self.rules.on_change(&self.cancel, paths).await {
            self.reporter.warn(&e);
        }

        // consume the flag even when the generation already tells us
        let reloaded = self.rules.reloaded();
        if !reloaded && self.rules.generation() == generation {
            return false;
        }

        info!("Rules reloaded, resynchronizing watched directories");
        self.resync(ROOT).await;
        true
    }

    /// Run `update(rel)` off the async runtime, reporting failures
    pub async fn resync(&self, rel: &str) {
        let bridge = self.clone();
        let rel = rel.to_string();
        let res = tokio::task::spawn_blocking(move || {
            let rules = Arc::clone(&bridge.rules);
            bridge
                .watch_set
                .update(&rel, &|p: &str| rules.ignore(p), &bridge.cancel)
        })
        .await;

        match res {
            Ok(Ok(())) => {}
            // cancelled or closed while walking: shutdown is under way
            Ok(Err(e)) if e.is_cancelled() || matches!(e, WatchError::Closed) => {
                debug!("Resync interrupted: {}", e)
            }
            Ok(Err(e)) => self.reporter.warn(&e),
            Err(e) => self.reporter.warn(&WatchError::from(e)),
        }
    }
}
