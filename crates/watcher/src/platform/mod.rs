//! OS-level subscriptions
//!
//! The watch-set only needs to subscribe and unsubscribe single
//! directories. [`NotifyBackend`] does that with the platform's
//! recommended `notify` watcher in non-recursive mode, so every watched
//! directory is an explicit entry in the watch-set.

use crate::error::{Result, WatchError};
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher as _};
use std::path::Path;
use tokio::sync::mpsc;

/// Raw notification as delivered by the backend
pub type RawEvent = notify::Result<notify::Event>;

/// Subscribe/unsubscribe single directories
pub trait Subscriber: Send {
    fn subscribe(&mut self, path: &Path) -> Result<()>;
    fn unsubscribe(&mut self, path: &Path) -> Result<()>;
}

/// Subscriber backed by the `notify` crate
pub struct NotifyBackend {
    inner: RecommendedWatcher,
}

impl NotifyBackend {
    /// Create the OS watch handle
    ///
    /// Raw events are forwarded to the returned receiver. The channel is
    /// unbounded because the notify callback runs on a backend thread that
    /// must never block.
    pub fn new() -> Result<(Self, mpsc::UnboundedReceiver<RawEvent>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = RecommendedWatcher::new(
            move |res: RawEvent| {
                // receiver gone means the watcher is shutting down
                let _ = tx.send(res);
            },
            Config::default(),
        )
        .map_err(WatchError::Backend)?;

        Ok((Self { inner }, rx))
    }
}

impl Subscriber for NotifyBackend {
    fn subscribe(&mut self, path: &Path) -> Result<()> {
        self.inner
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|source| WatchError::Notify {
                path: path.to_path_buf(),
                source,
            })
    }

    fn unsubscribe(&mut self, path: &Path) -> Result<()> {
        self.inner.unwatch(path).map_err(|source| WatchError::Notify {
            path: path.to_path_buf(),
            source,
        })
    }
}
