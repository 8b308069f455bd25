//! Watcher error type

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the watch-set and the watcher lifecycle
#[derive(Debug, Error)]
pub enum WatchError {
    /// OS-level subscribe/unsubscribe failed
    #[error("failed to watch {}: {source}", path.display())]
    Notify {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    /// Creating the OS watch handle failed
    #[error("failed to create watcher: {0}")]
    Backend(#[source] notify::Error),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to walk directory tree: {0}")]
    Walk(#[from] walkdir::Error),

    /// The surrounding cancellation token fired
    #[error("watch cancelled")]
    Cancelled,

    /// The watcher (or its watch-set) has been closed
    #[error("watcher closed")]
    Closed,

    /// A background task panicked or was aborted
    #[error("background task failed: {0}")]
    Runtime(#[from] tokio::task::JoinError),
}

impl WatchError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, WatchError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, WatchError>;
