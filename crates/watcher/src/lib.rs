//! File system watching for lull
//!
//! This crate provides the event aggregation and debounce engine:
//! - A watch-set of per-directory OS subscriptions, pruned by the ignore policy
//! - Folding of raw events into one entry per path
//! - Fixed-deadline debouncing (727ms by default)
//! - At most one dispatch in flight, with no lost requests
//! - Watch-set resync after rule reloads and backend overflows

pub mod debounce;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod platform;
pub mod watch_set;
mod watcher;

pub use debounce::DEFAULT_SQUASH;
pub use error::{Result, WatchError};
pub use event::{Op, WatchEvent};
pub use watch_set::WatchSet;
pub use watcher::{State, Watcher};
