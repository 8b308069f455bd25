//! Warning and notification sink
//!
//! The watcher never prints on its own. Everything a user should see goes
//! through a [`Reporter`], which must be cheap and must never block or panic.

use std::fmt;
use tracing::{error, info, warn};

/// Outcome carried by a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Success,
    Failure,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Success => "success",
            Level::Failure => "failure",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User-visible notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: Level,
    pub title: String,
    pub text: String,
}

impl Notification {
    pub fn success(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            level: Level::Success,
            title: title.into(),
            text: text.into(),
        }
    }

    pub fn failure(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            level: Level::Failure,
            title: title.into(),
            text: text.into(),
        }
    }
}

/// Logging and notification collaborator
pub trait Reporter: Send + Sync {
    /// Report a non-fatal error
    fn warn(&self, err: &dyn fmt::Display);

    /// Deliver a notification
    fn notify(&self, notification: &Notification);
}

/// Reporter backed by `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn warn(&self, err: &dyn fmt::Display) {
        warn!("{}", err);
    }

    fn notify(&self, notification: &Notification) {
        match notification.level {
            Level::Success => info!(title = %notification.title, "{}", notification.text),
            Level::Failure => error!(title = %notification.title, "{}", notification.text),
        }
    }
}
