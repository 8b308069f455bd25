//! Translation of backend events into `(path, op)` pairs

use notify::event::{EventKind, ModifyKind, RenameMode};
use std::path::PathBuf;

/// File system operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// Path appeared (file or directory)
    Create,
    /// File content changed
    Write,
    /// Path deleted
    Remove,
    /// Path moved away (the new name arrives as `Create`)
    Rename,
    /// Metadata only
    Chmod,
}

/// File system event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    /// Path that changed
    pub path: PathBuf,
    /// Type of change
    pub op: Op,
}

impl WatchEvent {
    pub fn new(path: impl Into<PathBuf>, op: Op) -> Self {
        Self {
            path: path.into(),
            op,
        }
    }
}

/// Flatten a backend event into watch events
///
/// Access events carry no change and are dropped. A rename that the
/// backend reports as one event with both paths is expected to have been
/// reported as separate `From`/`To` halves as well, so the combined form
/// is skipped. Renames of unknown direction are resolved by checking
/// whether the path still exists.
pub fn translate(event: &notify::Event) -> Vec<WatchEvent> {
    let op = match event.kind {
        EventKind::Create(_) => Op::Create,
        EventKind::Remove(_) => Op::Remove,
        EventKind::Modify(ModifyKind::Metadata(_)) => Op::Chmod,
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Op::Rename,
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Op::Create,
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => return Vec::new(),
        EventKind::Modify(ModifyKind::Name(_)) => {
            return event
                .paths
                .iter()
                .map(|path| {
                    let op = if path.symlink_metadata().is_ok() {
                        Op::Create
                    } else {
                        Op::Rename
                    };
                    WatchEvent::new(path.clone(), op)
                })
                .collect();
        }
        EventKind::Modify(_) | EventKind::Any | EventKind::Other => Op::Write,
        EventKind::Access(_) => return Vec::new(),
    };

    event
        .paths
        .iter()
        .map(|path| WatchEvent::new(path.clone(), op))
        .collect()
}
