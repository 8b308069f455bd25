//! Watch-set manager
//!
//! Tracks the directories that currently hold an OS subscription. Keys are
//! root-relative, `/`-separated paths; the root itself is `.`.
//!
//! A key is present iff its subscription is active and the directory is
//! not covered by the ignore policy. Ignored directories truncate every
//! walk, so nothing below them is ever subscribed.

use crate::error::{Result, WatchError};
use crate::platform::Subscriber;
use lull_core::path::{self, ROOT};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use walkdir::WalkDir;

/// Per-directory result of a walk step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    /// Keep walking into this directory
    Descend,
    /// Skip everything below this directory
    Skip,
}

struct Inner {
    paths: BTreeSet<String>,
    /// `None` once closed
    subscriber: Option<Box<dyn Subscriber>>,
}

/// Set of subscribed directories
pub struct WatchSet {
    root: PathBuf,
    inner: Mutex<Inner>,
}

impl WatchSet {
    /// Create an empty watch-set for `root`
    pub fn new(root: impl Into<PathBuf>, subscriber: Box<dyn Subscriber>) -> Self {
        Self {
            root: root.into(),
            inner: Mutex::new(Inner {
                paths: BTreeSet::new(),
                subscriber: Some(subscriber),
            }),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Subscribe every non-ignored directory under `rel`
    pub fn add(
        &self,
        rel: &str,
        ignore: &dyn Fn(&str) -> bool,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        let Inner { paths, subscriber } = &mut *inner;
        let subscriber = subscriber.as_deref_mut().ok_or(WatchError::Closed)?;

        walk_dirs(&self.root, rel, cancel, |key, abs| {
            if key != ROOT && ignore(key) {
                trace!("Skipping ignored directory {}", key);
                return Ok(Visit::Skip);
            }
            if !paths.contains(key) {
                subscriber.subscribe(abs)?;
                paths.insert(key.to_string());
                debug!("Watching {}", key);
            }
            Ok(Visit::Descend)
        })
    }

    /// Unsubscribe `rel` and every tracked directory beneath it
    ///
    /// Every matching key is dropped from the set even if its unsubscribe
    /// call fails; the first failure is returned.
    pub fn remove(&self, rel: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        let Inner { paths, subscriber } = &mut *inner;
        let subscriber = subscriber.as_deref_mut().ok_or(WatchError::Closed)?;

        remove_tree(&self.root, paths, subscriber, rel)
    }

    /// Re-evaluate the ignore policy for every directory under `rel`
    ///
    /// Ignored directories are removed together with their tracked
    /// descendants; everything else is added.
    pub fn update(
        &self,
        rel: &str,
        ignore: &dyn Fn(&str) -> bool,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        let Inner { paths, subscriber } = &mut *inner;
        let subscriber = subscriber.as_deref_mut().ok_or(WatchError::Closed)?;

        walk_dirs(&self.root, rel, cancel, |key, abs| {
            if key != ROOT && ignore(key) {
                remove_tree(&self.root, &mut *paths, &mut *subscriber, key)?;
                return Ok(Visit::Skip);
            }
            if !paths.contains(key) {
                subscriber.subscribe(abs)?;
                paths.insert(key.to_string());
                debug!("Watching {}", key);
            }
            Ok(Visit::Descend)
        })
    }

    /// Whether `rel` is currently subscribed
    pub fn is_watched(&self, rel: &str) -> bool {
        self.inner.lock().paths.contains(rel)
    }

    /// Sorted snapshot of the subscribed directories
    pub fn paths(&self) -> Vec<String> {
        self.inner.lock().paths.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().paths.is_empty()
    }

    /// Drop every subscription and release the OS handle
    ///
    /// Waits for any walk in progress. Idempotent.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.paths.clear();
        // dropping the backend releases the OS handle
        inner.subscriber = None;
    }
}

fn remove_tree(
    root: &Path,
    paths: &mut BTreeSet<String>,
    subscriber: &mut dyn Subscriber,
    rel: &str,
) -> Result<()> {
    let doomed: Vec<String> = paths
        .iter()
        .filter(|key| path::is_within(rel, key))
        .cloned()
        .collect();

    let mut first_err = None;
    for key in doomed {
        paths.remove(&key);
        debug!("Unwatching {}", key);
        if let Err(e) = subscriber.unsubscribe(&absolute(root, &key)) {
            first_err.get_or_insert(e);
        }
    }

    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Depth-first walk over the directories under `root/rel`
///
/// `visit` receives each directory's key and absolute path and decides
/// whether to descend; returning an error aborts the walk. Cancellation is
/// checked before every directory. Directories that vanish mid-walk are
/// skipped, but a missing start directory is an error.
pub fn walk_dirs<F>(root: &Path, rel: &str, cancel: &CancellationToken, mut visit: F) -> Result<()>
where
    F: FnMut(&str, &Path) -> Result<Visit>,
{
    let start = absolute(root, rel);
    let mut it = WalkDir::new(&start).follow_links(false).into_iter();

    while let Some(entry) = it.next() {
        if cancel.is_cancelled() {
            return Err(WatchError::Cancelled);
        }

        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() > 0 && is_not_found(&e) => {
                trace!("Directory vanished during walk: {:?}", e.path());
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        if !entry.file_type().is_dir() {
            continue;
        }

        let key = path::relative_to(root, entry.path()).unwrap_or_else(|| rel.to_string());
        if visit(&key, entry.path())? == Visit::Skip {
            it.skip_current_dir();
        }
    }

    Ok(())
}

fn absolute(root: &Path, key: &str) -> PathBuf {
    if key == ROOT {
        root.to_path_buf()
    } else {
        root.join(key)
    }
}

fn is_not_found(err: &walkdir::Error) -> bool {
    err.io_error()
        .is_some_and(|e| e.kind() == io::ErrorKind::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Records subscriptions instead of touching the OS
    #[derive(Clone, Default)]
    struct Recorder {
        log: Arc<Mutex<Vec<(bool, PathBuf)>>>,
        fail_on: Option<PathBuf>,
    }

    impl Subscriber for Recorder {
        fn subscribe(&mut self, path: &Path) -> Result<()> {
            if self.fail_on.as_deref() == Some(path) {
                return Err(WatchError::Io {
                    path: path.to_path_buf(),
                    source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
                });
            }
            self.log.lock().push((true, path.to_path_buf()));
            Ok(())
        }

        fn unsubscribe(&mut self, path: &Path) -> Result<()> {
            self.log.lock().push((false, path.to_path_buf()));
            Ok(())
        }
    }

    fn tree() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        for dir in ["src/bin", "build/html/_static", ".git/objects", "docs", "buildx"] {
            fs::create_dir_all(temp_dir.path().join(dir)).unwrap();
        }
        fs::write(temp_dir.path().join("src/main.rs"), b"").unwrap();
        temp_dir
    }

    fn vcs(path: &str) -> bool {
        path.split('/').any(|s| s == ".git")
    }

    fn vcs_or_build(path: &str) -> bool {
        vcs(path) || path == "build"
    }

    #[test]
    fn test_add_walks_and_skips_ignored() {
        let temp_dir = tree();
        let recorder = Recorder::default();
        let ws = WatchSet::new(temp_dir.path(), Box::new(recorder.clone()));

        ws.add(".", &vcs_or_build, &CancellationToken::new()).unwrap();

        assert_eq!(ws.paths(), vec![".", "buildx", "docs", "src", "src/bin"]);
        let log = recorder.log.lock();
        assert!(log.iter().all(|(sub, _)| *sub));
        assert!(!log.iter().any(|(_, p)| p.starts_with(temp_dir.path().join("build"))));
    }

    #[test]
    fn test_add_is_idempotent() {
        let temp_dir = tree();
        let recorder = Recorder::default();
        let ws = WatchSet::new(temp_dir.path(), Box::new(recorder.clone()));
        let cancel = CancellationToken::new();

        ws.add(".", &vcs, &cancel).unwrap();
        let first = recorder.log.lock().len();
        ws.add(".", &vcs, &cancel).unwrap();

        assert_eq!(recorder.log.lock().len(), first);
    }

    #[test]
    fn test_remove_respects_separator_boundary() {
        let temp_dir = tree();
        let ws = WatchSet::new(temp_dir.path(), Box::new(Recorder::default()));
        ws.add(".", &vcs, &CancellationToken::new()).unwrap();
        assert!(ws.is_watched("build/html/_static"));

        ws.remove("build").unwrap();

        assert!(!ws.is_watched("build"));
        assert!(!ws.is_watched("build/html"));
        assert!(!ws.is_watched("build/html/_static"));
        assert!(ws.is_watched("buildx"));
    }

    #[test]
    fn test_update_prunes_newly_ignored() {
        let temp_dir = tree();
        let ws = WatchSet::new(temp_dir.path(), Box::new(Recorder::default()));
        let cancel = CancellationToken::new();
        ws.add(".", &vcs, &cancel).unwrap();
        assert!(ws.is_watched("build/html"));

        ws.update(".", &vcs_or_build, &cancel).unwrap();

        assert_eq!(ws.paths(), vec![".", "buildx", "docs", "src", "src/bin"]);

        // and back again once the rule is gone
        ws.update(".", &vcs, &cancel).unwrap();
        assert!(ws.is_watched("build/html/_static"));
    }

    #[test]
    fn test_cancelled_walk_aborts() {
        let temp_dir = tree();
        let ws = WatchSet::new(temp_dir.path(), Box::new(Recorder::default()));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = ws.add(".", &vcs, &cancel).unwrap_err();
        assert!(err.is_cancelled());
        assert!(ws.is_empty());
    }

    #[test]
    fn test_subscribe_failure_propagates() {
        let temp_dir = tree();
        let recorder = Recorder {
            fail_on: Some(temp_dir.path().join("docs")),
            ..Recorder::default()
        };
        let ws = WatchSet::new(temp_dir.path(), Box::new(recorder));

        let err = ws.add(".", &vcs, &CancellationToken::new()).unwrap_err();
        assert!(matches!(err, WatchError::Io { .. }));
        assert!(!ws.is_watched("docs"));
    }

    #[test]
    fn test_missing_start_is_an_error() {
        let temp_dir = tree();
        let ws = WatchSet::new(temp_dir.path(), Box::new(Recorder::default()));

        let err = ws.add("nope", &vcs, &CancellationToken::new()).unwrap_err();
        assert!(matches!(err, WatchError::Walk(_)));
    }

    #[test]
    fn test_closed_set_rejects_changes() {
        let temp_dir = tree();
        let ws = WatchSet::new(temp_dir.path(), Box::new(Recorder::default()));
        ws.add(".", &vcs, &CancellationToken::new()).unwrap();

        ws.close();
        ws.close();

        assert!(ws.is_empty());
        assert!(matches!(ws.remove("src"), Err(WatchError::Closed)));
        assert!(matches!(
            ws.add(".", &vcs, &CancellationToken::new()),
            Err(WatchError::Closed)
        ));
    }
}
