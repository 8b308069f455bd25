//! Watcher lifecycle and the debounce run loop

use crate::debounce::{DispatchGate, Pending, DEFAULT_SQUASH};
use crate::dispatch::Bridge;
use crate::error::{Result, WatchError};
use crate::event::{self, Op, WatchEvent};
use crate::platform::{NotifyBackend, RawEvent, Subscriber};
use crate::watch_set::WatchSet;
use lull_core::path::{self, ROOT};
use lull_core::{Reporter, RuleSet};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

/// Lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Created,
    Running,
    Closing,
    Closed,
}

/// File system watcher
///
/// Folds raw events into batches and hands each batch to the rule
/// collaborator once the squash duration has passed since the first event
/// of the cycle. The deadline is fixed at the first event; later events in
/// the same cycle do not push it back.
pub struct Watcher {
    root: PathBuf,
    bridge: Bridge,
    pending: Arc<Pending>,
    gate: Arc<DispatchGate>,
    squash: Mutex<Duration>,
    state: Mutex<State>,
    /// Internal stop signal, independent of the caller's token
    quit: CancellationToken,
    /// Held by the run loop while it is running
    events: tokio::sync::Mutex<mpsc::UnboundedReceiver<RawEvent>>,
}

impl Watcher {
    /// Create a watcher for `root`
    ///
    /// Creates the OS watch handle and subscribes every directory under
    /// `root` that the rules do not ignore. Any failure here is returned;
    /// there is no partially constructed watcher.
    pub fn new(
        root: impl AsRef<Path>,
        rules: Arc<dyn RuleSet>,
        reporter: Arc<dyn Reporter>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let (backend, rx) = NotifyBackend::new()?;
        Self::with_subscriber(root, Box::new(backend), rx, rules, reporter, cancel)
    }

    /// Create a watcher over an arbitrary event source
    pub fn with_subscriber(
        root: impl AsRef<Path>,
        subscriber: Box<dyn Subscriber>,
        events: mpsc::UnboundedReceiver<RawEvent>,
        rules: Arc<dyn RuleSet>,
        reporter: Arc<dyn Reporter>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let root = root.as_ref();
        let root = std::fs::canonicalize(root).map_err(|source| WatchError::Io {
            path: root.to_path_buf(),
            source,
        })?;

        let watch_set = Arc::new(WatchSet::new(&root, subscriber));
        watch_set.add(ROOT, &|p: &str| rules.ignore(p), &cancel)?;
        info!("Watching {} ({} directories)", root.display(), watch_set.len());

        Ok(Self {
            root,
            bridge: Bridge {
                rules,
                reporter,
                watch_set,
                cancel,
            },
            pending: Arc::new(Pending::new()),
            gate: Arc::new(DispatchGate::new()),
            squash: Mutex::new(DEFAULT_SQUASH),
            state: Mutex::new(State::Created),
            quit: CancellationToken::new(),
            events: tokio::sync::Mutex::new(events),
        })
    }

    /// Canonical watch root
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn squash(&self) -> Duration {
        *self.squash.lock()
    }

    /// Set the squash duration
    ///
    /// Takes effect from the next call to [`Watcher::watch`].
    pub fn set_squash(&self, squash: Duration) {
        *self.squash.lock() = squash;
    }

    pub fn state(&self) -> State {
        *self.state.lock()
    }

    /// Sorted list of watched directories
    pub fn paths(&self) -> Vec<String> {
        self.bridge.watch_set.paths()
    }

    /// Explicit add, see [`WatchSet::add`]
    pub fn add(&self, rel: &str) -> Result<()> {
        let rules = &self.bridge.rules;
        self.bridge
            .watch_set
            .add(rel, &|p: &str| rules.ignore(p), &self.bridge.cancel)
    }

    /// Explicit remove, see [`WatchSet::remove`]
    pub fn remove(&self, rel: &str) -> Result<()> {
        self.bridge.watch_set.remove(rel)
    }

    /// Explicit update, see [`WatchSet::update`]
    pub fn update(&self, rel: &str) -> Result<()> {
        let rules = &self.bridge.rules;
        self.bridge
            .watch_set
            .update(rel, &|p: &str| rules.ignore(p), &self.bridge.cancel)
    }

    /// Run until closed or cancelled
    ///
    /// Returns `Ok(())` after [`Watcher::close`] and
    /// [`WatchError::Cancelled`] when the caller's token fires.
    pub async fn watch(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if *state != State::Created {
                return Err(WatchError::Closed);
            }
            *state = State::Running;
        }

        let mut events = self.events.lock().await;
        let squash = self.squash();
        let (fire_tx, mut fire_rx) = mpsc::channel::<()>(1);

        let timer = tokio::time::sleep(Duration::ZERO);
        tokio::pin!(timer);
        let mut armed = false;

        debug!("Run loop started (squash {:?})", squash);
        loop {
            tokio::select! {
                biased;

                _ = self.bridge.cancel.cancelled() => {
                    debug!("Run loop cancelled");
                    return Err(WatchError::Cancelled);
                }
                _ = self.quit.cancelled() => {
                    debug!("Run loop stopped");
                    return Ok(());
                }
                raw = events.recv() => match raw {
                    Some(Ok(ev)) => {
                        if ev.need_rescan() {
                            self.bridge.reporter.warn(&"event queue overflowed, rescanning");
                            self.spawn_update(ROOT.to_string());
                        }
                        for ev in event::translate(&ev) {
                            if self.handle(ev) {
                                // new cycle has begun
                                timer.as_mut().reset(Instant::now() + squash);
                                armed = true;
                            }
                        }
                    }
                    Some(Err(e)) => self.bridge.reporter.warn(&e),
                    None => {
                        // backend dropped: the watch-set was closed underneath us
                        return Ok(());
                    }
                },
                _ = &mut timer, if armed => {
                    armed = false;
                    if !self.pending.is_empty() {
                        // a request already queued covers this one
                        let _ = fire_tx.try_send(());
                    }
                }
                Some(()) = fire_rx.recv() => self.fire(&fire_tx),
            }
        }
    }

    /// Fold one event; returns `true` when it started a new cycle
    fn handle(&self, ev: WatchEvent) -> bool {
        let Some(name) = path::relative_to(&self.root, &ev.path) else {
            trace!("Event outside root: {}", ev.path.display());
            return false;
        };

        match ev.op {
            Op::Chmod => return false,
            Op::Create => match std::fs::symlink_metadata(&ev.path) {
                Ok(meta) if meta.is_dir() => {
                    self.spawn_update(name);
                    return false;
                }
                Ok(_) => {}
                // vanished before we could look at it
                Err(_) => return false,
            },
            // the watch-set lock can be held by a walk; never take it here
            Op::Remove | Op::Rename => self.spawn_remove(name.clone()),
            Op::Write => {}
        }

        trace!("{:?} {}", ev.op, name);
        self.pending.fold(&name, ev.op)
    }

    /// Handle a dispatch request
    fn fire(&self, fire_tx: &mpsc::Sender<()>) {
        let Some(permit) = self.gate.try_begin() else {
            trace!("Dispatch in flight, retry recorded");
            return;
        };

        let snapshot = self.pending.take();
        let bridge = self.bridge.clone();
        let gate = Arc::clone(&self.gate);
        let fire_tx = fire_tx.clone();

        tokio::spawn(async move {
            bridge.deliver(snapshot).await;
            if gate.finish(permit) {
                // changes accumulated during the dispatch
                let _ = fire_tx.try_send(());
            }
        });
    }

    fn spawn_update(&self, rel: String) {
        let bridge = self.bridge.clone();
        tokio::spawn(async move { bridge.resync(&rel).await });
    }

    fn spawn_remove(&self, rel: String) {
        let watch_set = Arc::clone(&self.bridge.watch_set);
        let reporter = Arc::clone(&self.bridge.reporter);
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || {
            // untracked paths (plain files) are a no-op
            if let Err(e) = watch_set.remove(&rel) {
                // the kernel drops watches on deleted directories by itself
                if !matches!(e, WatchError::Closed) && root.join(&rel).exists() {
                    reporter.warn(&e);
                } else {
                    debug!("Unwatch of vanished {} failed: {}", rel, e);
                }
            }
        });
    }

    /// Stop the watcher and release the OS handle
    ///
    /// Waits for the run loop and any in-flight dispatch. Idempotent.
    pub async fn close(&self) {
        {
            let mut state = self.state.lock();
            match *state {
                State::Closing | State::Closed => return,
                _ => *state = State::Closing,
            }
        }

        self.quit.cancel();
        // the run loop holds this lock until it returns
        drop(self.events.lock().await);
        self.gate.shutdown().await;
        self.bridge.watch_set.close();

        *self.state.lock() = State::Closed;
        debug!("Watcher closed");
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        if !matches!(*self.state.get_mut(), State::Closed) {
            self.quit.cancel();
            self.bridge.watch_set.close();
            debug!("Watcher dropped without close()");
        }
    }
}
