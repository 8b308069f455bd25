//! Common utilities for watcher integration tests

use async_trait::async_trait;
use lull_core::{Notification, PathSet, Reporter, RuleSet};
use lull_watcher::platform::{RawEvent, Subscriber};
use lull_watcher::Watcher;
use notify::event::{CreateKind, DataChange, MetadataKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind};
use parking_lot::Mutex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Subscriber that accepts everything and delivers nothing
pub struct NullSubscriber;

impl Subscriber for NullSubscriber {
    fn subscribe(&mut self, _: &Path) -> lull_watcher::Result<()> {
        Ok(())
    }

    fn unsubscribe(&mut self, _: &Path) -> lull_watcher::Result<()> {
        Ok(())
    }
}

/// Subscriber that stalls on one directory name
pub struct SlowSubscriber {
    pub name: &'static str,
    pub delay: Duration,
}

impl Subscriber for SlowSubscriber {
    fn subscribe(&mut self, path: &Path) -> lull_watcher::Result<()> {
        if path.file_name().is_some_and(|n| n == self.name) {
            std::thread::sleep(self.delay);
        }
        Ok(())
    }

    fn unsubscribe(&mut self, _: &Path) -> lull_watcher::Result<()> {
        Ok(())
    }
}

/// Rule set that records every batch
#[derive(Default)]
pub struct Recorder {
    pub batches: Mutex<Vec<PathSet>>,
    /// Time spent inside each dispatch
    pub delay: Duration,
    running: AtomicUsize,
    pub max_running: AtomicUsize,
    pub completed: AtomicUsize,
}

impl Recorder {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn batches(&self) -> Vec<PathSet> {
        self.batches.lock().clone()
    }
}

#[async_trait]
impl RuleSet for Recorder {
    fn ignore(&self, _: &str) -> bool {
        false
    }

    async fn on_change(&self, _: &CancellationToken, paths: PathSet) -> anyhow::Result<()> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);

        self.batches.lock().push(paths);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.running.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn reloaded(&self) -> bool {
        false
    }
}

/// Reporter that keeps warnings
#[derive(Default)]
pub struct Collect {
    pub warnings: Mutex<Vec<String>>,
}

impl Reporter for Collect {
    fn warn(&self, err: &dyn fmt::Display) {
        self.warnings.lock().push(err.to_string());
    }

    fn notify(&self, _: &Notification) {}
}

/// Watcher fed by hand instead of by the OS
pub struct Harness {
    pub temp_dir: TempDir,
    pub root: PathBuf,
    pub rules: Arc<Recorder>,
    pub reporter: Arc<Collect>,
    pub cancel: CancellationToken,
    pub watcher: Arc<Watcher>,
    tx: mpsc::UnboundedSender<RawEvent>,
}

impl Harness {
    pub fn new(rules: Recorder, squash: Duration) -> Self {
        Self::with_subscriber(rules, squash, Box::new(NullSubscriber))
    }

    pub fn with_subscriber(rules: Recorder, squash: Duration, subscriber: Box<dyn Subscriber>) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let root = std::fs::canonicalize(temp_dir.path()).unwrap();
        let rules = Arc::new(rules);
        let reporter = Arc::new(Collect::default());
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::unbounded_channel();

        let watcher = Watcher::with_subscriber(
            &root,
            subscriber,
            rx,
            rules.clone(),
            reporter.clone(),
            cancel.clone(),
        )
        .unwrap();
        watcher.set_squash(squash);

        Self {
            temp_dir,
            root,
            rules,
            reporter,
            cancel,
            watcher: Arc::new(watcher),
            tx,
        }
    }

    /// Start the run loop in the background
    pub fn start(&self) -> tokio::task::JoinHandle<lull_watcher::Result<()>> {
        let watcher = Arc::clone(&self.watcher);
        tokio::spawn(async move { watcher.watch().await })
    }

    pub fn send(&self, kind: EventKind, rel: &str) {
        let event = Event::new(kind).add_path(self.root.join(rel));
        self.tx.send(Ok(event)).unwrap();
    }

    pub fn write(&self, rel: &str) {
        self.send(EventKind::Modify(ModifyKind::Data(DataChange::Content)), rel);
    }

    /// Create the file on disk, then report it
    pub fn create(&self, rel: &str) {
        std::fs::write(self.root.join(rel), b"x").unwrap();
        self.send(EventKind::Create(CreateKind::File), rel);
    }

    pub fn remove(&self, rel: &str) {
        self.send(EventKind::Remove(RemoveKind::File), rel);
    }

    pub fn rename_from(&self, rel: &str) {
        self.send(EventKind::Modify(ModifyKind::Name(RenameMode::From)), rel);
    }

    pub fn chmod(&self, rel: &str) {
        self.send(EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)), rel);
    }

    pub fn send_raw(&self, event: RawEvent) {
        self.tx.send(event).unwrap();
    }
}

pub fn set(paths: &[&str]) -> PathSet {
    paths.iter().map(|p| p.to_string()).collect()
}
