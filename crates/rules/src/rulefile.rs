//! Rule set backed by a TOML rule file
//!
//! The rule file lives inside the watch root and is watched like any other
//! file. When it shows up in a batch, the set reloads itself before the
//! batch is matched. A reload either replaces the rules and the ignore
//! policy together or leaves both untouched.

use crate::config::RuleConfig;
use crate::rule::WatchRule;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use lull_core::path;
use lull_core::{IgnorePolicy, Notification, PathSet, Reporter, RuleSet};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Title used for reload notifications
pub const RELOAD_TITLE: &str = "lull reload";

/// Prefix of the warning emitted when a reload fails
pub const RELOAD_FAILED: &str = "failed to reload";

/// Everything that changes on reload
#[derive(Debug)]
struct Compiled {
    rules: Vec<WatchRule>,
    ignore: IgnorePolicy,
}

impl Compiled {
    fn load(root: &Path, file: &Path) -> Result<Self> {
        let config = RuleConfig::load(file)?;

        let ignore = IgnorePolicy::build(root, &config.ignore)
            .with_context(|| format!("Invalid ignore list in {}", file.display()))?;
        let rules = config
            .watch
            .iter()
            .map(WatchRule::compile)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { rules, ignore })
    }
}

/// Rule set loaded from a rule file
pub struct RuleFile {
    root: PathBuf,
    file: PathBuf,
    /// Root-relative name of the rule file, if it lives under the root
    name: Option<String>,
    reporter: Arc<dyn Reporter>,
    compiled: RwLock<Arc<Compiled>>,
    generation: AtomicU64,
    reloaded: AtomicBool,
}

impl RuleFile {
    /// Load the rule file
    ///
    /// `file` may be relative to `root`. A missing or invalid file is an
    /// error here; later reload failures only roll back.
    pub fn load(root: &Path, file: &Path, reporter: Arc<dyn Reporter>) -> Result<Self> {
        let root = std::fs::canonicalize(root)
            .with_context(|| format!("Failed to resolve {}", root.display()))?;
        let joined = root.join(file);
        let file = std::fs::canonicalize(&joined)
            .with_context(|| format!("Failed to read {}", joined.display()))?;

        let compiled = Compiled::load(&root, &file)?;
        let name = path::relative_to(&root, &file);
        if name.is_none() {
            info!(
                "{} is outside {}, it will not be reloaded on change",
                file.display(),
                root.display()
            );
        }
        info!("Loaded {} watch rule(s) from {}", compiled.rules.len(), file.display());

        Ok(Self {
            root,
            file,
            name,
            reporter,
            compiled: RwLock::new(Arc::new(compiled)),
            generation: AtomicU64::new(0),
            reloaded: AtomicBool::new(false),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Number of watch rules
    pub fn len(&self) -> usize {
        self.compiled.read().rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Re-read the rule file
    ///
    /// On success the new rules replace the old ones and the reload is
    /// recorded. On failure nothing changes and the error is returned.
    /// Either way a notification is sent.
    pub fn reload(&self) -> Result<()> {
        let display = self
            .file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.file.display().to_string());

        match Compiled::load(&self.root, &self.file) {
            Ok(compiled) => {
                *self.compiled.write() = Arc::new(compiled);
                self.generation.fetch_add(1, Ordering::SeqCst);
                self.reloaded.store(true, Ordering::SeqCst);
                self.reporter.notify(&Notification::success(
                    RELOAD_TITLE,
                    format!("{} has been reloaded", display),
                ));
                Ok(())
            }
            Err(e) => {
                self.reporter.warn(&format!("{}: {:#}", RELOAD_FAILED, e));
                self.reporter.notify(&Notification::failure(
                    RELOAD_TITLE,
                    format!("Error occurred while reloading {}", display),
                ));
                Err(e)
            }
        }
    }
}

#[async_trait]
impl RuleSet for RuleFile {
    fn ignore(&self, path: &str) -> bool {
        self.compiled.read().ignore.is_match(path)
    }

    async fn on_change(&self, cancel: &CancellationToken, paths: PathSet) -> Result<()> {
        if let Some(name) = &self.name {
            if paths.contains(name) {
                // failure is already reported; the old rules stay in effect
                let _ = self.reload();
            }
        }

        let compiled = Arc::clone(&*self.compiled.read());
        let mut failures = Vec::new();

        for rule in &compiled.rules {
            let files = rule.matches(&paths);
            if files.is_empty() {
                continue;
            }
            debug!("Rule {} matched {} file(s)", rule.title(), files.len());

            if let Err(e) = rule.run(&self.root, &files, &*self.reporter, cancel).await {
                if cancel.is_cancelled() {
                    return Err(e);
                }
                failures.push(format!("{:#}", e));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(anyhow!(failures.join("\n")))
        }
    }

    fn reloaded(&self) -> bool {
        self.reloaded.swap(false, Ordering::SeqCst)
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}
