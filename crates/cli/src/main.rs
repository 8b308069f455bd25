//! lull - run commands when files change

use anyhow::{Context, Result};
use clap::Parser;
use lull_core::{Reporter, TracingReporter};
use lull_rules::{RuleFile, DEFAULT_RULE_FILE};
use lull_watcher::Watcher;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Exit status after Ctrl-C
const EXIT_INTERRUPTED: u8 = 130;

/// Watch a directory and run the rules in lull.toml on every change
#[derive(Parser, Debug)]
#[command(name = "lull")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Quiet period that closes a batch
    #[arg(short, long, default_value = "727ms")]
    squash: humantime::Duration,

    /// Directory to watch
    #[arg(short = 'C', long, default_value = ".")]
    dir: PathBuf,

    /// Rule file, relative to the watched directory
    #[arg(short, long, default_value = DEFAULT_RULE_FILE)]
    file: PathBuf,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                debug!("Interrupt received");
                cancel.cancel();
            }
        }
    });

    run(cli, cancel).await.map(ExitCode::from)
}

/// Watch until interrupted; returns the exit status
async fn run(cli: Cli, cancel: CancellationToken) -> Result<u8> {
    let reporter: Arc<dyn Reporter> = Arc::new(TracingReporter);

    let rules = RuleFile::load(&cli.dir, &cli.file, Arc::clone(&reporter))
        .context("Failed to load rules")?;
    let watcher = match Watcher::new(&cli.dir, Arc::new(rules), reporter, cancel) {
        Ok(watcher) => watcher,
        // interrupted during the initial walk
        Err(e) if e.is_cancelled() => {
            info!("Interrupted, exiting");
            return Ok(EXIT_INTERRUPTED);
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to watch {}", cli.dir.display()))
        }
    };
    watcher.set_squash(cli.squash.into());

    let res = watcher.watch().await;
    watcher.close().await;

    match res {
        Ok(()) => Ok(0),
        Err(e) if e.is_cancelled() => {
            info!("Interrupted, exiting");
            Ok(EXIT_INTERRUPTED)
        }
        Err(e) => Err(e.into()),
    }
}
