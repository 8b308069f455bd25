//! Compiled watch rules and command execution

use crate::config::WatchConfig;
use anyhow::{bail, Context, Result};
use lull_core::{Notification, Reporter};
use regex::Regex;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Watch rule ready to match batches
#[derive(Debug, Clone)]
pub struct WatchRule {
    pattern: Regex,
    command: Vec<String>,
    append_files: bool,
    title: String,
}

impl WatchRule {
    pub fn compile(config: &WatchConfig) -> Result<Self> {
        let pattern = Regex::new(&config.pattern)
            .with_context(|| format!("Invalid watch pattern {:?}", config.pattern))?;

        Ok(Self {
            pattern,
            command: config.command.clone(),
            append_files: config.append_files,
            title: config.title.clone().unwrap_or_else(|| config.pattern.clone()),
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Paths from the batch this rule applies to
    pub fn matches<'a, I>(&self, paths: I) -> Vec<&'a str>
    where
        I: IntoIterator<Item = &'a String>,
    {
        paths
            .into_iter()
            .filter(|p| self.pattern.is_match(p))
            .map(String::as_str)
            .collect()
    }

    /// Run the rule for the matched paths
    ///
    /// The exit status becomes a success or failure notification. Failing
    /// to start the program, or being cancelled, is an error.
    pub async fn run(
        &self,
        root: &Path,
        files: &[&str],
        reporter: &dyn Reporter,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let Some((program, args)) = self.command.split_first() else {
            info!("{}: {}", self.title, files.join(" "));
            return Ok(());
        };

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(root)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if self.append_files {
            cmd.args(files);
        }

        debug!("Running {:?} for {} file(s)", self.command, files.len());
        let mut child = cmd
            .spawn()
            .with_context(|| format!("{}: failed to run {}", self.title, program))?;

        let status = tokio::select! {
            status = child.wait() => status.with_context(|| format!("{}: failed to wait for {}", self.title, program))?,
            _ = cancel.cancelled() => {
                // kill_on_drop reaps it if this fails
                let _ = child.kill().await;
                bail!("{}: cancelled", self.title);
            }
        };

        let notification = if status.success() {
            Notification::success(&self.title, format!("{} succeeded", program))
        } else {
            Notification::failure(&self.title, format!("{} failed ({})", program, status))
        };
        reporter.notify(&notification);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(pattern: &str) -> WatchRule {
        WatchRule::compile(&WatchConfig {
            pattern: pattern.to_string(),
            command: vec![],
            append_files: false,
            title: None,
        })
        .unwrap()
    }

    #[test]
    fn test_matches_filters_batch() {
        let batch = ["a.go".to_string(), "b.rs".to_string(), "dir/c.go".to_string()];
        assert_eq!(rule(r"\.go$").matches(&batch), vec!["a.go", "dir/c.go"]);
        assert!(rule(r"\.py$").matches(&batch).is_empty());
    }

    #[test]
    fn test_title_defaults_to_pattern() {
        assert_eq!(rule(r"\.go$").title(), r"\.go$");
    }

    #[test]
    fn test_invalid_pattern() {
        let err = WatchRule::compile(&WatchConfig {
            pattern: "(".to_string(),
            command: vec![],
            append_files: false,
            title: None,
        })
        .unwrap_err();
        assert!(err.to_string().contains("Invalid watch pattern"));
    }
}
