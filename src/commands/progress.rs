// src/commands/progress.rs
//! Terminal progress and prompts
//!
//! Bridges the library's [`ProgressMonitor`] and [`TrustPrompt`] seams to
//! indicatif progress bars and stdin.

use indicatif::{ProgressBar, ProgressStyle};
use provisioner::progress::ProgressMonitor;
use provisioner::trust::{TrustPrompt, TrustResponse, UntrustedArtifact};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

/// Progress bar driven by planner and engine progress reports
///
/// The task name goes into the bar prefix; per-operand messages go after
/// the bar.
pub struct ProgressBarMonitor {
    bar: ProgressBar,
}

impl ProgressBarMonitor {
    /// A bar sized by the first `begin_task`
    pub fn new(operation: &str) -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{prefix} ({pos}/{len}) [{bar:40.green/dim}] {percent}% {msg}")
                .expect("Invalid progress bar template")
                .progress_chars("##-"),
        );
        bar.set_prefix(operation.to_string());
        Self { bar }
    }

    /// A spinner for work without a meaningful total
    pub fn spinner(operation: &str) -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {prefix} {msg}")
                .expect("Invalid spinner template"),
        );
        bar.set_prefix(operation.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }

    /// Remove the bar from the terminal
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressMonitor for ProgressBarMonitor {
    fn begin_task(&self, name: &str, total_work: u64) {
        self.bar.set_length(total_work);
        self.bar.set_position(0);
        self.bar.set_prefix(name.to_string());
    }

    fn worked(&self, amount: u64) {
        self.bar.inc(amount);
    }

    fn set_message(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    fn is_cancelled(&self) -> bool {
        false
    }

    fn done(&self) {
        if let Some(len) = self.bar.length() {
            self.bar.set_position(len);
        }
    }
}

/// Trust prompt on the terminal
pub struct StdinPrompt {
    assume_yes: bool,
}

impl StdinPrompt {
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }

    fn ask(&self, untrusted: &[UntrustedArtifact], unsigned: &[PathBuf]) -> io::Result<TrustResponse> {
        let mut stderr = io::stderr().lock();
        if !unsigned.is_empty() {
            writeln!(stderr, "The following artifacts are not signed:")?;
            for path in unsigned {
                writeln!(stderr, "  {}", path.display())?;
            }
        }
        if !untrusted.is_empty() {
            writeln!(stderr, "The following artifacts are signed by unknown keys:")?;
            for artifact in untrusted {
                writeln!(
                    stderr,
                    "  {} (key {}{})",
                    artifact.path.display(),
                    artifact.public_key,
                    artifact
                        .key_id
                        .as_deref()
                        .map(|id| format!(", id {}", id))
                        .unwrap_or_default()
                )?;
            }
        }
        writeln!(stderr)?;
        if untrusted.is_empty() {
            write!(stderr, "Continue? [y/N]: ")?;
        } else {
            write!(stderr, "Continue? [y/N/a = always trust these keys]: ")?;
        }
        stderr.flush()?;

        let mut input = String::new();
        io::stdin().lock().read_line(&mut input)?;
        Ok(match input.trim().to_lowercase().as_str() {
            "y" | "yes" => TrustResponse::accept_all(),
            "a" | "always" if !untrusted.is_empty() => TrustResponse {
                remember: true,
                ..TrustResponse::accept_all()
            },
            _ => TrustResponse::decline(),
        })
    }
}

impl TrustPrompt for StdinPrompt {
    fn prompt_trust(&self, untrusted: &[UntrustedArtifact], unsigned: &[PathBuf]) -> TrustResponse {
        if self.assume_yes {
            return TrustResponse::accept_all();
        }
        self.ask(untrusted, unsigned)
            .unwrap_or_else(|_| TrustResponse::decline())
    }
}
