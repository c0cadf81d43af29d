//! Output formatting and progress indicators
//!
//! Progress goes to stderr through `indicatif` and is hidden in quiet or
//! JSON mode, so stdout only ever carries reports.

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

/// How a command should present its results
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputMode {
    pub quiet: bool,
    pub json: bool,
}

impl OutputMode {
    pub fn new(quiet: bool, json: bool) -> Self {
        Self { quiet, json }
    }

    fn progress_hidden(self) -> bool {
        self.quiet || self.json
    }

    /// Print a line of human-readable output unless quiet or in JSON mode
    pub fn line(self, text: impl AsRef<str>) {
        if !self.progress_hidden() {
            println!("{}", text.as_ref());
        }
    }

    /// Print a value as pretty JSON
    pub fn print_json<T: Serialize>(self, value: &T) -> anyhow::Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }

    /// Spinner for operations with unknown duration
    pub fn spinner(self, message: &str) -> ProgressBar {
        if self.progress_hidden() {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
                .template("{spinner:.blue} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(message.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(80));
        pb
    }

    /// Progress bar over catalog channels
    pub fn channel_bar(self, total: u64) -> ProgressBar {
        if self.progress_hidden() {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} channels ({msg})")
                .map(|style| style.progress_chars("█▓▒░"))
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        pb
    }
}

/// Status message prefixes
pub mod status {
    pub const SUCCESS: &str = "✓";
    pub const ERROR: &str = "✗";
    pub const WARNING: &str = "⚠";
    pub const INFO: &str = "ℹ";
}
