//! Batch progress display.

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicU64, Ordering};

/// Progress over a batch of uploads or downloads
pub struct BatchProgress {
    bar: ProgressBar,
    failures: AtomicU64,
}

impl BatchProgress {
    /// Create a tracker for `total` items
    #[must_use]
    pub fn new(total: u64, action: &str) -> Self {
        let bar = ProgressBar::new(total);

        let style = ProgressStyle::default_bar()
            .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len}")
            .map(|style| style.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        bar.set_message(format!("{action} {total} images"));

        Self {
            bar,
            failures: AtomicU64::new(0),
        }
    }

    /// Record a finished item
    pub fn succeeded(&self, line: String) {
        self.bar.println(line);
        self.bar.inc(1);
    }

    /// Record a failed item, flagged so it stands out from successes
    pub fn failed(&self, line: String) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.bar.println(format!("error: {line}"));
        self.bar.inc(1);
    }

    /// Items recorded as failed so far
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Finish with a summary message
    pub fn finish_with_message(&self, msg: String) {
        self.bar.finish_with_message(msg);
    }

    /// Stop the bar where it is, leaving `msg` in place of the summary
    pub fn abandon_with_message(&self, msg: String) {
        self.bar.abandon_with_message(msg);
    }
}

/// Format bytes in human-readable format
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    format!("{size:.2} {}", UNITS[unit_idx])
}
