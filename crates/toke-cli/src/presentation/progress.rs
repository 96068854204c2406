//! indicatif progress bars for model and dependency downloads.

use std::collections::HashMap;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use toke_core::DownloadProgress;

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}) {msg}";
const SPINNER_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] {prefix:.bold} {msg}";

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(BAR_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓░")
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template(SPINNER_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

/// A single byte-count bar fed by `(downloaded, total)` callbacks.
#[derive(Clone)]
pub struct ByteBar {
    bar: ProgressBar,
}

impl ByteBar {
    pub fn new(message: &str) -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(bar_style());
        bar.set_message(message.to_string());
        Self { bar }
    }

    /// Callback body; totals may grow between calls.
    pub fn update(&self, downloaded: u64, total: u64) {
        if total > 0 && self.bar.length() != Some(total) {
            self.bar.set_length(total);
        }
        self.bar.set_position(downloaded);
    }

    pub fn set_message(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    pub fn println(&self, line: &str) {
        self.bar.println(line);
    }

    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    pub fn abandon(&self, message: &str) {
        self.bar.abandon_with_message(message.to_string());
    }
}

/// One line per dependency name, driven by [`DownloadProgress`] snapshots.
pub struct DependencyBars {
    multi: MultiProgress,
    bars: HashMap<String, ProgressBar>,
}

impl DependencyBars {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: HashMap::new(),
        }
    }

    /// Hidden output, for tests.
    pub fn hidden() -> Self {
        Self {
            multi: MultiProgress::with_draw_target(indicatif::ProgressDrawTarget::hidden()),
            bars: HashMap::new(),
        }
    }

    pub fn apply(&mut self, progress: &DownloadProgress) {
        let multi = &self.multi;
        let bar = self.bars.entry(progress.name.clone()).or_insert_with(|| {
            let bar = multi.add(ProgressBar::new_spinner());
            bar.set_style(spinner_style());
            bar.set_prefix(progress.name.clone());
            bar
        });

        if progress.total_bytes > 0 {
            if bar.length() != Some(progress.total_bytes) {
                bar.set_style(bar_style());
                bar.set_length(progress.total_bytes);
            }
            bar.set_position(progress.current_bytes);
        } else {
            bar.tick();
        }

        match &progress.error {
            Some(error) => bar.abandon_with_message(format!("{}: {error}", progress.status)),
            None => bar.set_message(progress.status.clone()),
        }
    }

    /// Names seen so far, in no particular order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bars.keys().map(String::as_str)
    }

    pub fn message(&self, name: &str) -> Option<String> {
        self.bars.get(name).map(|b| b.message().to_string())
    }

    pub fn finish(self) {
        for bar in self.bars.into_values() {
            if !bar.is_finished() {
                bar.finish();
            }
        }
    }
}

impl Default for DependencyBars {
    fn default() -> Self {
        Self::new()
    }
}
