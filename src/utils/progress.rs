//! Progress rendering for the console shell.
//!
//! The engine only emits progress events; this module turns them into indicatif
//! bars. One bar per target kind, shared through a [`MultiProgress`] so a client
//! update and a launcher update can render at the same time.
//!
//! # Environment Variables
//!
//! - `LAUNCHKIT_NO_PROGRESS`: Set to any value to disable all progress indicators

use indicatif::{ProgressBar as IndicatifBar, ProgressStyle as IndicatifStyle};
use std::time::Duration;

fn is_progress_disabled() -> bool {
    std::env::var("LAUNCHKIT_NO_PROGRESS").is_ok()
}

/// A download bar that starts as a spinner and switches to a byte bar once the
/// total size is known.
#[derive(Clone)]
pub struct TransferBar {
    inner: IndicatifBar,
    sized: bool,
}

impl TransferBar {
    pub fn new(prefix: impl Into<String>) -> Self {
        let bar = if is_progress_disabled() {
            IndicatifBar::hidden()
        } else {
            let bar = IndicatifBar::new_spinner();
            bar.set_style(spinner_style());
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        };
        bar.set_prefix(prefix.into());
        Self {
            inner: bar,
            sized: false,
        }
    }

    /// Update from a progress event.
    pub fn update(&mut self, bytes: u64, total: Option<u64>) {
        if let Some(total) = total
            && !self.sized
        {
            self.inner.set_length(total);
            self.inner.set_style(download_style());
            self.sized = true;
        }
        if !self.sized {
            self.inner.set_message(format_bytes(bytes));
        }
        self.inner.set_position(bytes);
    }

    pub fn set_message(&self, msg: impl Into<String>) {
        self.inner.set_message(msg.into());
    }

    pub fn finish_with_message(&self, msg: impl Into<String>) {
        self.inner.finish_with_message(msg.into());
    }

    pub fn finish_and_clear(&self) {
        self.inner.finish_and_clear();
    }
}

pub struct MultiProgress {
    inner: indicatif::MultiProgress,
}

impl MultiProgress {
    pub fn new() -> Self {
        Self::with_hidden(is_progress_disabled())
    }

    /// Bars are drawn nowhere when `hidden`; lines still print.
    pub fn with_hidden(hidden: bool) -> Self {
        let inner = indicatif::MultiProgress::new();
        if hidden {
            inner.set_draw_target(indicatif::ProgressDrawTarget::hidden());
        }
        Self {
            inner,
        }
    }

    pub fn add_transfer(&self, prefix: impl Into<String>) -> TransferBar {
        let bar = TransferBar::new(prefix);
        TransferBar {
            inner: self.inner.add(bar.inner),
            sized: false,
        }
    }

    /// Print a line to stdout above the bars without tearing them.
    pub fn println(&self, line: impl AsRef<str>) {
        self.inner.suspend(|| println!("{}", line.as_ref()));
    }
}

impl Default for MultiProgress {
    fn default() -> Self {
        Self::new()
    }
}

fn download_style() -> IndicatifStyle {
    IndicatifStyle::default_bar()
        .template("{prefix:.bold.cyan} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
        .unwrap()
        .progress_chars("━╸━")
}

fn spinner_style() -> IndicatifStyle {
    IndicatifStyle::default_spinner()
        .template("{prefix:.bold} {spinner:.cyan} {msg}")
        .unwrap()
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
}

/// Human-readable byte count (`1.5 MiB`).
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
