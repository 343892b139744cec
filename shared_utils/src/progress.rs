//! Progress output for long batches: an indicatif bar on interactive
//! terminals plus a plain stdout line every N conversions, which is what
//! survives in CI logs.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::path::Path;
use std::time::Duration;

pub mod templates {
    pub const BATCH: &str = "{spinner:.green} {prefix:.cyan.bold} ▕{bar:35.green/black}▏ {percent:>3}% • {pos}/{len} • ⏱️ {elapsed_precise} • {msg}";
    pub const PROGRESS_CHARS: &str = "█▓░";
    pub const SPINNER_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";
}

pub struct BatchProgress {
    bar: ProgressBar,
    every: usize,
}

impl BatchProgress {
    pub fn new(total: u64, prefix: &str, every: usize) -> Self {
        let bar = ProgressBar::new(total);
        if console::Term::stderr().is_term() {
            let style = ProgressStyle::default_bar()
                .template(templates::BATCH)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars(templates::PROGRESS_CHARS)
                .tick_chars(templates::SPINNER_CHARS);
            bar.set_style(style);
            bar.set_prefix(prefix.to_string());
            bar.set_draw_target(ProgressDrawTarget::stderr_with_hz(20));
        } else {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        }
        Self { bar, every }
    }

    /// No bar, no progress lines.
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
            every: 0,
        }
    }

    /// A task reached a terminal state.
    pub fn tick(&self, path: &Path) {
        self.bar.inc(1);
        self.bar.set_message(
            path.file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .to_string(),
        );
    }

    /// Called with the running conversion count after each success.
    pub fn converted(&self, count: usize) {
        if should_report(count, self.every) {
            let pos = self.bar.position();
            let len = self.bar.length().unwrap_or(0);
            self.bar
                .suspend(|| println!("  … {} converted ({}/{} tasks done)", count, pos, len));
        }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

/// True on every `every`-th conversion; `every == 0` turns lines off.
pub fn should_report(count: usize, every: usize) -> bool {
    every > 0 && count > 0 && count % every == 0
}

pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Always in megabytes, for side-by-side in/out totals.
pub fn format_mb(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    } else if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{:.1}s", duration.as_secs_f64())
    }
}
