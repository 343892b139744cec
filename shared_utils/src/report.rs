//! Run Report
//!
//! Counters are updated from pool workers concurrently, so they are atomics;
//! the failure list sits behind a mutex and stops growing at the display
//! limit (the rest is only counted).

use crate::config::FAILURE_DISPLAY_LIMIT;
use crate::progress::{format_duration, format_mb};
use chrono::{DateTime, Utc};
use console::style;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    pub path: PathBuf,
    pub message: String,
}

#[derive(Debug)]
pub struct RunReport {
    operation: &'static str,
    dry_run: bool,
    started_at: DateTime<Utc>,
    started: Instant,
    failure_limit: usize,
    total: AtomicUsize,
    converted: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
    planned: AtomicUsize,
    cancelled: AtomicUsize,
    input_bytes: AtomicU64,
    output_bytes: AtomicU64,
    failures: Mutex<Vec<FailureRecord>>,
    failures_omitted: AtomicUsize,
}

impl RunReport {
    pub fn new(operation: &'static str, dry_run: bool) -> Self {
        Self {
            operation,
            dry_run,
            started_at: Utc::now(),
            started: Instant::now(),
            failure_limit: FAILURE_DISPLAY_LIMIT,
            total: AtomicUsize::new(0),
            converted: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            planned: AtomicUsize::new(0),
            cancelled: AtomicUsize::new(0),
            input_bytes: AtomicU64::new(0),
            output_bytes: AtomicU64::new(0),
            failures: Mutex::new(Vec::new()),
            failures_omitted: AtomicUsize::new(0),
        }
    }

    pub fn with_failure_limit(mut self, limit: usize) -> Self {
        self.failure_limit = limit;
        self
    }

    /// Register tasks found by discovery; each must later reach exactly one
    /// terminal state.
    pub fn add_discovered(&self, tasks: usize) {
        self.total.fetch_add(tasks, Ordering::Relaxed);
    }

    pub fn add_input_bytes(&self, bytes: u64) {
        self.input_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn success(&self, output_bytes: u64) -> usize {
        self.output_bytes.fetch_add(output_bytes, Ordering::Relaxed);
        self.converted.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn skip(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn plan(&self) {
        self.planned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cancel(&self, tasks: usize) {
        self.cancelled.fetch_add(tasks, Ordering::Relaxed);
    }

    pub fn fail(&self, path: PathBuf, message: String) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        let mut failures = self.failures.lock().unwrap_or_else(|e| e.into_inner());
        if failures.len() < self.failure_limit {
            failures.push(FailureRecord { path, message });
        } else {
            self.failures_omitted.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Snapshot for the end of the run, once the pool has drained.
    pub fn summarize(&self) -> RunSummary {
        let failures = self
            .failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        RunSummary {
            operation: self.operation.to_string(),
            dry_run: self.dry_run,
            started_at: self.started_at,
            elapsed: self.started.elapsed(),
            total: self.total.load(Ordering::Relaxed),
            converted: self.converted.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            planned: self.planned.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            total_input_bytes: self.input_bytes.load(Ordering::Relaxed),
            total_output_bytes: self.output_bytes.load(Ordering::Relaxed),
            failures,
            failures_omitted: self.failures_omitted.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub operation: String,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    #[serde(serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    pub total: usize,
    pub converted: usize,
    pub skipped: usize,
    pub failed: usize,
    pub planned: usize,
    pub cancelled: usize,
    pub total_input_bytes: u64,
    pub total_output_bytes: u64,
    pub failures: Vec<FailureRecord>,
    pub failures_omitted: usize,
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

impl RunSummary {
    /// Every discovered task ended in exactly one terminal state.
    pub fn is_consistent(&self) -> bool {
        self.total == self.converted + self.skipped + self.failed + self.planned + self.cancelled
    }

    pub fn size_reduction(&self) -> f64 {
        if self.total_input_bytes > 0 {
            (1.0 - self.total_output_bytes as f64 / self.total_input_bytes as f64) * 100.0
        } else {
            0.0
        }
    }

    pub fn was_interrupted(&self) -> bool {
        self.cancelled > 0
    }
}

pub fn print_summary(summary: &RunSummary) {
    let title = if summary.dry_run {
        format!("{} (dry run)", summary.operation)
    } else {
        summary.operation.clone()
    };

    println!();
    println!("{}", style(format!("📊 {} summary", title)).bold());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("  📁 Tasks:        {:>8}", summary.total);
    println!("  ✅ Converted:    {:>8}", style(summary.converted).green());
    println!("  ⏭️  Skipped:      {:>8}", summary.skipped);
    if summary.failed > 0 {
        println!("  ❌ Failed:       {:>8}", style(summary.failed).red().bold());
    } else {
        println!("  ❌ Failed:       {:>8}", summary.failed);
    }
    if summary.dry_run {
        println!("  📝 Would write:  {:>8}", summary.planned);
    }
    if summary.cancelled > 0 {
        println!("  ⛔ Not started:  {:>8}", style(summary.cancelled).yellow());
    }
    println!(
        "  💾 In / Out:     {} → {} ({:.1}% smaller)",
        format_mb(summary.total_input_bytes),
        format_mb(summary.total_output_bytes),
        summary.size_reduction()
    );
    println!("  ⏱️  Elapsed:      {}", format_duration(summary.elapsed));

    if summary.failures.is_empty() {
        return;
    }

    println!();
    println!("{}", style("❌ Failures:").red().bold());
    for failure in &summary.failures {
        println!("   {} → {}", failure.path.display(), failure.message);
    }
    if summary.failures_omitted > 0 {
        println!("   ...and {} more", summary.failures_omitted);
    }
    println!();
    println!("💡 Failures are usually oddly-encoded JPEGs (CMYK, broken markers) or truncated files.");
    println!("   Re-save them with an image editor and re-run; finished outputs are skipped.");
}
