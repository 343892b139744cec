//! Batch Orchestrator (base conversion)
//!
//! walk -> filter -> gate happen sequentially on the calling thread; decode
//! and encode run on a bounded rayon pool. Per task:
//!
//! ```text
//! discovered ─┬─ not eligible ........................ (ignored)
//!             └─ eligible ─┬─ output exists .......... skipped
//!                          ├─ dry run ................ planned
//!                          └─ converting ─┬─ ok ...... converted
//!                                         └─ error ... failed
//! ```
//!
//! Tasks that never start because of Ctrl-C end up `cancelled`. Nothing is
//! retried within a run; running again is the retry, and the gate makes that
//! cheap.

use crate::cancel::CancelToken;
use crate::codec::ImageCodec;
use crate::config::{default_roots, DEFAULT_TASK_TIMEOUT, PROGRESS_EVERY};
use crate::error::{PipelineError, Result};
use crate::gate::should_skip;
use crate::paths::{derive_output_path, get_extension_lowercase, is_eligible};
use crate::profile::{base_profile, QualityProfile, TargetFormat};
use crate::progress::BatchProgress;
use crate::report::{RunReport, RunSummary};
use crate::task::{run_with_timeout, write_output};
use crate::thread_manager::{build_pool, PoolConfig};
use crate::walker::{usable_roots, walk_files};
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub roots: Vec<PathBuf>,
    /// Also produce `name.avif` next to `name.webp`.
    pub avif: bool,
    pub dry_run: bool,
    pub pool: PoolConfig,
    pub timeout: Option<Duration>,
    pub progress_every: usize,
    pub show_progress: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            roots: default_roots(),
            avif: false,
            dry_run: false,
            pool: PoolConfig::default(),
            timeout: Some(DEFAULT_TASK_TIMEOUT),
            progress_every: PROGRESS_EVERY,
            show_progress: true,
        }
    }
}

impl ConvertOptions {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            ..Self::default()
        }
    }

    pub fn with_avif(mut self, avif: bool) -> Self {
        self.avif = avif;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn target_formats(&self) -> Vec<TargetFormat> {
        if self.avif {
            vec![TargetFormat::WebP, TargetFormat::Avif]
        } else {
            vec![TargetFormat::WebP]
        }
    }
}

/// A source file as read at conversion time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceAsset {
    pub path: PathBuf,
    pub extension: String,
    pub byte_size: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversionTask {
    pub target_path: PathBuf,
    pub format: TargetFormat,
    pub profile: &'static QualityProfile,
}

/// One eligible source and the outputs it still needs.
#[derive(Debug, Clone)]
struct SourceJob {
    source: PathBuf,
    tasks: Vec<ConversionTask>,
}

/// Tasks for `source`, one per target format, in a fixed order.
pub fn plan_tasks(source: &Path, formats: &[TargetFormat]) -> Vec<ConversionTask> {
    formats
        .iter()
        .map(|&format| ConversionTask {
            target_path: derive_output_path(source, format.extension()),
            format,
            profile: base_profile(format),
        })
        .collect()
}

pub fn run_base_conversion(
    options: &ConvertOptions,
    codec: Arc<dyn ImageCodec>,
    cancel: &CancelToken,
) -> Result<RunSummary> {
    let roots = usable_roots(&options.roots)?;
    let report = RunReport::new("Base conversion", options.dry_run);
    let formats = options.target_formats();

    info!(
        roots = ?roots,
        avif = options.avif,
        dry_run = options.dry_run,
        "Scanning for source images"
    );

    let jobs = discover(&roots, &formats, options.dry_run, &report);
    let pending: usize = jobs.iter().map(|j| j.tasks.len()).sum();
    info!(
        sources = jobs.len(),
        pending,
        already_done = report.summarize().skipped,
        "Discovery complete"
    );

    if jobs.is_empty() {
        return Ok(report.summarize());
    }

    let pool = build_pool(&options.pool)?;
    let progress = if options.show_progress {
        BatchProgress::new(pending as u64, "Converting", options.progress_every)
    } else {
        BatchProgress::hidden()
    };

    pool.install(|| {
        jobs.par_iter().for_each(|job| {
            if cancel.is_cancelled() {
                report.cancel(job.tasks.len());
                for _ in &job.tasks {
                    progress.tick(&job.source);
                }
                return;
            }
            convert_source(job, &codec, options.timeout, &report, &progress);
        });
    });
    progress.finish();

    let summary = report.summarize();
    info!(
        converted = summary.converted,
        skipped = summary.skipped,
        failed = summary.failed,
        cancelled = summary.cancelled,
        "Base conversion finished"
    );
    Ok(summary)
}

/// Sequential walk + filter + gate. Registers every eligible task with the
/// report and settles the ones that need no codec work.
fn discover(
    roots: &[PathBuf],
    formats: &[TargetFormat],
    dry_run: bool,
    report: &RunReport,
) -> Vec<SourceJob> {
    let mut jobs = Vec::new();
    let mut claimed: HashSet<PathBuf> = HashSet::new();

    for entry in walk_files(roots) {
        let path = match entry {
            Ok(path) => path,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable directory");
                continue;
            }
        };
        if !is_eligible(&path) {
            continue;
        }

        let tasks = plan_tasks(&path, formats);
        report.add_discovered(tasks.len());

        let mut pending = Vec::with_capacity(tasks.len());
        for task in tasks {
            // `hero.jpg` and `hero.png` both map to `hero.webp`; first one wins.
            if !claimed.insert(task.target_path.clone()) {
                warn!(
                    source = %path.display(),
                    output = %task.target_path.display(),
                    "Another source already maps to this output, skipping"
                );
                report.skip();
            } else if should_skip(&task.target_path) {
                debug!(output = %task.target_path.display(), "Output exists, skipping");
                report.skip();
            } else if dry_run {
                info!(
                    source = %path.display(),
                    output = %task.target_path.display(),
                    "Would write"
                );
                report.plan();
            } else {
                pending.push(task);
            }
        }

        if !pending.is_empty() {
            jobs.push(SourceJob {
                source: path,
                tasks: pending,
            });
        }
    }

    jobs
}

/// Read once, decode once, encode and write each pending target. Every
/// error is settled here as a failure record.
fn convert_source(
    job: &SourceJob,
    codec: &Arc<dyn ImageCodec>,
    timeout: Option<Duration>,
    report: &RunReport,
    progress: &BatchProgress,
) {
    let fail_all = |message: String| {
        for _ in &job.tasks {
            warn!(source = %job.source.display(), error = %message, "Conversion failed");
            report.fail(job.source.clone(), message.clone());
            progress.tick(&job.source);
        }
    };

    let bytes = match std::fs::read(&job.source) {
        Ok(bytes) => bytes,
        Err(source) => {
            let err = PipelineError::Read {
                path: job.source.clone(),
                source,
            };
            fail_all(err.to_string());
            return;
        }
    };
    let asset = SourceAsset {
        path: job.source.clone(),
        extension: get_extension_lowercase(&job.source),
        byte_size: bytes.len() as u64,
    };
    report.add_input_bytes(asset.byte_size);

    let worker_codec = Arc::clone(codec);
    let targets: Vec<(TargetFormat, &'static QualityProfile)> =
        job.tasks.iter().map(|t| (t.format, t.profile)).collect();
    let encoded = run_with_timeout(timeout, move || {
        let image = worker_codec.decode(&bytes)?;
        Ok(targets
            .iter()
            .map(|(format, profile)| worker_codec.encode(&image, *format, profile))
            .collect::<Vec<_>>())
    });

    let outputs = match encoded {
        Ok(outputs) => outputs,
        Err(e) => {
            fail_all(e.to_string());
            return;
        }
    };

    for (task, output) in job.tasks.iter().zip(outputs) {
        match output.and_then(|data| write_output(&task.target_path, &data)) {
            Ok(written) => {
                debug!(
                    source = %asset.path.display(),
                    source_format = %asset.extension,
                    output = %task.target_path.display(),
                    profile = task.profile.name,
                    bytes_in = asset.byte_size,
                    bytes_out = written,
                    "Converted"
                );
                let converted = report.success(written);
                progress.converted(converted);
            }
            Err(e) => {
                warn!(
                    source = %asset.path.display(),
                    format = %task.format,
                    error = %e,
                    "Conversion failed"
                );
                report.fail(asset.path.clone(), e.to_string());
            }
        }
        progress.tick(&task.target_path);
    }
}
