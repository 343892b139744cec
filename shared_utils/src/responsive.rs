//! Responsive Variant Generator
//!
//! Second pass over the base `.webp` outputs (from this run or an earlier
//! one). For a base of natural width `W`, every configured width `w < W`
//! gets a `name-{w}.webp` sibling; nothing is ever upscaled.

use crate::cancel::CancelToken;
use crate::codec::ImageCodec;
use crate::config::{default_roots, DEFAULT_TASK_TIMEOUT, DEFAULT_WIDTHS, PROGRESS_EVERY};
use crate::error::{PipelineError, Result};
use crate::gate::should_skip;
use crate::paths::{derive_variant_path, is_base_webp};
use crate::profile::{TargetFormat, RESPONSIVE_WEBP};
use crate::progress::BatchProgress;
use crate::report::{RunReport, RunSummary};
use crate::task::{run_with_timeout, write_output};
use crate::thread_manager::{build_pool, PoolConfig};
use crate::walker::{usable_roots, walk_files};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct ResponsiveOptions {
    pub roots: Vec<PathBuf>,
    pub widths: Vec<u32>,
    /// Only bases whose path contains this substring.
    pub include: Option<String>,
    pub dry_run: bool,
    pub pool: PoolConfig,
    pub timeout: Option<Duration>,
    pub progress_every: usize,
    pub show_progress: bool,
}

impl Default for ResponsiveOptions {
    fn default() -> Self {
        Self {
            roots: default_roots(),
            widths: DEFAULT_WIDTHS.to_vec(),
            include: None,
            dry_run: false,
            pool: PoolConfig::default(),
            timeout: Some(DEFAULT_TASK_TIMEOUT),
            progress_every: PROGRESS_EVERY,
            show_progress: true,
        }
    }
}

impl ResponsiveOptions {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            ..Self::default()
        }
    }

    pub fn with_widths(mut self, widths: Vec<u32>) -> Self {
        self.widths = widths;
        self
    }

    pub fn with_include(mut self, include: Option<String>) -> Self {
        self.include = include.filter(|s| !s.is_empty());
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

    fn includes(&self, path: &Path) -> bool {
        match &self.include {
            Some(needle) => path.to_string_lossy().contains(needle.as_str()),
            None => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponsiveVariantTask {
    pub base_image: PathBuf,
    pub target_width: u32,
    pub target_path: PathBuf,
}

/// Widths to generate for a base of `natural_width`: strictly smaller,
/// ascending, no duplicates.
pub fn plan_widths(natural_width: u32, widths: &[u32]) -> Vec<u32> {
    let mut planned: Vec<u32> = widths
        .iter()
        .copied()
        .filter(|&w| w > 0 && w < natural_width)
        .collect();
    planned.sort_unstable();
    planned.dedup();
    planned
}

pub fn plan_variants(base: &Path, natural_width: u32, widths: &[u32]) -> Vec<ResponsiveVariantTask> {
    plan_widths(natural_width, widths)
        .into_iter()
        .map(|w| ResponsiveVariantTask {
            base_image: base.to_path_buf(),
            target_width: w,
            target_path: derive_variant_path(base, w),
        })
        .collect()
}

#[derive(Debug)]
struct BaseJob {
    base: PathBuf,
    variants: Vec<ResponsiveVariantTask>,
}

pub fn run_responsive(
    options: &ResponsiveOptions,
    codec: Arc<dyn ImageCodec>,
    cancel: &CancelToken,
) -> Result<RunSummary> {
    let roots = usable_roots(&options.roots)?;
    let report = RunReport::new("Responsive variants", options.dry_run);

    info!(
        roots = ?roots,
        widths = ?options.widths,
        include = options.include.as_deref().unwrap_or(""),
        dry_run = options.dry_run,
        "Scanning for base WebP images"
    );

    let jobs = discover(&roots, options, codec.as_ref(), &report);
    let pending: usize = jobs.iter().map(|j| j.variants.len()).sum();
    info!(bases = jobs.len(), pending, "Discovery complete");

    if jobs.is_empty() {
        return Ok(report.summarize());
    }

    let pool = build_pool(&options.pool)?;
    let progress = if options.show_progress {
        BatchProgress::new(pending as u64, "Resizing", options.progress_every)
    } else {
        BatchProgress::hidden()
    };

    pool.install(|| {
        jobs.par_iter().for_each(|job| {
            if cancel.is_cancelled() {
                report.cancel(job.variants.len());
                for _ in &job.variants {
                    progress.tick(&job.base);
                }
                return;
            }
            render_variants(job, &codec, options.timeout, &report, &progress);
        });
    });
    progress.finish();

    let summary = report.summarize();
    info!(
        converted = summary.converted,
        skipped = summary.skipped,
        failed = summary.failed,
        cancelled = summary.cancelled,
        "Responsive pass finished"
    );
    Ok(summary)
}

/// Walk for bases, read their widths and gate each variant. Header reads are
/// cheap, so this stays on the calling thread.
fn discover(
    roots: &[PathBuf],
    options: &ResponsiveOptions,
    codec: &dyn ImageCodec,
    report: &RunReport,
) -> Vec<BaseJob> {
    let mut jobs = Vec::new();

    for entry in walk_files(roots) {
        let base = match entry {
            Ok(path) => path,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable directory");
                continue;
            }
        };
        if !is_base_webp(&base, &options.widths) || !options.includes(&base) {
            continue;
        }

        let dims = match codec.metadata(&base) {
            Ok(dims) => dims,
            Err(e) => {
                warn!(base = %base.display(), error = %e, "Cannot read width, skipping");
                report.add_discovered(1);
                report.skip();
                continue;
            }
        };

        let variants = plan_variants(&base, dims.width, &options.widths);
        if variants.is_empty() {
            debug!(base = %base.display(), width = dims.width, "Already at or below smallest width");
            continue;
        }
        report.add_discovered(variants.len());

        let mut pending = Vec::with_capacity(variants.len());
        for variant in variants {
            if should_skip(&variant.target_path) {
                debug!(output = %variant.target_path.display(), "Variant exists, skipping");
                report.skip();
            } else if options.dry_run {
                info!(
                    base = %base.display(),
                    width = variant.target_width,
                    output = %variant.target_path.display(),
                    "Would write"
                );
                report.plan();
            } else {
                pending.push(variant);
            }
        }

        if !pending.is_empty() {
            jobs.push(BaseJob {
                base,
                variants: pending,
            });
        }
    }

    jobs
}

/// Decode the base once, then resize and encode every missing width.
fn render_variants(
    job: &BaseJob,
    codec: &Arc<dyn ImageCodec>,
    timeout: Option<Duration>,
    report: &RunReport,
    progress: &BatchProgress,
) {
    let fail_all = |message: String| {
        for _ in &job.variants {
            warn!(base = %job.base.display(), error = %message, "Variant failed");
            report.fail(job.base.clone(), message.clone());
            progress.tick(&job.base);
        }
    };

    let bytes = match std::fs::read(&job.base) {
        Ok(bytes) => bytes,
        Err(source) => {
            let err = PipelineError::Read {
                path: job.base.clone(),
                source,
            };
            fail_all(err.to_string());
            return;
        }
    };
    report.add_input_bytes(bytes.len() as u64);

    let worker_codec = Arc::clone(codec);
    let widths: Vec<u32> = job.variants.iter().map(|v| v.target_width).collect();
    let encoded = run_with_timeout(timeout, move || {
        let image = worker_codec.decode(&bytes)?;
        Ok(widths
            .iter()
            .map(|&w| {
                let resized = worker_codec.resize_to_width(&image, w)?;
                worker_codec.encode(&resized, TargetFormat::WebP, &RESPONSIVE_WEBP)
            })
            .collect::<Vec<_>>())
    });

    let outputs = match encoded {
        Ok(outputs) => outputs,
        Err(e) => {
            fail_all(e.to_string());
            return;
        }
    };

    for (variant, output) in job.variants.iter().zip(outputs) {
        match output.and_then(|data| write_output(&variant.target_path, &data)) {
            Ok(written) => {
                debug!(
                    base = %job.base.display(),
                    width = variant.target_width,
                    output = %variant.target_path.display(),
                    bytes_out = written,
                    "Variant written"
                );
                let converted = report.success(written);
                progress.converted(converted);
            }
            Err(e) => {
                warn!(
                    base = %job.base.display(),
                    width = variant.target_width,
                    error = %e,
                    "Variant failed"
                );
                report.fail(
                    job.base.clone(),
                    format!("{}px: {}", variant.target_width, e),
                );
            }
        }
        progress.tick(&variant.target_path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::test_support::{encoded, write_corrupt, write_jpeg, write_png};
    use crate::codec::RustCodec;
    use crate::pipeline::test_codecs::StallingCodec;
    use crate::pipeline::{run_base_conversion, ConvertOptions};
    use crate::profile::BASE_WEBP;
    use image::ImageFormat;
    use std::fs;
    use tempfile::TempDir;

    fn codec() -> Arc<dyn ImageCodec> {
        Arc::new(RustCodec::new())
    }

    fn options(roots: Vec<PathBuf>) -> ResponsiveOptions {
        ResponsiveOptions::new(roots)
            .with_pool(PoolConfig::with_threads(2))
            .with_timeout(Some(Duration::from_secs(60)))
            .with_progress(false)
    }

    fn run(opts: &ResponsiveOptions) -> RunSummary {
        run_responsive(opts, codec(), &CancelToken::new()).unwrap()
    }

    /// Write a real base WebP of the given size.
    fn write_base(path: &Path, width: u32, height: u32) {
        let codec = RustCodec::new();
        let image = codec.decode(&encoded(width, height, ImageFormat::Png)).unwrap();
        let bytes = codec.encode(&image, TargetFormat::WebP, &BASE_WEBP).unwrap();
        fs::write(path, bytes).unwrap();
    }

    fn width_of(path: &Path) -> u32 {
        RustCodec::new().metadata(path).unwrap().width
    }

    #[test]
    fn test_plan_widths_is_strict() {
        assert_eq!(plan_widths(800, DEFAULT_WIDTHS), vec![480]);
        assert_eq!(plan_widths(1600, DEFAULT_WIDTHS), vec![480, 768, 1024, 1440]);
        assert_eq!(plan_widths(1440, DEFAULT_WIDTHS), vec![480, 768, 1024]);
        assert_eq!(plan_widths(480, DEFAULT_WIDTHS), Vec::<u32>::new());
        assert_eq!(plan_widths(300, DEFAULT_WIDTHS), Vec::<u32>::new());
    }

    #[test]
    fn test_plan_widths_sorts_and_dedups() {
        assert_eq!(plan_widths(2000, &[1024, 480, 1024, 0, 768]), vec![480, 768, 1024]);
    }

    #[test]
    fn test_plan_variants_names() {
        let tasks = plan_variants(Path::new("/site/hero.webp"), 800, DEFAULT_WIDTHS);
        assert_eq!(
            tasks,
            vec![ResponsiveVariantTask {
                base_image: PathBuf::from("/site/hero.webp"),
                target_width: 480,
                target_path: PathBuf::from("/site/hero-480.webp"),
            }]
        );
    }

    #[test]
    fn test_worked_example_both_passes() {
        let dir = TempDir::new().unwrap();
        let public = dir.path().join("public/images");
        let assets = dir.path().join("src/assets/images");
        fs::create_dir_all(&public).unwrap();
        fs::create_dir_all(&assets).unwrap();
        write_png(&public.join("a.png"), 800, 600);
        write_corrupt(&public.join("b.jpg"));
        write_jpeg(&assets.join("c.jpeg"), 1600, 1200);
        let roots = vec![public.clone(), assets.clone()];

        let base = run_base_conversion(
            &ConvertOptions::new(roots.clone())
                .with_pool(PoolConfig::with_threads(2))
                .with_progress(false),
            codec(),
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(base.converted, 2);
        assert_eq!(base.failed, 1);

        let summary = run(&options(roots));
        assert_eq!(summary.converted, 5);
        assert_eq!(summary.failed, 0);
        assert!(summary.is_consistent());

        assert!(public.join("a-480.webp").exists());
        assert!(!public.join("a-768.webp").exists());
        for w in [480, 768, 1024, 1440] {
            let variant = assets.join(format!("c-{}.webp", w));
            assert!(variant.exists(), "missing {}", variant.display());
            assert_eq!(width_of(&variant), w);
        }
        assert!(!assets.join("c-1600.webp").exists());
    }

    #[test]
    fn test_variant_keeps_aspect_ratio() {
        let dir = TempDir::new().unwrap();
        write_base(&dir.path().join("a.webp"), 800, 600);

        run(&options(vec![dir.path().to_path_buf()]));
        let dims = RustCodec::new().metadata(&dir.path().join("a-480.webp")).unwrap();
        assert_eq!((dims.width, dims.height), (480, 360));
    }

    #[test]
    fn test_never_upscales() {
        let dir = TempDir::new().unwrap();
        write_base(&dir.path().join("thumb.webp"), 400, 300);
        write_base(&dir.path().join("exact.webp"), 480, 320);

        let summary = run(&options(vec![dir.path().to_path_buf()]));
        assert_eq!(summary.total, 0);
        assert_eq!(summary.converted, 0);
        assert!(!dir.path().join("thumb-480.webp").exists());
        assert!(!dir.path().join("exact-480.webp").exists());
    }

    #[test]
    fn test_second_run_skips_everything() {
        let dir = TempDir::new().unwrap();
        write_base(&dir.path().join("c.webp"), 1600, 900);
        let opts = options(vec![dir.path().to_path_buf()]);

        let first = run(&opts);
        assert_eq!(first.converted, 4);

        // Variants from the first run must not be picked up as new bases.
        let second = run(&opts);
        assert_eq!(second.converted, 0);
        assert_eq!(second.skipped, 4);
        assert_eq!(second.total, 4);
        assert!(!dir.path().join("c-480-480.webp").exists());
    }

    #[test]
    fn test_include_filter() {
        let dir = TempDir::new().unwrap();
        let shows = dir.path().join("shows");
        let people = dir.path().join("people");
        fs::create_dir_all(&shows).unwrap();
        fs::create_dir_all(&people).unwrap();
        write_base(&shows.join("hamlet.webp"), 800, 600);
        write_base(&people.join("director.webp"), 800, 600);

        let summary = run(
            &options(vec![dir.path().to_path_buf()]).with_include(Some("shows".into())),
        );
        assert_eq!(summary.converted, 1);
        assert!(shows.join("hamlet-480.webp").exists());
        assert!(!people.join("director-480.webp").exists());
    }

    #[test]
    fn test_empty_include_matches_everything() {
        let opts = ResponsiveOptions::default().with_include(Some(String::new()));
        assert!(opts.include.is_none());
    }

    #[test]
    fn test_custom_widths() {
        let dir = TempDir::new().unwrap();
        write_base(&dir.path().join("a.webp"), 800, 600);

        run(&options(vec![dir.path().to_path_buf()]).with_widths(vec![200, 640]));
        assert!(dir.path().join("a-200.webp").exists());
        assert!(dir.path().join("a-640.webp").exists());
        assert!(!dir.path().join("a-480.webp").exists());
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let dir = TempDir::new().unwrap();
        write_base(&dir.path().join("c.webp"), 1600, 900);

        let summary = run(&options(vec![dir.path().to_path_buf()]).with_dry_run(true));
        assert_eq!(summary.planned, 4);
        assert_eq!(summary.converted, 0);
        assert!(summary.is_consistent());
        let entries = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_unreadable_base_is_skipped_not_failed() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("broken.webp"), b"RIFF\0\0\0\0garbage").unwrap();
        write_base(&dir.path().join("ok.webp"), 800, 600);

        let summary = run(&options(vec![dir.path().to_path_buf()]));
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.converted, 1);
        assert!(summary.is_consistent());
    }

    #[test]
    fn test_timeout_is_a_failure_per_variant() {
        let dir = TempDir::new().unwrap();
        write_base(&dir.path().join("c.webp"), 1600, 900);

        let codec: Arc<dyn ImageCodec> = Arc::new(StallingCodec {
            inner: RustCodec::new(),
            stall_above: 0,
            stall_for: Duration::from_secs(2),
        });
        let opts = options(vec![dir.path().to_path_buf()])
            .with_timeout(Some(Duration::from_millis(200)));
        let summary = run_responsive(&opts, codec, &CancelToken::new()).unwrap();

        assert_eq!(summary.failed, 4);
        assert_eq!(summary.converted, 0);
        assert!(summary.is_consistent());
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_subdirectory_does_not_stop_siblings() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let locked = dir.path().join("locked");
        fs::create_dir_all(&locked).unwrap();
        write_base(&locked.join("hidden.webp"), 800, 600);
        write_base(&dir.path().join("a.webp"), 800, 600);

        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        let enforced = fs::read_dir(&locked).is_err();
        let summary = run(&options(vec![dir.path().to_path_buf()]));
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert!(dir.path().join("a-480.webp").exists());
        assert!(summary.is_consistent());
        if enforced {
            assert_eq!(summary.converted, 1);
            assert!(!locked.join("hidden-480.webp").exists());
        }
    }

    #[test]
    fn test_cancelled_before_start() {
        let dir = TempDir::new().unwrap();
        write_base(&dir.path().join("c.webp"), 1600, 900);
        let cancel = CancelToken::new();
        cancel.cancel();

        let summary =
            run_responsive(&options(vec![dir.path().to_path_buf()]), codec(), &cancel).unwrap();
        assert_eq!(summary.cancelled, 4);
        assert!(!dir.path().join("c-480.webp").exists());
    }

    #[test]
    fn test_no_usable_root_is_fatal() {
        let dir = TempDir::new().unwrap();
        let err = run_responsive(
            &options(vec![dir.path().join("nope")]),
            codec(),
            &CancelToken::new(),
        )
        .unwrap_err();
        assert!(err.is_fatal());
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_planned_widths_are_strictly_smaller(
                natural in 1u32..5000,
                widths in proptest::collection::vec(0u32..6000, 0..8),
            ) {
                let planned = plan_widths(natural, &widths);
                for w in &planned {
                    prop_assert!(*w < natural);
                    prop_assert!(*w > 0);
                    prop_assert!(widths.contains(w));
                }
                prop_assert!(planned.windows(2).all(|p| p[0] < p[1]));
                for w in &widths {
                    if *w > 0 && *w < natural {
                        prop_assert!(planned.contains(w));
                    }
                }
            }
        }
    }
}
