//! Shared Utilities for the image preparation tools
//!
//! Everything `img-webp` and `img-responsive` do lives here; the binaries
//! only parse flags and print the summary.
//! - Directory walking and output path naming
//! - Decode/re-encode engine behind the `ImageCodec` trait
//! - Idempotency gate (an existing output is never rewritten)
//! - Bounded worker pool, per-file deadlines, Ctrl-C handling
//! - Base conversion and responsive-variant passes
//! - Run report, progress output and logging

pub mod cancel;
pub mod codec;
pub mod config;
pub mod error;
pub mod gate;
pub mod logging;
pub mod paths;
pub mod pipeline;
pub mod profile;
pub mod progress;
pub mod report;
pub mod responsive;
pub mod task;
pub mod thread_manager;
pub mod walker;

pub use cancel::{install_ctrlc_handler, CancelToken};
pub use codec::{Dimensions, ImageCodec, RustCodec};
pub use error::{PipelineError, Result};
pub use gate::should_skip;
pub use logging::{init_logging, LogConfig};
pub use paths::{derive_output_path, derive_variant_path, is_eligible, is_variant_path};
pub use pipeline::{run_base_conversion, ConversionTask, ConvertOptions, SourceAsset};
pub use profile::{QualityProfile, TargetFormat, BASE_AVIF, BASE_WEBP, RESPONSIVE_WEBP};
pub use progress::{format_bytes, format_duration, BatchProgress};
pub use report::{print_summary, FailureRecord, RunReport, RunSummary};
pub use responsive::{plan_widths, run_responsive, ResponsiveOptions, ResponsiveVariantTask};
pub use thread_manager::{build_pool, PoolConfig};
