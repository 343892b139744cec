use anyhow::Context;
use clap::{Parser, ValueEnum};
use shared_utils::config::{self, ENV_THREADS, ENV_TIMEOUT_SECS, EXIT_INTERRUPTED};
use shared_utils::logging::{init_logging, LogConfig};
use shared_utils::{
    install_ctrlc_handler, print_summary, run_base_conversion, ConvertOptions, ImageCodec,
    PoolConfig, RunSummary, RustCodec,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "img-webp")]
#[command(version, about = "Convert PNG/JPEG sources under the site image roots to WebP (and AVIF)", long_about = None)]
struct Cli {
    /// Report what would be written without decoding or writing anything
    #[arg(long)]
    dry_run: bool,

    /// Also write an AVIF sibling for every source
    #[arg(long)]
    avif: bool,

    /// Image root to scan (repeatable); defaults to public/images and src/assets/images
    #[arg(long = "root", value_name = "DIR")]
    roots: Vec<PathBuf>,

    /// Worker threads (default: one per core, at most 8)
    #[arg(short, long, env = ENV_THREADS)]
    threads: Option<usize>,

    /// Per-image deadline in seconds, 0 to disable
    #[arg(long, env = ENV_TIMEOUT_SECS, default_value_t = config::DEFAULT_TASK_TIMEOUT.as_secs())]
    timeout_secs: u64,

    #[arg(short, long, value_enum, default_value = "human")]
    output: OutputFormat,

    #[arg(short, long)]
    verbose: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Human,
    Json,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let _ = init_logging("img-webp", LogConfig::default().verbose(cli.verbose));
    let cancel = install_ctrlc_handler().context("Failed to install Ctrl-C handler")?;

    let roots = if cli.roots.is_empty() {
        config::default_roots()
    } else {
        cli.roots
    };
    let pool = match cli.threads {
        Some(n) => PoolConfig::with_threads(n),
        None => PoolConfig::default(),
    };
    let options = ConvertOptions::new(roots)
        .with_avif(cli.avif)
        .with_dry_run(cli.dry_run)
        .with_pool(pool)
        .with_timeout(config::task_timeout(cli.timeout_secs))
        .with_progress(cli.output == OutputFormat::Human);

    if cli.dry_run {
        info!("Dry run: nothing will be written");
    }

    let codec: Arc<dyn ImageCodec> = Arc::new(RustCodec::new());
    let summary =
        run_base_conversion(&options, codec, &cancel).context("Base conversion aborted")?;

    report(&summary, cli.output)?;

    if summary.was_interrupted() {
        std::process::exit(EXIT_INTERRUPTED);
    }
    Ok(())
}

fn report(summary: &RunSummary, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Human => print_summary(summary),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(summary)?),
    }
    Ok(())
}
