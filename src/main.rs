use anyhow::Result;
use clap::Parser;
use nsfscraper::{
    config::{PipelineConfig, YearRange, DEFAULT_MIN_YEAR, DEFAULT_PREVIEW_ROWS, DEFAULT_REPO_ID, DEFAULT_URL_TEMPLATE},
    pipeline,
};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Download NSF award archives, aggregate them to Parquet and publish the
/// result to the Hugging Face Hub.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Minimum year to download data from
    #[arg(long, default_value_t = DEFAULT_MIN_YEAR)]
    min_year: i32,

    /// Maximum year to download data from (default: current year)
    #[arg(long)]
    max_year: Option<i32>,

    /// Hugging Face dataset repository to upload to
    #[arg(long, default_value = DEFAULT_REPO_ID)]
    repo: String,

    /// Staging root; archives are unpacked under <root>/data/<year>/
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Aggregate Parquet file (default: <root>/nsf.parquet)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Archive URL with a {year} placeholder
    #[arg(long, default_value = DEFAULT_URL_TEMPLATE)]
    url_template: String,

    /// Rows of the aggregate table to print before publishing
    #[arg(long, default_value_t = DEFAULT_PREVIEW_ROWS)]
    preview_rows: usize,

    /// Log and skip archives that download but cannot be unpacked
    #[arg(long)]
    skip_corrupt_archives: bool,
}

fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();

    // ─── 2) configuration ────────────────────────────────────────────
    let args = Args::parse();
    let years = YearRange::resolve(args.min_year, args.max_year)?;
    let mut cfg = PipelineConfig::new(args.root, years);
    if let Some(output) = args.output {
        cfg.output = output;
    }
    cfg.repo_id = args.repo;
    cfg.url_template = args.url_template;
    cfg.preview_rows = args.preview_rows;
    cfg.skip_corrupt_archives = args.skip_corrupt_archives;

    // ─── 3) run ──────────────────────────────────────────────────────
    let receipt = pipeline::run(&cfg)?;
    info!(
        repo = %receipt.repo_id,
        rows = receipt.rows,
        commit = %receipt.commit.commit_url,
        "all done"
    );
    Ok(())
}
