// src/aggregate/mod.rs

use anyhow::{Context, Result};
use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;
use std::path::Path;
use std::time::Instant;
use tracing::{info, instrument};

use crate::config;

pub mod artifact;
pub mod records;
pub mod table;

pub use artifact::{encode_parquet, read_parquet, write_parquet};
pub use records::Record;

/// Load every record file under `root/data/*/`, union them into one table
/// and write it to `output_path` as Parquet.
///
/// Buckets and files are visited in lexicographic order, so the row order
/// is stable across platforms. A file that is not a JSON object aborts the
/// whole aggregation before anything is written.
#[instrument(level = "info", skip_all, fields(root = %root.as_ref().display(), output = %output_path.as_ref().display()))]
pub fn aggregate<P: AsRef<Path>, Q: AsRef<Path>>(root: P, output_path: Q) -> Result<RecordBatch> {
    let start = Instant::now();
    let data_dir = config::data_dir(root.as_ref());

    // ─── 1) discover record files ────────────────────────────────────
    let files = records::list_record_files(&data_dir)?;
    info!(files = files.len(), "loading NSF awards");

    // ─── 2) parse, fail fast ─────────────────────────────────────────
    let mut all = Vec::with_capacity(files.len());
    for path in &files {
        all.push(records::read_record(path)?);
    }

    // ─── 3) union-schema table ───────────────────────────────────────
    let table = table::build_table(&all)?;

    // ─── 4) persist ──────────────────────────────────────────────────
    write_parquet(&table, output_path.as_ref())?;

    info!(
        rows = table.num_rows(),
        columns = table.num_columns(),
        elapsed = ?start.elapsed(),
        "wrote aggregate table"
    );
    Ok(table)
}

/// The first `rows` rows of `batch` as a printable table.
pub fn preview(batch: &RecordBatch, rows: usize) -> Result<String> {
    let head = batch.slice(0, rows.min(batch.num_rows()));
    Ok(pretty_format_batches(&[head])
        .context("formatting preview")?
        .to_string())
}
