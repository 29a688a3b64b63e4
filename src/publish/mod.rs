// src/publish/mod.rs

use anyhow::{Context, Result};
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use std::path::Path;
use tracing::{info, instrument};

use crate::aggregate::{encode_parquet, read_parquet};

pub mod auth;
pub mod hub;

pub use hub::{CommitInfo, HubClient, RepoId};

/// Where a single-split dataset keeps its only shard.
pub const SHARD_PATH: &str = "data/train-00000-of-00001.parquet";

/// A table ready to be pushed as the `train` split of a Hub dataset.
#[derive(Debug, Clone)]
pub struct DatasetShard {
    pub path_in_repo: String,
    pub rows: usize,
    pub schema: SchemaRef,
    pub bytes: Vec<u8>,
}

impl DatasetShard {
    pub fn from_batch(batch: &RecordBatch) -> Result<Self> {
        Ok(Self {
            path_in_repo: SHARD_PATH.to_string(),
            rows: batch.num_rows(),
            schema: batch.schema(),
            bytes: encode_parquet(batch).context("encoding dataset shard")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub repo_id: String,
    pub user: String,
    pub rows: usize,
    pub commit: CommitInfo,
}

/// Reload the Parquet file at `input_path` and push it to the public Hub
/// dataset `repo_id`, creating the repo if needed. A bare name goes under the
/// authenticated account. Nothing is retried and a
/// failed upload leaves the remote state as the Hub left it.
#[instrument(level = "info", skip(hub, input_path), fields(input = %input_path.as_ref().display()))]
pub fn publish<P: AsRef<Path>>(hub: &HubClient, input_path: P, repo_id: &str) -> Result<PublishReceipt> {
    RepoId::split(repo_id)?;

    // ─── 1) reload and wrap ──────────────────────────────────────────
    let table = read_parquet(input_path.as_ref())?;
    let shard = DatasetShard::from_batch(&table)?;
    info!(rows = shard.rows, columns = shard.schema.fields().len(), bytes = shard.bytes.len(), "dataset ready");

    // ─── 2) session ──────────────────────────────────────────────────
    let user = hub.whoami().context("authenticating with the Hugging Face Hub")?;
    info!(%user, "logged in");
    let repo = RepoId::parse_owned_by(repo_id, &user)?;

    // ─── 3) public repo ──────────────────────────────────────────────
    hub.ensure_dataset_repo(&repo)?;
    hub.make_public(&repo)?;

    // ─── 4) upload ───────────────────────────────────────────────────
    let summary = format!("Upload {} NSF awards", shard.rows);
    let commit = hub
        .upload_file(&repo, &shard.path_in_repo, &shard.bytes, &summary)
        .with_context(|| format!("uploading dataset to {}", repo))?;
    info!(commit_url = %commit.commit_url, "published");

    Ok(PublishReceipt {
        repo_id: repo.to_string(),
        user,
        rows: shard.rows,
        commit,
    })
}
