// src/pipeline.rs

use anyhow::Result;
use tracing::info;

use crate::aggregate;
use crate::config::PipelineConfig;
use crate::fetch::{self, ArchiveSource, FetchOptions};
use crate::publish::{self, HubClient, PublishReceipt};

/// fetch → aggregate → preview → publish against the real NSF site and Hub.
pub fn run(cfg: &PipelineConfig) -> Result<PublishReceipt> {
    let client = fetch::http_client()?;
    let source = ArchiveSource::new(client.clone(), cfg.url_template.as_str())?;
    run_with(cfg, &source, move || HubClient::from_env(client))
}

/// Same as [`run`], with the archive source supplied and the Hub connection
/// opened only once the aggregate file exists.
pub fn run_with<F>(cfg: &PipelineConfig, source: &ArchiveSource, connect: F) -> Result<PublishReceipt>
where
    F: FnOnce() -> Result<HubClient>,
{
    info!(
        root = %cfg.root.display(),
        min_year = cfg.years.min,
        max_year = cfg.years.max,
        repo = %cfg.repo_id,
        "starting pipeline"
    );

    let opts = FetchOptions {
        skip_corrupt_archives: cfg.skip_corrupt_archives,
    };
    fetch::fetch_all(source, &cfg.root, cfg.years, &opts)?;

    let table = aggregate::aggregate(&cfg.root, &cfg.output)?;
    println!("{}", aggregate::preview(&table, cfg.preview_rows)?);

    let hub = connect()?;
    publish::publish(&hub, &cfg.output, &cfg.repo_id)
}
