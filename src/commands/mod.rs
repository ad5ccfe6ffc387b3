//! Subcommand implementations

pub mod checkpoints;
pub mod crawl;
pub mod fix;
pub mod serve;

use anyhow::{Context, Result};
use std::sync::Arc;

use wilayah::config::Config;
use wilayah::crawler::fetcher::{RegionFetcher, RegionSource};
use wilayah::crawler::lifecycle::CrawlController;
use wilayah::storage::CheckpointStore;

pub use checkpoints::{checkpoints_clean, checkpoints_info};
pub use crawl::crawl;
pub use fix::fix;
pub use serve::serve;

/// Build the upstream client and a controller over the configured output directory
pub(crate) fn build_controller(config: &Config) -> Result<CrawlController<dyn RegionSource>> {
    let fetcher = RegionFetcher::with_config(
        &config.crawler.base_url,
        config.crawler.requests_per_second,
        config.request_timeout(),
    )
    .context("Failed to create HTTP client")?;

    let source: Arc<dyn RegionSource> = Arc::new(fetcher);
    let store = CheckpointStore::new(&config.storage.output_dir);

    Ok(CrawlController::new(source, store, config.crawler.year))
}
