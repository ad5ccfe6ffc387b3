//! wilayah - Indonesian region hierarchy crawler
//!
//! Crawls the province → regency → district → village tree from the
//! upstream region API, checkpointing after every province so a run can be
//! resumed, and serves the finished dataset over a small lookup API.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`crawler`] - Upstream client, parallel crawl engine and run lifecycle
//! - [`models`] - Region tree types and region codes
//! - [`storage`] - Checkpoints, temp snapshots and final artifacts
//! - [`server`] - Lookup and crawl control HTTP API
//! - [`utils`] - Name normalisation and domain errors
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use wilayah::config::Config;
//! use wilayah::crawler::{CrawlController, RegionFetcher, RegionSource};
//! use wilayah::storage::CheckpointStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let source: Arc<dyn RegionSource> = Arc::new(RegionFetcher::new()?);
//!     let controller = CrawlController::new(
//!         source,
//!         CheckpointStore::new(&config.storage.output_dir),
//!         config.crawler.year,
//!     );
//!     controller.start(config.crawler.max_workers)?;
//!     if let Some(report) = controller.wait().await {
//!         println!("{:?}", report?.counts);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod crawler;
pub mod error;
pub mod models;
pub mod server;
pub mod storage;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::crawler::{CrawlController, CrawlEngine, CrawlReport, RegionFetcher, RegionSource};
    pub use crate::error::{Error, ErrorCategory, Result, WilayahErrorTrait};
    pub use crate::models::{District, Province, RegionCode, RegionCounts, RegionData, Regency, Village};
    pub use crate::storage::{CheckpointKey, CheckpointStore};
}

// Direct re-exports for convenience
pub use models::{RegionCode, RegionData};
