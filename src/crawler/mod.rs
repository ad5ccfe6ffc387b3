//! Region tree crawling
//!
//! This module implements the crawl of the upstream region API: the HTTP
//! client, the resumable parallel engine, and the controller that starts and
//! stops runs in the background.

pub mod engine;
pub mod fetcher;
pub mod lifecycle;

pub use engine::{CrawlEngine, CrawlOutcome, CrawlReport, EngineConfig, LiveSnapshot, LiveState};
pub use fetcher::{Endpoint, Listing, RegionFetcher, RegionSource, Scope};
pub use lifecycle::{shutdown_signal, CrawlController, Progress, StartAck, StopOutcome};
