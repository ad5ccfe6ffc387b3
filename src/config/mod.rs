//! Configuration management for the wilayah crawler
//!
//! This module handles loading and validating configuration from environment variables,
//! TOML files, and command-line overrides.

use anyhow::{Context, Result};
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::crawler::fetcher::DEFAULT_BASE_URL;

/// Default number of regency workers
pub const DEFAULT_WORKERS: usize = 4;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Crawler configuration
    pub crawler: CrawlerConfig,

    /// Output file locations
    pub storage: StorageConfig,

    /// Lookup / control API configuration
    pub server: ServerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Crawler-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Upstream base URL; endpoint names are appended to it
    pub base_url: String,

    /// Year sent as `thn`
    pub year: i32,

    /// Regency workers per province
    pub max_workers: usize,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// Request ceiling; 0 means unlimited
    pub requests_per_second: u32,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding checkpoints, temp snapshots and final artifacts
    pub output_dir: PathBuf,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub bind: String,

    /// Shared key guarding the crawl control endpoints
    pub api_key: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

fn current_year() -> i32 {
    chrono::Local::now().year()
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse::<T>().ok())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let base_url =
            std::env::var("WILAYAH_BASE_URL").unwrap_or(defaults.crawler.base_url);

        let year = env_parse::<i32>("WILAYAH_YEAR").unwrap_or(defaults.crawler.year);

        let max_workers =
            env_parse::<usize>("WILAYAH_MAX_WORKERS").unwrap_or(defaults.crawler.max_workers);

        let request_timeout_secs = env_parse::<u64>("WILAYAH_REQUEST_TIMEOUT")
            .unwrap_or(defaults.crawler.request_timeout_secs);

        let requests_per_second = env_parse::<u32>("WILAYAH_REQUESTS_PER_SECOND")
            .unwrap_or(defaults.crawler.requests_per_second);

        let output_dir = std::env::var("WILAYAH_OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.storage.output_dir);

        let bind = std::env::var("WILAYAH_BIND").unwrap_or(defaults.server.bind);

        let api_key = std::env::var("SCRAPER_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());

        let log_level = std::env::var("WILAYAH_LOG_LEVEL").unwrap_or(defaults.logging.level);

        let log_format = std::env::var("WILAYAH_LOG_FORMAT").unwrap_or(defaults.logging.format);

        Ok(Self {
            crawler: CrawlerConfig {
                base_url,
                year,
                max_workers,
                request_timeout_secs,
                requests_per_second,
            },
            storage: StorageConfig { output_dir },
            server: ServerConfig { bind, api_key },
            logging: LoggingConfig {
                level: log_level,
                format: log_format,
            },
        })
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.crawler.max_workers == 0 {
            anyhow::bail!("max_workers must be greater than 0");
        }

        if self.crawler.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be greater than 0");
        }

        url::Url::parse(&self.crawler.base_url)
            .with_context(|| format!("Invalid base_url: {}", self.crawler.base_url))?;

        Ok(())
    }

    /// Get request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.crawler.request_timeout_secs)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            base_url: String::from(DEFAULT_BASE_URL),
            year: current_year(),
            max_workers: DEFAULT_WORKERS,
            request_timeout_secs: 10,
            requests_per_second: 0,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: String::from("0.0.0.0:8080"),
            api_key: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}
