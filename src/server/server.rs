//! Lookup API server
//!
//! This module wires the loaded dataset and the crawl controller into the
//! axum router and runs it with graceful shutdown.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use rand::RngCore;
use thiserror::Error;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::crawler::engine::CrawlOutcome;
use crate::crawler::fetcher::RegionSource;
use crate::crawler::lifecycle::CrawlController;
use crate::models::RegionData;
use crate::storage::checkpoint::{find_latest_dataset, read_dataset};
use crate::utils::error::StorageError;

use super::api::create_router;

/// Dataset slot shared by all handlers; replaced wholesale on reload
pub type SharedDataset = Arc<RwLock<Option<Arc<RegionData>>>>;

// ============================================================================
// App State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Currently served dataset, if any
    pub dataset: SharedDataset,

    /// Background crawl control
    pub controller: Arc<CrawlController<dyn RegionSource>>,

    /// Key guarding the crawl control endpoints; `None` disables the check
    pub api_key: Option<Arc<str>>,

    /// Server start time
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        controller: Arc<CrawlController<dyn RegionSource>>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            dataset: Arc::new(RwLock::new(None)),
            controller,
            api_key: api_key.map(Arc::from),
            start_time: Instant::now(),
        }
    }

    /// Replace the served dataset
    pub async fn set_dataset(&self, data: RegionData) {
        *self.dataset.write().await = Some(Arc::new(data));
    }

    /// Current dataset snapshot
    pub async fn dataset(&self) -> Option<Arc<RegionData>> {
        self.dataset.read().await.clone()
    }
}

/// Generate a random 16-byte API key, hex encoded
pub fn generate_api_key() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Load the newest dataset under `dir`
pub fn load_latest_dataset(dir: &Path) -> Result<(PathBuf, RegionData), StorageError> {
    let path = find_latest_dataset(dir)?;
    let data = read_dataset(&path)?;
    Ok((path, data))
}

// ============================================================================
// Server
// ============================================================================

/// Lookup and crawl control server
pub struct WilayahServer {
    bind_address: SocketAddr,
    output_dir: PathBuf,
    state: AppState,
}

impl WilayahServer {
    /// Create a new server
    ///
    /// When `api_key` is `None` a random key is generated and logged so the
    /// control endpoints are never left open.
    pub fn new(
        bind_address: SocketAddr,
        output_dir: impl Into<PathBuf>,
        controller: Arc<CrawlController<dyn RegionSource>>,
        api_key: Option<String>,
    ) -> Self {
        let api_key = api_key.unwrap_or_else(|| {
            let key = generate_api_key();
            tracing::warn!(api_key = %key, "SCRAPER_API_KEY not set, generated a key for this session");
            key
        });

        Self {
            bind_address,
            output_dir: output_dir.into(),
            state: AppState::new(controller, Some(api_key)),
        }
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Load the newest dataset from the output directory, if there is one
    pub async fn load_dataset(&self) -> bool {
        match load_latest_dataset(&self.output_dir) {
            Ok((path, data)) => {
                tracing::info!(
                    path = %path.display(),
                    provinces = data.pro.len(),
                    "Dataset loaded"
                );
                self.state.set_dataset(data).await;
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "No dataset loaded, lookups return 503 until a crawl completes");
                false
            }
        }
    }

    /// Start with graceful shutdown
    ///
    /// After the listener stops, any running crawl is cancelled and awaited
    /// so its checkpoint is on disk before this returns.
    pub async fn start_with_shutdown(
        &self,
        shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let router = self.build_router();
        let addr = self.bind_address;

        self.start_background_tasks();

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind(addr, e))?;

        tracing::info!("Starting wilayah API on {}", addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(ServerError::Serve)?;

        if let Some(result) = self.state.controller.shutdown().await {
            match result {
                Ok(report) => tracing::info!(outcome = report.outcome.as_str(), "Crawl stopped with server"),
                Err(e) => tracing::error!(error = %e, "Crawl failed during shutdown"),
            }
        }

        tracing::info!("Server shutdown complete");
        Ok(())
    }

    /// Reload the dataset whenever a crawl completes
    fn start_background_tasks(&self) {
        let mut reports = self.state.controller.subscribe();
        let state = self.state.clone();

        tokio::spawn(async move {
            while reports.changed().await.is_ok() {
                let report = reports.borrow_and_update().clone();
                let Some(report) = report else { continue };
                if report.outcome != CrawlOutcome::Completed {
                    continue;
                }
                let Some(path) = report.final_artifact else {
                    continue;
                };

                match read_dataset(&path) {
                    Ok(data) => {
                        tracing::info!(path = %path.display(), provinces = data.pro.len(), "Dataset reloaded");
                        state.set_dataset(data).await;
                    }
                    Err(e) => tracing::error!(error = %e, "Failed to reload dataset"),
                }
            }
        });
    }
}

/// Router with CORS and request tracing applied
pub fn build_router(state: AppState) -> Router {
    create_router(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

// ============================================================================
// Server Errors
// ============================================================================

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    /// Failed to bind to address
    #[error("Failed to bind {0}: {1}")]
    Bind(SocketAddr, #[source] std::io::Error),

    /// Server error
    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),
}
