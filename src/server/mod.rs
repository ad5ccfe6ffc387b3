//! HTTP lookup API and crawl control plane
//!
//! This module provides the axum server that serves the crawled dataset and
//! exposes start/stop/status/progress of background crawls.
//!
//! # Routes
//!
//! All routes live under `/api/v1`:
//!
//! - `GET /health`, `GET /stats`
//! - `GET /provinsi`, `GET /kabupaten`, `GET /kecamatan`, `GET /desa`
//! - `GET /info/{code}`
//! - `GET /scraper/info` (public)
//! - `POST /scraper/start`, `POST /scraper/stop`, `GET /scraper/status`,
//!   `GET /scraper/progress` (API key)

pub mod api;
pub mod server;

pub use api::create_router;
pub use server::{build_router, AppState, ServerError, SharedDataset, WilayahServer};
