//! Error types for the wilayah crawler
//!
//! This module defines the domain-specific error types used throughout the
//! crate. The unified [`crate::error::Error`] wraps all of them.

use std::path::PathBuf;
use thiserror::Error;

use crate::crawler::fetcher::{Endpoint, Scope};

/// Errors that can occur while fetching one listing from the upstream API
#[derive(Error, Debug)]
#[error("{endpoint} ({scope}): {kind}")]
pub struct FetchError {
    /// Endpoint that was requested
    pub endpoint: Endpoint,

    /// Ancestor codes and year the request was scoped to
    pub scope: Scope,

    /// Underlying cause
    #[source]
    pub kind: FetchErrorKind,
}

impl FetchError {
    pub fn new(endpoint: Endpoint, scope: &Scope, kind: FetchErrorKind) -> Self {
        Self {
            endpoint,
            scope: scope.clone(),
            kind,
        }
    }

    /// Whether a later run could plausibly succeed where this one failed
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            FetchErrorKind::Http(_) | FetchErrorKind::Timeout | FetchErrorKind::Status(500..=599)
        )
    }
}

/// Cause of a [`FetchError`]
#[derive(Error, Debug)]
pub enum FetchErrorKind {
    /// Transport-level HTTP error
    #[error("HTTP request failed: {0}")]
    Http(#[source] reqwest::Error),

    /// Request exceeded the client timeout
    #[error("Request timeout")]
    Timeout,

    /// Upstream answered with a non-success status
    #[error("Unexpected status: {0}")]
    Status(u16),

    /// Body was not valid JSON
    #[error("Decoding error: {0}")]
    Decode(#[source] serde_json::Error),

    /// Body was JSON but not an object of code -> name
    #[error("Unexpected payload: {0}")]
    Shape(String),

    /// Request URL could not be built
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Cancellation was observed before the request was issued
    #[error("Cancelled before request was sent")]
    Cancelled,
}

impl From<reqwest::Error> for FetchErrorKind {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(err)
        }
    }
}

/// Errors raised by the checkpoint and dataset files
#[derive(Error, Debug)]
pub enum StorageError {
    /// An existing checkpoint could not be parsed
    #[error("Checkpoint {path} is corrupt: {source}")]
    CorruptCheckpoint {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A dataset file could not be parsed
    #[error("Dataset {path} could not be parsed: {source}")]
    InvalidDataset {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Filesystem failure while reading or writing
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Serialisation failure while writing
    #[error("Failed to serialize {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// No dataset file could be located
    #[error("No dataset file found in {0}")]
    DatasetNotFound(PathBuf),
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors that abort a crawl run
#[derive(Error, Debug)]
pub enum CrawlError {
    /// Loading or finalising storage failed
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] StorageError),

    /// The root province list could not be fetched
    #[error("Failed to fetch province list: {0}")]
    ProvinceList(#[source] FetchError),

    /// The final artifact could not be written
    #[error("Failed to write final artifact: {0}")]
    FinalArtifact(#[source] StorageError),
}

/// Errors from the lifecycle controller
#[derive(Error, Debug)]
pub enum LifecycleError {
    /// A crawl is already in progress
    #[error("Crawler is already running")]
    AlreadyRunning,

    /// Worker count must be positive
    #[error("Invalid worker count: {0}")]
    InvalidWorkers(usize),

    /// The crawl task panicked or was aborted
    #[error("Crawl task failed: {0}")]
    Join(String),
}

/// Errors parsing a composite region code
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodeError {
    /// Code length is not 2, 4, 7 or 10
    #[error("Invalid code length {0}. Use 2 digits for province, 4 for kabupaten, 7 for kecamatan, or 10 for desa")]
    InvalidLength(usize),

    /// Code contains a non-digit character
    #[error("Code must be numeric: {0}")]
    NotNumeric(String),
}
