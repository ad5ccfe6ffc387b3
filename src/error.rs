//! Unified error handling for the wilayah crate
//!
//! This module provides a unified error type that consolidates all domain-specific
//! errors into a single `Error` enum, while keeping the domain errors usable
//! on their own.
//!
//! # Architecture
//!
//! - [`WilayahErrorTrait`] - Common interface implemented by all error types
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum for the errors a crawl run can end with

use thiserror::Error;

pub use crate::utils::error::{
    CodeError, CrawlError, FetchError, FetchErrorKind, LifecycleError, StorageError,
};

/// Common trait for all wilayah error types
pub trait WilayahErrorTrait: std::error::Error {
    /// Check if this error is recoverable (a later run may succeed)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Network-related errors (HTTP, timeout, bad status)
    Network,
    /// Payload decoding and code parsing errors
    Parsing,
    /// Checkpoint and dataset I/O errors
    Storage,
    /// Configuration and validation errors
    Config,
    /// Crawl lifecycle errors
    Lifecycle,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Parsing => "parsing",
            Self::Storage => "storage",
            Self::Config => "config",
            Self::Lifecycle => "lifecycle",
        }
    }
}

impl WilayahErrorTrait for FetchError {
    fn is_recoverable(&self) -> bool {
        self.is_transient()
    }

    fn category(&self) -> ErrorCategory {
        match self.kind {
            FetchErrorKind::Decode(_) | FetchErrorKind::Shape(_) => ErrorCategory::Parsing,
            FetchErrorKind::InvalidUrl(_) => ErrorCategory::Config,
            FetchErrorKind::Cancelled => ErrorCategory::Lifecycle,
            _ => ErrorCategory::Network,
        }
    }
}

impl WilayahErrorTrait for StorageError {
    fn is_recoverable(&self) -> bool {
        // Corrupt files need an operator; I/O may clear up (disk space, permissions)
        matches!(self, Self::Io { .. })
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::CorruptCheckpoint { .. } | Self::InvalidDataset { .. } => ErrorCategory::Parsing,
            _ => ErrorCategory::Storage,
        }
    }
}

impl WilayahErrorTrait for CrawlError {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Checkpoint(e) | Self::FinalArtifact(e) => e.is_recoverable(),
            Self::ProvinceList(e) => e.is_recoverable(),
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Checkpoint(e) | Self::FinalArtifact(e) => e.category(),
            Self::ProvinceList(e) => e.category(),
        }
    }
}

/// Unified error type for the wilayah crate
///
/// This is what callers of [`crate::crawler::CrawlController`] see when they
/// await a run.
#[derive(Error, Debug)]
pub enum Error {
    /// Fatal crawl errors
    #[error("Crawl error: {0}")]
    Crawl(#[from] CrawlError),

    /// Lifecycle controller errors
    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),
}

impl WilayahErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Crawl(e) => e.is_recoverable(),
            Self::Lifecycle(e) => matches!(e, LifecycleError::AlreadyRunning),
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Crawl(e) => e.category(),
            Self::Lifecycle(_) => ErrorCategory::Lifecycle,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
