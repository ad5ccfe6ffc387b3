//! HTTP fetcher for the upstream region listing API
//!
//! Every level of the region tree is served by one endpoint that answers a
//! flat JSON object of `{code: name}`. This module provides:
//! - [`Endpoint`] and [`Scope`] describing one request
//! - [`RegionSource`], the seam the crawl engine is generic over
//! - [`RegionFetcher`], the reqwest-backed implementation with optional
//!   rate limiting via governor

use async_trait::async_trait;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT},
    Client,
};
use serde_json::Value;
use std::fmt;
use std::num::NonZeroU32;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::utils::error::{FetchError, FetchErrorKind};
use crate::utils::normalize_value;

/// Default upstream base URL; endpoint names are appended directly
pub const DEFAULT_BASE_URL: &str = "https://sipedas.pertanian.go.id/api/wilayah/";

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const CLIENT_USER_AGENT: &str = concat!("wilayah/", env!("CARGO_PKG_VERSION"));

/// Ordered `(code, name)` pairs exactly as the upstream object listed them
pub type Listing = Vec<(String, String)>;

/// One listing endpoint per tree level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    ListProvinces,
    ListRegencies,
    ListDistricts,
    ListVillages,
}

impl Endpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ListProvinces => "list_pro",
            Self::ListRegencies => "list_kab",
            Self::ListDistricts => "list_kec",
            Self::ListVillages => "list_des",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Query scope of a listing request: the year plus any ancestor codes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Scope {
    pub year: i32,
    pub pro: Option<String>,
    pub kab: Option<String>,
    pub kec: Option<String>,
}

impl Scope {
    pub fn new(year: i32) -> Self {
        Self {
            year,
            pro: None,
            kab: None,
            kec: None,
        }
    }

    pub fn province(mut self, pro: impl Into<String>) -> Self {
        self.pro = Some(pro.into());
        self
    }

    pub fn regency(mut self, kab: impl Into<String>) -> Self {
        self.kab = Some(kab.into());
        self
    }

    pub fn district(mut self, kec: impl Into<String>) -> Self {
        self.kec = Some(kec.into());
        self
    }

    /// Query pairs in upstream parameter order
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("thn", self.year.to_string())];
        if let Some(pro) = &self.pro {
            pairs.push(("pro", pro.clone()));
        }
        if let Some(kab) = &self.kab {
            pairs.push(("kab", kab.clone()));
        }
        if let Some(kec) = &self.kec {
            pairs.push(("kec", kec.clone()));
        }
        pairs
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pairs = self.query_pairs();
        for (i, (key, value)) in pairs.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{key}={value}")?;
        }
        Ok(())
    }
}

/// Anything that can answer listing requests for the crawl engine
#[async_trait]
pub trait RegionSource: Send + Sync {
    /// Fetch one listing. Implementations must not issue a request once
    /// `cancel` has fired and should return [`FetchErrorKind::Cancelled`].
    async fn fetch_listing(
        &self,
        endpoint: Endpoint,
        scope: &Scope,
        cancel: &CancellationToken,
    ) -> Result<Listing, FetchError>;
}

/// reqwest-backed [`RegionSource`]
pub struct RegionFetcher {
    /// HTTP client with configured timeout and compression
    client: Client,

    /// Optional limiter; `None` means unlimited
    rate_limiter: Option<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,

    /// Base URL that endpoint names are appended to
    base_url: String,
}

impl RegionFetcher {
    /// Create a fetcher against the public API with default settings
    ///
    /// # Errors
    ///
    /// Returns the reqwest error if the HTTP client cannot be built
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_config(DEFAULT_BASE_URL, 0, DEFAULT_TIMEOUT)
    }

    /// Create a fetcher with a custom base URL, used against mock servers
    pub fn with_base_url(base_url: &str) -> Result<Self, reqwest::Error> {
        Self::with_config(base_url, 0, DEFAULT_TIMEOUT)
    }

    /// Create a fetcher with full configuration
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL that endpoint names are appended to
    /// * `requests_per_second` - Request ceiling; 0 disables rate limiting
    /// * `timeout` - Per-request timeout
    pub fn with_config(
        base_url: &str,
        requests_per_second: u32,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .default_headers(headers)
            .build()?;

        let rate_limiter =
            NonZeroU32::new(requests_per_second).map(|rps| RateLimiter::direct(Quota::per_second(rps)));

        Ok(Self {
            client,
            rate_limiter,
            base_url: base_url.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint_url(&self, endpoint: Endpoint) -> Result<url::Url, FetchErrorKind> {
        let raw = format!("{}{}", self.base_url, endpoint.as_str());
        url::Url::parse(&raw).map_err(|e| FetchErrorKind::InvalidUrl(format!("{raw}: {e}")))
    }

    async fn request(
        &self,
        endpoint: Endpoint,
        scope: &Scope,
        cancel: &CancellationToken,
    ) -> Result<Listing, FetchErrorKind> {
        if let Some(limiter) = &self.rate_limiter {
            tokio::select! {
                _ = cancel.cancelled() => return Err(FetchErrorKind::Cancelled),
                _ = limiter.until_ready() => {}
            }
        }

        if cancel.is_cancelled() {
            return Err(FetchErrorKind::Cancelled);
        }

        let url = self.endpoint_url(endpoint)?;
        tracing::debug!(endpoint = %endpoint, scope = %scope, "Fetching listing");

        let response = self
            .client
            .get(url)
            .query(&scope.query_pairs())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchErrorKind::Status(status.as_u16()));
        }

        let bytes = response.bytes().await?;
        let value: Value = serde_json::from_slice(&bytes).map_err(FetchErrorKind::Decode)?;

        parse_listing(value)
    }
}

#[async_trait]
impl RegionSource for RegionFetcher {
    async fn fetch_listing(
        &self,
        endpoint: Endpoint,
        scope: &Scope,
        cancel: &CancellationToken,
    ) -> Result<Listing, FetchError> {
        self.request(endpoint, scope, cancel)
            .await
            .map_err(|kind| FetchError::new(endpoint, scope, kind))
    }
}

/// Turn a decoded payload into an ordered listing
///
/// The payload must be an object of code to name. An empty array is what the
/// upstream returns for a parent without children and is read as an empty
/// listing. Non-string values are skipped.
pub fn parse_listing(value: Value) -> Result<Listing, FetchErrorKind> {
    match normalize_value(value) {
        Value::Object(map) => Ok(map
            .into_iter()
            .filter_map(|(code, name)| match name {
                Value::String(name) => Some((code, name)),
                other => {
                    tracing::debug!(code = %code, value = %other, "Skipping non-string listing entry");
                    None
                }
            })
            .collect()),
        Value::Array(items) if items.is_empty() => Ok(Vec::new()),
        other => Err(FetchErrorKind::Shape(json_kind(&other).to_string())),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
