//! Common test utilities
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use wilayah::crawler::fetcher::{Endpoint, Listing, RegionSource, Scope};
use wilayah::error::{FetchError, FetchErrorKind};
use wilayah::models::RegionData;

pub const YEAR: i32 = 2025;

/// `"pro/kab/kec"` for the ancestor codes present in `scope`
pub fn scope_key(scope: &Scope) -> String {
    [&scope.pro, &scope.kab, &scope.kec]
        .into_iter()
        .flatten()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("/")
}

/// In-memory [`RegionSource`] answering from scripted listings
///
/// Unscripted requests answer with an empty listing. Every request is
/// recorded, and the number of requests in flight is tracked so tests can
/// check how many regency chains ran at once.
#[derive(Default)]
pub struct ScriptedSource {
    listings: HashMap<(Endpoint, String), Listing>,
    failures: HashSet<(Endpoint, String)>,
    cancel_at: Option<(Endpoint, String)>,
    panic_at: Option<(Endpoint, String)>,
    panicked: AtomicBool,
    delay: Duration,
    calls: Mutex<Vec<(Endpoint, String)>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl<'a> ActiveGuard<'a> {
    fn enter(active: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self(active)
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn listing(mut self, endpoint: Endpoint, key: &str, entries: &[(&str, &str)]) -> Self {
        let listing = entries
            .iter()
            .map(|(code, name)| (code.to_string(), name.to_string()))
            .collect();
        self.listings.insert((endpoint, key.to_string()), listing);
        self
    }

    /// Answer `endpoint` at `key` with a 500
    pub fn fail(mut self, endpoint: Endpoint, key: &str) -> Self {
        self.failures.insert((endpoint, key.to_string()));
        self
    }

    /// Fire the caller's cancellation token when `endpoint` at `key` is requested
    pub fn cancel_at(mut self, endpoint: Endpoint, key: &str) -> Self {
        self.cancel_at = Some((endpoint, key.to_string()));
        self
    }

    /// Panic the first time `endpoint` at `key` is requested
    pub fn panic_once(mut self, endpoint: Endpoint, key: &str) -> Self {
        self.panic_at = Some((endpoint, key.to_string()));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Script a province with `regencies` regencies, each holding one
    /// district with two villages
    pub fn province(self, pro: &str, regencies: usize) -> Self {
        let kabs: Vec<(String, String)> = (1..=regencies)
            .map(|i| (format!("{i:02}"), format!("KAB {pro}{i:02}")))
            .collect();
        let kab_refs: Vec<(&str, &str)> = kabs
            .iter()
            .map(|(c, n)| (c.as_str(), n.as_str()))
            .collect();

        let mut source = self.listing(Endpoint::ListRegencies, pro, &kab_refs);
        for (kab, _) in &kabs {
            let regency_key = format!("{pro}/{kab}");
            source = source
                .listing(Endpoint::ListDistricts, &regency_key, &[("010", "KEC SATU")])
                .listing(
                    Endpoint::ListVillages,
                    &format!("{regency_key}/010"),
                    &[("001", "DESA SATU"), ("002", "DESA DUA")],
                );
        }
        source
    }

    pub fn calls(&self) -> Vec<(Endpoint, String)> {
        match self.calls.lock() {
            Ok(calls) => calls.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn call_count(&self, endpoint: Endpoint) -> usize {
        self.calls().iter().filter(|(e, _)| *e == endpoint).count()
    }

    pub fn was_called(&self, endpoint: Endpoint, key: &str) -> bool {
        self.calls().iter().any(|(e, k)| *e == endpoint && k == key)
    }

    pub fn peak_active(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RegionSource for ScriptedSource {
    async fn fetch_listing(
        &self,
        endpoint: Endpoint,
        scope: &Scope,
        cancel: &CancellationToken,
    ) -> Result<Listing, FetchError> {
        let cancelled = || FetchError::new(endpoint, scope, FetchErrorKind::Cancelled);

        if cancel.is_cancelled() {
            return Err(cancelled());
        }

        let key = scope_key(scope);
        self.calls.lock().unwrap().push((endpoint, key.clone()));
        let _active = ActiveGuard::enter(&self.active, &self.peak);

        if self
            .panic_at
            .as_ref()
            .is_some_and(|(e, k)| *e == endpoint && *k == key)
            && !self.panicked.swap(true, Ordering::SeqCst)
        {
            panic!("scripted panic at {endpoint:?} {key}");
        }

        if self
            .cancel_at
            .as_ref()
            .is_some_and(|(e, k)| *e == endpoint && *k == key)
        {
            cancel.cancel();
            return Err(cancelled());
        }

        if !self.delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(cancelled()),
                _ = tokio::time::sleep(self.delay) => {}
            }
        }

        if self.failures.contains(&(endpoint, key.clone())) {
            return Err(FetchError::new(endpoint, scope, FetchErrorKind::Status(500)));
        }

        Ok(self
            .listings
            .get(&(endpoint, key))
            .cloned()
            .unwrap_or_default())
    }
}

/// Province ids of a tree in order
pub fn province_ids(data: &RegionData) -> Vec<String> {
    data.pro.iter().map(|p| p.id.clone()).collect()
}
