//! Resumable parallel crawl of the region tree
//!
//! The engine walks province → regency → district → village. Provinces are
//! processed one at a time in upstream order; the regencies of a province are
//! spread over a fixed pool of worker tasks.
//!
//! # Architecture
//!
//! ```text
//!                         ┌──────────────┐
//!   checkpoint ─────────▶ │ orchestrator │ ──── list_pro
//!                         └──────┬───────┘
//!                                │ per province: list_kab
//!                        mpsc job queue (shared receiver)
//!                 ┌──────────────┼──────────────┐
//!           ┌─────▼────┐   ┌─────▼────┐   ┌─────▼────┐
//!           │ worker 0 │   │ worker 1 │   │ worker N │  list_kec, list_des
//!           └─────┬────┘   └─────┬────┘   └─────┬────┘
//!                 └──────────────┼──────────────┘
//!                        mpsc result channel
//!                                │
//!                         ┌──────▼───────┐
//!                         │ orchestrator │ ──▶ checkpoint + temp snapshot
//!                         └──────────────┘
//! ```
//!
//! Only the orchestrator touches the tree and the checkpoint files. Workers
//! build detached regency subtrees. A province is appended only when every
//! one of its regencies has been resolved or given up on; a province during
//! which cancellation was observed is discarded so the checkpoint only ever
//! holds complete provinces.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::crawler::fetcher::{Endpoint, Listing, RegionSource, Scope};
use crate::error::WilayahErrorTrait;
use crate::models::{District, Province, RegionCounts, RegionData, Regency, Village};
use crate::storage::checkpoint::{write_dataset, CheckpointKey, CheckpointStore};
use crate::utils::error::{CrawlError, FetchError, FetchErrorKind};

// ============================================================================
// Configuration
// ============================================================================

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Year sent as `thn` on every request
    pub year: i32,

    /// Number of regency workers per province
    pub max_workers: usize,

    /// Checkpoint key; defaults to today's date when the run starts
    pub checkpoint_key: Option<CheckpointKey>,
}

impl EngineConfig {
    pub fn new(year: i32, max_workers: usize) -> Self {
        Self {
            year,
            max_workers,
            checkpoint_key: None,
        }
    }
}

// ============================================================================
// Live State
// ============================================================================

/// Best-known state of a running crawl, readable from other tasks
#[derive(Debug, Clone, Default)]
pub struct LiveSnapshot {
    /// Tree as of the last completed province
    pub tree: Arc<RegionData>,
    pub checkpoint_file: Option<PathBuf>,
    pub temp_file: Option<PathBuf>,
    pub current_province: Option<String>,
}

/// Shared slot the engine publishes [`LiveSnapshot`]s into
#[derive(Debug, Default)]
pub struct LiveState {
    inner: RwLock<LiveSnapshot>,
}

impl LiveState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn snapshot(&self) -> LiveSnapshot {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn update(&self, f: impl FnOnce(&mut LiveSnapshot)) {
        match self.inner.write() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

// ============================================================================
// Report
// ============================================================================

/// How a crawl run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlOutcome {
    /// No pending provinces remain; final artifact written
    Completed,
    /// Stopped by cancellation after a best-effort checkpoint save
    Cancelled,
}

impl CrawlOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Summary of one crawl run
#[derive(Debug, Clone, Serialize)]
pub struct CrawlReport {
    pub outcome: CrawlOutcome,
    pub provinces_added: usize,
    pub provinces_skipped: usize,
    pub regencies_failed: usize,
    pub districts_failed: usize,
    pub checkpoint_write_failures: usize,
    /// Counts of the whole tree, including provinces from the checkpoint
    pub counts: RegionCounts,
    pub final_artifact: Option<PathBuf>,
}

#[derive(Debug, Default)]
struct RunTally {
    provinces_added: usize,
    provinces_skipped: usize,
    regencies_failed: usize,
    districts_failed: usize,
    checkpoint_write_failures: usize,
}

impl RunTally {
    fn into_report(
        self,
        outcome: CrawlOutcome,
        tree: &RegionData,
        final_artifact: Option<PathBuf>,
    ) -> CrawlReport {
        CrawlReport {
            outcome,
            provinces_added: self.provinces_added,
            provinces_skipped: self.provinces_skipped,
            regencies_failed: self.regencies_failed,
            districts_failed: self.districts_failed,
            checkpoint_write_failures: self.checkpoint_write_failures,
            counts: tree.counts(),
            final_artifact,
        }
    }
}

// ============================================================================
// Worker Messages
// ============================================================================

/// One regency to resolve
#[derive(Debug, Clone)]
struct RegencyJob {
    pro: String,
    kab: String,
    nama: String,
}

/// Result of one regency chain
#[derive(Debug)]
enum RegencyOutcome {
    /// Fully resolved; `districts_failed` districts kept with no villages
    Done {
        regency: Regency,
        districts_failed: usize,
    },
    /// District list could not be fetched; regency dropped
    Failed { kab: String },
    /// Cancellation observed; regency incomplete
    Cancelled { kab: String },
}

/// Result of one province pass
#[derive(Debug)]
struct ProvinceOutcome {
    province: Province,
    cancelled: bool,
    regencies_failed: usize,
    districts_failed: usize,
}

fn is_cancelled(err: &FetchError) -> bool {
    matches!(err.kind, FetchErrorKind::Cancelled)
}

// ============================================================================
// Engine
// ============================================================================

/// Crawl engine over any [`RegionSource`]
///
/// An engine is built for one run; the lifecycle controller creates a fresh
/// one for every start.
pub struct CrawlEngine<S: RegionSource + ?Sized + 'static> {
    source: Arc<S>,
    store: CheckpointStore,
    config: EngineConfig,
    live: Arc<LiveState>,
}

impl<S: RegionSource + ?Sized + 'static> CrawlEngine<S> {
    pub fn new(source: Arc<S>, store: CheckpointStore, config: EngineConfig) -> Self {
        Self {
            source,
            store,
            config,
            live: LiveState::new(),
        }
    }

    /// Publish progress into an existing live state slot
    pub fn with_live_state(mut self, live: Arc<LiveState>) -> Self {
        self.live = live;
        self
    }

    pub fn live_state(&self) -> Arc<LiveState> {
        Arc::clone(&self.live)
    }

    /// Run the crawl until every province is done or `cancel` fires
    ///
    /// # Errors
    ///
    /// - [`CrawlError::Checkpoint`] if the existing checkpoint is corrupt
    /// - [`CrawlError::ProvinceList`] if the province list cannot be fetched
    /// - [`CrawlError::FinalArtifact`] if the final artifact cannot be written
    pub async fn run(&self, cancel: CancellationToken) -> Result<CrawlReport, CrawlError> {
        let key = self
            .config
            .checkpoint_key
            .clone()
            .unwrap_or_else(CheckpointKey::today);
        let started: DateTime<Local> = Local::now();
        let checkpoint_path = self.store.checkpoint_path(&key);
        let temp_path = self.store.temp_snapshot_path(started);

        let mut tree = self.store.load(&key)?;
        let mut tally = RunTally::default();

        self.live.update(|live| {
            live.tree = Arc::new(tree.clone());
            live.checkpoint_file = Some(checkpoint_path.clone());
            live.temp_file = Some(temp_path.clone());
            live.current_province = None;
        });

        tracing::info!(
            checkpoint = %checkpoint_path.display(),
            resumed_provinces = tree.pro.len(),
            workers = self.config.max_workers,
            year = self.config.year,
            "Starting crawl"
        );

        let root = Scope::new(self.config.year);
        let provinces = match self
            .source
            .fetch_listing(Endpoint::ListProvinces, &root, &cancel)
            .await
        {
            Ok(list) => list,
            Err(e) if is_cancelled(&e) => {
                tracing::info!("Crawl cancelled before province list was fetched");
                return Ok(tally.into_report(CrawlOutcome::Cancelled, &tree, None));
            }
            Err(e) => return Err(CrawlError::ProvinceList(e)),
        };

        let completed = tree.province_ids();
        let pending: Listing = provinces
            .into_iter()
            .filter(|(id, _)| !completed.contains(id))
            .collect();

        tracing::info!(
            completed = completed.len(),
            pending = pending.len(),
            "Province list fetched"
        );

        let mut cancelled = false;

        for (pro_id, pro_name) in pending {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            self.live
                .update(|live| live.current_province = Some(pro_id.clone()));

            let scope = root.clone().province(&pro_id);
            let regencies = match self
                .source
                .fetch_listing(Endpoint::ListRegencies, &scope, &cancel)
                .await
            {
                Ok(list) => list,
                Err(e) if is_cancelled(&e) => {
                    cancelled = true;
                    break;
                }
                Err(e) => {
                    tracing::warn!(
                        province = %pro_id,
                        error = %e,
                        category = e.category().as_str(),
                        recoverable = e.is_recoverable(),
                        "Skipping province, regency list failed"
                    );
                    tally.provinces_skipped += 1;
                    continue;
                }
            };

            tracing::info!(
                province = %pro_id,
                nama = %pro_name,
                regencies = regencies.len(),
                "Crawling province"
            );

            let outcome = self
                .crawl_province(&pro_id, &pro_name, regencies, &cancel)
                .await;

            tally.regencies_failed += outcome.regencies_failed;
            tally.districts_failed += outcome.districts_failed;

            if outcome.cancelled {
                cancelled = true;
                tracing::info!(province = %pro_id, "Cancelled mid-province, discarding partial province");
            } else {
                let counts = RegionData {
                    pro: vec![outcome.province.clone()],
                }
                .counts();
                tree.pro.push(outcome.province);
                tally.provinces_added += 1;
                tracing::info!(
                    province = %pro_id,
                    regencies = counts.regencies,
                    districts = counts.districts,
                    villages = counts.villages,
                    total_provinces = tree.pro.len(),
                    "Province completed"
                );
            }

            tally.checkpoint_write_failures += self.persist(&key, &temp_path, &tree);

            let snapshot = Arc::new(tree.clone());
            self.live.update(|live| {
                live.tree = snapshot;
                live.current_province = None;
            });

            if cancelled {
                break;
            }
        }

        self.live.update(|live| live.current_province = None);

        if cancelled {
            tracing::info!(
                provinces = tree.pro.len(),
                checkpoint = %checkpoint_path.display(),
                "Crawl cancelled, checkpoint retained for resume"
            );
            return Ok(tally.into_report(CrawlOutcome::Cancelled, &tree, None));
        }

        let final_path = self.store.final_artifact_path(&key);
        write_dataset(&final_path, &tree).map_err(CrawlError::FinalArtifact)?;

        if let Err(e) = self.store.delete(&key) {
            tracing::warn!(error = %e, "Failed to delete checkpoint after completion");
        }

        let report = tally.into_report(CrawlOutcome::Completed, &tree, Some(final_path.clone()));
        tracing::info!(
            path = %final_path.display(),
            provinces = report.counts.provinces,
            regencies = report.counts.regencies,
            districts = report.counts.districts,
            villages = report.counts.villages,
            "Crawl completed"
        );
        Ok(report)
    }

    /// Save checkpoint and temp snapshot; returns the number of failed writes
    fn persist(&self, key: &CheckpointKey, temp_path: &std::path::Path, tree: &RegionData) -> usize {
        let mut failures = 0;

        if let Err(e) = self.store.save(key, tree) {
            tracing::warn!(error = %e, recoverable = e.is_recoverable(), "Checkpoint write failed");
            failures += 1;
        }

        if let Err(e) = write_dataset(temp_path, tree) {
            tracing::warn!(error = %e, recoverable = e.is_recoverable(), "Temp snapshot write failed");
            failures += 1;
        }

        failures
    }

    /// Resolve every regency of one province on the worker pool
    async fn crawl_province(
        &self,
        pro_id: &str,
        pro_name: &str,
        regencies: Listing,
        cancel: &CancellationToken,
    ) -> ProvinceOutcome {
        let mut province = Province::new(pro_id, pro_name);
        let total = regencies.len();

        if total == 0 {
            return ProvinceOutcome {
                province,
                cancelled: cancel.is_cancelled(),
                regencies_failed: 0,
                districts_failed: 0,
            };
        }

        let (job_tx, job_rx) = mpsc::channel::<RegencyJob>(total);
        let (result_tx, mut result_rx) = mpsc::channel::<RegencyOutcome>(total);

        for (kab, nama) in regencies {
            let job = RegencyJob {
                pro: pro_id.to_string(),
                kab,
                nama,
            };
            if job_tx.send(job).await.is_err() {
                tracing::error!(province = %pro_id, "Regency job queue closed");
                break;
            }
        }
        drop(job_tx);

        let handles = self.spawn_workers(job_rx, result_tx, cancel, total);

        let mut cancelled = false;
        let mut regencies_failed = 0;
        let mut districts_failed = 0;
        let mut received = 0;

        while let Some(outcome) = result_rx.recv().await {
            received += 1;
            match outcome {
                RegencyOutcome::Done {
                    regency,
                    districts_failed: failed,
                } => {
                    districts_failed += failed;
                    province.kab.push(regency);
                }
                RegencyOutcome::Failed { kab } => {
                    tracing::debug!(province = %pro_id, regency = %kab, "Regency dropped");
                    regencies_failed += 1;
                }
                RegencyOutcome::Cancelled { kab } => {
                    tracing::debug!(province = %pro_id, regency = %kab, "Regency cancelled");
                    cancelled = true;
                }
            }
        }

        for joined in futures::future::join_all(handles).await {
            if let Err(e) = joined {
                tracing::error!(province = %pro_id, error = %e, "Regency worker panicked");
            }
        }

        if received < total {
            tracing::error!(
                province = %pro_id,
                missing = total - received,
                "Regencies lost to failed workers"
            );
            regencies_failed += total - received;
        }

        ProvinceOutcome {
            province,
            cancelled,
            regencies_failed,
            districts_failed,
        }
    }

    /// Spawn the worker tasks pulling from the shared job queue
    fn spawn_workers(
        &self,
        job_rx: mpsc::Receiver<RegencyJob>,
        result_tx: mpsc::Sender<RegencyOutcome>,
        cancel: &CancellationToken,
        jobs: usize,
    ) -> Vec<JoinHandle<()>> {
        let job_rx = Arc::new(tokio::sync::Mutex::new(job_rx));
        let workers = self.config.max_workers.clamp(1, jobs.max(1));
        let mut handles = Vec::with_capacity(workers);

        for worker_id in 0..workers {
            let job_rx = Arc::clone(&job_rx);
            let result_tx = result_tx.clone();
            let source = Arc::clone(&self.source);
            let cancel = cancel.clone();
            let year = self.config.year;

            let handle = tokio::spawn(async move {
                loop {
                    let job = {
                        let mut rx = job_rx.lock().await;
                        rx.recv().await
                    };

                    let Some(job) = job else {
                        break; // Queue drained
                    };

                    let outcome = if cancel.is_cancelled() {
                        RegencyOutcome::Cancelled { kab: job.kab }
                    } else {
                        crawl_regency(source.as_ref(), year, job, &cancel).await
                    };

                    if result_tx.send(outcome).await.is_err() {
                        tracing::error!(worker_id, "Result channel closed");
                        break;
                    }
                }

                tracing::debug!(worker_id, "Regency worker shutting down");
            });

            handles.push(handle);
        }

        handles
    }
}

/// Resolve one regency: its districts, then each district's villages
async fn crawl_regency<S: RegionSource + ?Sized>(
    source: &S,
    year: i32,
    job: RegencyJob,
    cancel: &CancellationToken,
) -> RegencyOutcome {
    let scope = Scope::new(year).province(&job.pro).regency(&job.kab);

    let districts = match source
        .fetch_listing(Endpoint::ListDistricts, &scope, cancel)
        .await
    {
        Ok(list) => list,
        Err(e) if is_cancelled(&e) => return RegencyOutcome::Cancelled { kab: job.kab },
        Err(e) => {
            tracing::warn!(
                province = %job.pro,
                regency = %job.kab,
                error = %e,
                category = e.category().as_str(),
                recoverable = e.is_recoverable(),
                "Dropping regency, district list failed"
            );
            return RegencyOutcome::Failed { kab: job.kab };
        }
    };

    let mut regency = Regency::new(&job.kab, job.nama);
    let mut districts_failed = 0;

    for (kec, nama) in districts {
        if cancel.is_cancelled() {
            return RegencyOutcome::Cancelled { kab: job.kab };
        }

        let mut district = District::new(&kec, nama);
        let village_scope = scope.clone().district(&kec);

        match source
            .fetch_listing(Endpoint::ListVillages, &village_scope, cancel)
            .await
        {
            Ok(villages) => {
                district.des = villages
                    .into_iter()
                    .map(|(id, nama)| Village::new(id, nama))
                    .collect();
            }
            Err(e) if is_cancelled(&e) => return RegencyOutcome::Cancelled { kab: job.kab },
            Err(e) => {
                tracing::warn!(
                    province = %job.pro,
                    regency = %job.kab,
                    district = %kec,
                    error = %e,
                    category = e.category().as_str(),
                    recoverable = e.is_recoverable(),
                    "Village list failed, keeping district without villages"
                );
                districts_failed += 1;
            }
        }

        regency.kec.push(district);
    }

    tracing::debug!(
        province = %job.pro,
        regency = %job.kab,
        districts = regency.kec.len(),
        "Regency resolved"
    );

    RegencyOutcome::Done {
        regency,
        districts_failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_state_defaults() {
        let live = LiveState::new();
        let snap = live.snapshot();
        assert!(snap.tree.is_empty());
        assert!(snap.checkpoint_file.is_none());
    }

    #[test]
    fn test_live_state_update() {
        let live = LiveState::new();
        live.update(|s| s.current_province = Some("11".into()));
        assert_eq!(live.snapshot().current_province.as_deref(), Some("11"));
    }

    #[test]
    fn test_report_serializes_outcome() {
        let report = RunTally::default().into_report(CrawlOutcome::Cancelled, &RegionData::new(), None);
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["outcome"], "cancelled");
        assert_eq!(value["counts"]["provinces"], 0);
    }
}
