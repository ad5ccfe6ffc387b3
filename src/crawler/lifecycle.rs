//! Start/stop control over background crawl runs
//!
//! [`CrawlController`] is what the CLI and the HTTP control plane talk to.
//! Every start builds a fresh [`CrawlEngine`] and [`CancellationToken`] and
//! keeps the task handle, so a stop or an interrupt can wait for the final
//! checkpoint save before the process exits.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::crawler::engine::{CrawlEngine, CrawlReport, EngineConfig, LiveState};
use crate::crawler::fetcher::RegionSource;
use crate::error::{Error, Result, WilayahErrorTrait};
use crate::models::RegionCounts;
use crate::storage::checkpoint::{CheckpointKey, CheckpointStore};
use crate::utils::error::{CrawlError, LifecycleError};

/// Acknowledgement of a started crawl
#[derive(Debug, Clone, Serialize)]
pub struct StartAck {
    pub workers: usize,
    pub year: i32,
}

/// Result of a stop request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopOutcome {
    /// Nothing was running
    AlreadyStopped,
    /// Cancellation signalled; the run winds down on its own
    Stopping,
}

/// Best-known crawl progress
#[derive(Debug, Clone, Serialize)]
pub struct Progress {
    pub running: bool,
    #[serde(flatten)]
    pub counts: RegionCounts,
    pub checkpoint_file: Option<PathBuf>,
    pub temp_file: Option<PathBuf>,
    pub current_province: Option<String>,
}

type CrawlHandle = JoinHandle<std::result::Result<CrawlReport, CrawlError>>;

struct RunningCrawl {
    cancel: CancellationToken,
    finished: Arc<AtomicBool>,
    /// Taken by whoever awaits the run
    handle: Option<CrawlHandle>,
}

impl RunningCrawl {
    fn is_live(&self) -> bool {
        !self.finished.load(Ordering::Acquire)
    }
}

/// Marks the run finished when the task ends, including by panic
struct FinishOnDrop(Arc<AtomicBool>);

impl Drop for FinishOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Owns at most one crawl run at a time
pub struct CrawlController<S: RegionSource + ?Sized + 'static> {
    source: Arc<S>,
    store: CheckpointStore,
    year: i32,
    checkpoint_key: Option<CheckpointKey>,
    live: Arc<LiveState>,
    running: Mutex<Option<RunningCrawl>>,
    reports: watch::Sender<Option<CrawlReport>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl<S: RegionSource + ?Sized + 'static> CrawlController<S> {
    pub fn new(source: Arc<S>, store: CheckpointStore, year: i32) -> Self {
        let (reports, _) = watch::channel(None);
        Self {
            source,
            store,
            year,
            checkpoint_key: None,
            live: LiveState::new(),
            running: Mutex::new(None),
            reports,
        }
    }

    /// Pin the checkpoint key instead of using the date at each start
    pub fn with_checkpoint_key(mut self, key: CheckpointKey) -> Self {
        self.checkpoint_key = Some(key);
        self
    }

    /// Start a crawl in the background with `workers` regency workers
    pub fn start(&self, workers: usize) -> std::result::Result<StartAck, LifecycleError> {
        if workers == 0 {
            return Err(LifecycleError::InvalidWorkers(workers));
        }

        let mut running = lock(&self.running);
        if running.as_ref().is_some_and(RunningCrawl::is_live) {
            return Err(LifecycleError::AlreadyRunning);
        }

        let engine = CrawlEngine::new(
            Arc::clone(&self.source),
            self.store.clone(),
            EngineConfig {
                year: self.year,
                max_workers: workers,
                checkpoint_key: self.checkpoint_key.clone(),
            },
        )
        .with_live_state(Arc::clone(&self.live));

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let reports = self.reports.clone();
        let finished = Arc::new(AtomicBool::new(false));
        let done = Arc::clone(&finished);

        let handle = tokio::spawn(async move {
            let _finished = FinishOnDrop(done);
            let result = engine.run(token).await;
            match &result {
                Ok(report) => {
                    reports.send_replace(Some(report.clone()));
                }
                Err(e) => tracing::error!(
                    error = %e,
                    category = e.category().as_str(),
                    recoverable = e.is_recoverable(),
                    "Crawl failed"
                ),
            }
            result
        });

        *running = Some(RunningCrawl {
            cancel,
            finished,
            handle: Some(handle),
        });

        tracing::info!(workers, year = self.year, "Crawl started");
        Ok(StartAck {
            workers,
            year: self.year,
        })
    }

    /// Signal the running crawl to stop; does not wait
    pub fn stop(&self) -> StopOutcome {
        let running = lock(&self.running);
        match running.as_ref() {
            Some(run) if run.is_live() => {
                run.cancel.cancel();
                tracing::info!("Crawl stop requested");
                StopOutcome::Stopping
            }
            _ => StopOutcome::AlreadyStopped,
        }
    }

    pub fn status(&self) -> bool {
        lock(&self.running)
            .as_ref()
            .is_some_and(RunningCrawl::is_live)
    }

    pub fn progress(&self) -> Progress {
        let snapshot = self.live.snapshot();
        Progress {
            running: self.status(),
            counts: snapshot.tree.counts(),
            checkpoint_file: snapshot.checkpoint_file,
            temp_file: snapshot.temp_file,
            current_province: snapshot.current_province,
        }
    }

    /// Most recent finished run, if any
    pub fn last_report(&self) -> Option<CrawlReport> {
        self.reports.borrow().clone()
    }

    /// Receiver that observes every finished run
    pub fn subscribe(&self) -> watch::Receiver<Option<CrawlReport>> {
        self.reports.subscribe()
    }

    /// Wait for the current run without cancelling it
    pub async fn wait(&self) -> Option<Result<CrawlReport>> {
        let handle = lock(&self.running).as_mut()?.handle.take()?;
        Some(Self::join(handle).await)
    }

    /// Cancel the current run and wait until its final save has finished
    pub async fn shutdown(&self) -> Option<Result<CrawlReport>> {
        let handle = {
            let mut running = lock(&self.running);
            let run = running.as_mut()?;
            run.cancel.cancel();
            run.handle.take()?
        };
        let result = Self::join(handle).await;
        if let Ok(report) = &result {
            tracing::info!(
                outcome = ?report.outcome,
                provinces = report.counts.provinces,
                "Crawl shut down"
            );
        }
        Some(result)
    }

    async fn join(handle: CrawlHandle) -> Result<CrawlReport> {
        match handle.await {
            Ok(result) => result.map_err(Error::from),
            Err(e) => Err(LifecycleError::Join(e.to_string()).into()),
        }
    }
}

/// Resolves on Ctrl-C or, on unix, SIGTERM
///
/// Both signals take the same path: the caller stops the crawl and waits for
/// its final checkpoint save. A handler that fails to install is logged and
/// never fires.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl-C"),
        _ = terminate => tracing::info!("Received terminate signal"),
    }
}
