//! Integration tests for starting and stopping background crawls

mod common;

use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use common::{province_ids, ScriptedSource, YEAR};
use wilayah::crawler::engine::CrawlOutcome;
use wilayah::crawler::fetcher::Endpoint;
use wilayah::crawler::lifecycle::{CrawlController, StopOutcome};
use wilayah::error::{Error, LifecycleError};
use wilayah::storage::{CheckpointKey, CheckpointStore};

fn key() -> CheckpointKey {
    CheckpointKey::from_date(chrono::NaiveDate::from_ymd_opt(2025, 2, 1).unwrap())
}

fn slow_source() -> ScriptedSource {
    ScriptedSource::new()
        .listing(
            Endpoint::ListProvinces,
            "",
            &[("11", "ACEH"), ("12", "SUMATERA UTARA"), ("13", "SUMATERA BARAT")],
        )
        .province("11", 2)
        .province("12", 4)
        .province("13", 4)
        .with_delay(Duration::from_millis(30))
}

fn controller(source: ScriptedSource, dir: &TempDir) -> CrawlController<ScriptedSource> {
    CrawlController::new(Arc::new(source), CheckpointStore::new(dir.path()), YEAR)
        .with_checkpoint_key(key())
}

#[tokio::test]
async fn test_start_rejects_zero_workers() {
    let dir = TempDir::new().unwrap();
    let controller = controller(slow_source(), &dir);

    assert!(matches!(
        controller.start(0),
        Err(LifecycleError::InvalidWorkers(0))
    ));
    assert!(!controller.status());
}

#[tokio::test]
async fn test_second_start_while_running_is_rejected() {
    let dir = TempDir::new().unwrap();
    let controller = controller(slow_source(), &dir);

    let ack = controller.start(2).unwrap();
    assert_eq!(ack.workers, 2);
    assert_eq!(ack.year, YEAR);
    assert!(controller.status());

    assert!(matches!(
        controller.start(2),
        Err(LifecycleError::AlreadyRunning)
    ));

    controller.shutdown().await.unwrap().unwrap();
}

#[tokio::test]
async fn test_wait_runs_to_completion() {
    let dir = TempDir::new().unwrap();
    let controller = controller(
        ScriptedSource::new()
            .listing(Endpoint::ListProvinces, "", &[("11", "ACEH")])
            .province("11", 2),
        &dir,
    );

    controller.start(2).unwrap();
    let report = controller.wait().await.unwrap().unwrap();

    assert_eq!(report.outcome, CrawlOutcome::Completed);
    assert!(!controller.status());
    assert_eq!(controller.last_report().unwrap().outcome, CrawlOutcome::Completed);

    let progress = controller.progress();
    assert!(!progress.running);
    assert_eq!(progress.counts.provinces, 1);
    assert_eq!(progress.counts.villages, 4);
}

#[tokio::test]
async fn test_stop_cancels_and_keeps_checkpoint() {
    let dir = TempDir::new().unwrap();
    let controller = controller(slow_source(), &dir);

    assert_eq!(controller.stop(), StopOutcome::AlreadyStopped);

    controller.start(2).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(controller.stop(), StopOutcome::Stopping);

    let report = controller.wait().await.unwrap().unwrap();
    assert_eq!(report.outcome, CrawlOutcome::Cancelled);
    assert_eq!(controller.stop(), StopOutcome::AlreadyStopped);

    let checkpoint = CheckpointStore::new(dir.path()).load(&key()).unwrap();
    assert_eq!(checkpoint.pro.len(), report.counts.provinces);
    assert!(checkpoint.pro.len() < 3);
}

#[tokio::test]
async fn test_restart_after_stop_resumes() {
    let dir = TempDir::new().unwrap();
    let controller = controller(slow_source(), &dir);

    controller.start(2).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    controller.shutdown().await.unwrap().unwrap();

    controller.start(4).unwrap();
    let report = controller.wait().await.unwrap().unwrap();

    assert_eq!(report.outcome, CrawlOutcome::Completed);
    let data = wilayah::storage::read_dataset(&report.final_artifact.unwrap()).unwrap();
    assert_eq!(province_ids(&data), vec!["11", "12", "13"]);
}

#[tokio::test]
async fn test_shutdown_without_run() {
    let dir = TempDir::new().unwrap();
    let controller = controller(slow_source(), &dir);

    assert!(controller.shutdown().await.is_none());
    assert!(controller.wait().await.is_none());
}

#[tokio::test]
async fn test_subscribers_see_finished_runs() {
    let dir = TempDir::new().unwrap();
    let controller = controller(
        ScriptedSource::new()
            .listing(Endpoint::ListProvinces, "", &[("11", "ACEH")])
            .province("11", 1),
        &dir,
    );
    let mut reports = controller.subscribe();

    controller.start(1).unwrap();
    reports.changed().await.unwrap();

    let report = reports.borrow().clone().unwrap();
    assert_eq!(report.outcome, CrawlOutcome::Completed);
    assert!(report.final_artifact.is_some());
}

#[tokio::test]
async fn test_panicked_run_releases_controller() {
    let dir = TempDir::new().unwrap();
    let controller = controller(
        ScriptedSource::new()
            .listing(Endpoint::ListProvinces, "", &[("11", "ACEH")])
            .province("11", 2)
            .panic_once(Endpoint::ListProvinces, ""),
        &dir,
    );

    controller.start(2).unwrap();
    for _ in 0..100 {
        if !controller.status() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!controller.status());
    assert_eq!(controller.stop(), StopOutcome::AlreadyStopped);

    let result = controller.wait().await.unwrap();
    assert!(matches!(
        result,
        Err(Error::Lifecycle(LifecycleError::Join(_)))
    ));

    controller.start(2).unwrap();
    let report = controller.wait().await.unwrap().unwrap();
    assert_eq!(report.outcome, CrawlOutcome::Completed);
    assert_eq!(report.counts.provinces, 1);
}
