use anyhow::{Context, Result};
use std::sync::Arc;

use wilayah::config::Config;
use wilayah::crawler::engine::{CrawlOutcome, CrawlReport};
use wilayah::crawler::lifecycle::shutdown_signal;
use wilayah::error::WilayahErrorTrait;

use super::build_controller;

/// Run one crawl in the foreground
///
/// Ctrl-C or SIGTERM cancels the run; the command still waits for the checkpoint of the
/// last finished province to be written before returning.
pub async fn crawl(config: Config, workers: usize) -> Result<()> {
    println!("Starting Wilayah Crawl");
    println!("======================");
    println!("  Source: {}", config.crawler.base_url);
    println!("  Year: {}", config.crawler.year);
    println!("  Workers: {workers}");
    println!("  Output: {}", config.storage.output_dir.display());
    println!();

    let controller = Arc::new(build_controller(&config)?);
    controller
        .start(workers)
        .context("Failed to start crawl")?;

    let interrupt = Arc::clone(&controller);
    let signal = tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Stopping crawl, saving checkpoint");
        interrupt.stop();
    });

    let result = controller.wait().await;
    signal.abort();

    let report = match result.context("Crawl was not running")? {
        Ok(report) => report,
        Err(e) => {
            if e.is_recoverable() {
                println!(
                    "Crawl failed ({}); run again to resume from the checkpoint",
                    e.category().as_str()
                );
            }
            return Err(e).context("Crawl failed");
        }
    };

    print_report(&report);
    Ok(())
}

fn print_report(report: &CrawlReport) {
    println!();
    match report.outcome {
        CrawlOutcome::Completed => println!("Crawl completed"),
        CrawlOutcome::Cancelled => println!("Crawl interrupted, progress kept in checkpoint"),
    }
    println!("  Provinces added: {}", report.provinces_added);
    println!("  Provinces skipped: {}", report.provinces_skipped);
    println!("  Regencies failed: {}", report.regencies_failed);
    println!("  Districts without villages: {}", report.districts_failed);
    if report.checkpoint_write_failures > 0 {
        println!("  Checkpoint write failures: {}", report.checkpoint_write_failures);
    }
    println!(
        "  Totals: {} provinsi, {} kabupaten, {} kecamatan, {} desa",
        report.counts.provinces,
        report.counts.regencies,
        report.counts.districts,
        report.counts.villages
    );
    if let Some(path) = &report.final_artifact {
        println!("  Dataset: {}", path.display());
    }
}
