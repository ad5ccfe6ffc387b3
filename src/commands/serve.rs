use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;

use wilayah::config::Config;
use wilayah::crawler::lifecycle::shutdown_signal;
use wilayah::server::WilayahServer;

use super::build_controller;

/// Run the lookup and crawl control API until Ctrl-C or SIGTERM
pub async fn serve(config: Config, bind: Option<String>) -> Result<()> {
    let bind = bind.unwrap_or_else(|| config.server.bind.clone());
    let bind_address: SocketAddr = bind
        .parse()
        .with_context(|| format!("Invalid bind address: {bind}"))?;

    println!("Starting Wilayah API Server");
    println!("===========================");
    println!("  Bind: {bind_address}");
    println!("  Output: {}", config.storage.output_dir.display());
    println!(
        "  API key: {}",
        if config.server.api_key.is_some() {
            "configured"
        } else {
            "generated (see log)"
        }
    );
    println!();

    let controller = Arc::new(build_controller(&config)?);
    let server = WilayahServer::new(
        bind_address,
        &config.storage.output_dir,
        controller,
        config.server.api_key.clone(),
    );

    if !server.load_dataset().await {
        println!("No dataset found; lookups return 503 until a crawl completes.");
        println!();
    }

    println!("API Endpoints:");
    println!("  GET  /api/v1/health              - Health check");
    println!("  GET  /api/v1/stats               - Node counts");
    println!("  GET  /api/v1/provinsi            - All provinces");
    println!("  GET  /api/v1/kabupaten?pro=      - Regencies of a province");
    println!("  GET  /api/v1/kecamatan?pro=&kab= - Districts of a regency");
    println!("  GET  /api/v1/desa?pro=&kab=&kec= - Villages of a district");
    println!("  GET  /api/v1/info/{{code}}         - Node detail by code");
    println!("  GET  /api/v1/scraper/info        - Control API usage");
    println!("  POST /api/v1/scraper/start       - Start a crawl (key)");
    println!("  POST /api/v1/scraper/stop        - Stop the crawl (key)");
    println!("  GET  /api/v1/scraper/status      - Crawl running? (key)");
    println!("  GET  /api/v1/scraper/progress    - Crawl progress (key)");
    println!();

    server
        .start_with_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}
