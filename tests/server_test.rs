//! Route tests for the lookup and crawl control API
//!
//! Requests are driven through the router with `tower::ServiceExt::oneshot`.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

use common::{ScriptedSource, YEAR};
use wilayah::crawler::fetcher::{Endpoint, RegionSource};
use wilayah::crawler::lifecycle::CrawlController;
use wilayah::models::{District, Province, RegionData, Regency, Village};
use wilayah::server::{build_router, AppState};
use wilayah::storage::CheckpointStore;

const KEY: &str = "secret-key";

fn dataset() -> RegionData {
    let mut district = District::new("010", "TANETE RIATTANG");
    district.des.push(Village::new("001", "BULU TEMPE"));
    district.des.push(Village::new("002", "WATAMPONE"));

    let mut regency = Regency::new("08", "BONE");
    regency.kec.push(district);

    let mut province = Province::new("73", "SULAWESI SELATAN");
    province.kab.push(regency);

    RegionData {
        pro: vec![Province::new("11", "ACEH"), province],
    }
}

fn state(dir: &TempDir, source: ScriptedSource, api_key: Option<&str>) -> AppState {
    let source: Arc<dyn RegionSource> = Arc::new(source);
    let controller = CrawlController::new(source, CheckpointStore::new(dir.path()), YEAR);
    AppState::new(Arc::new(controller), api_key.map(String::from))
}

async fn loaded_router(dir: &TempDir) -> Router {
    let state = state(dir, ScriptedSource::new(), Some(KEY));
    state.set_dataset(dataset()).await;
    build_router(state)
}

async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

async fn get(router: Router, uri: &str) -> (StatusCode, Value) {
    send(router, Request::get(uri).body(Body::empty()).unwrap()).await
}

#[tokio::test]
async fn test_health_without_dataset() {
    let dir = TempDir::new().unwrap();
    let router = build_router(state(&dir, ScriptedSource::new(), Some(KEY)));

    let (status, body) = get(router, "/api/v1/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "OK");
    assert_eq!(body["dataset_loaded"], false);
    assert_eq!(body["data_count"]["provinces"], 0);
}

#[tokio::test]
async fn test_lookups_without_dataset_are_unavailable() {
    let dir = TempDir::new().unwrap();
    let router = build_router(state(&dir, ScriptedSource::new(), Some(KEY)));

    for uri in ["/api/v1/provinsi", "/api/v1/stats", "/api/v1/kabupaten?pro=73", "/api/v1/info/73"] {
        let (status, body) = get(router.clone(), uri).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE, "{uri}");
        assert_eq!(body["error"], "Dataset not loaded. Run a crawl first");
    }
}

#[tokio::test]
async fn test_provinsi_in_dataset_order() {
    let dir = TempDir::new().unwrap();
    let (status, body) = get(loaded_router(&dir).await, "/api/v1/provinsi").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!([
            {"id": "11", "nama": "ACEH"},
            {"id": "73", "nama": "SULAWESI SELATAN"}
        ])
    );
}

#[tokio::test]
async fn test_stats_counts() {
    let dir = TempDir::new().unwrap();
    let (status, body) = get(loaded_router(&dir).await, "/api/v1/stats").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"provinces": 2, "kabupaten": 1, "kecamatan": 1, "desa": 2})
    );
}

#[tokio::test]
async fn test_kabupaten_lookup() {
    let dir = TempDir::new().unwrap();
    let router = loaded_router(&dir).await;

    let (status, body) = get(router.clone(), "/api/v1/kabupaten?pro=73").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([{"id": "08", "nama": "BONE"}]));

    let (status, body) = get(router.clone(), "/api/v1/kabupaten").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Parameter 'pro' is required");

    let (status, body) = get(router, "/api/v1/kabupaten?pro=99").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Province not found");
}

#[tokio::test]
async fn test_kecamatan_by_segments_or_combined_code() {
    let dir = TempDir::new().unwrap();
    let router = loaded_router(&dir).await;
    let expected = json!([{"id": "010", "nama": "TANETE RIATTANG"}]);

    let (status, body) = get(router.clone(), "/api/v1/kecamatan?pro=73&kab=08").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, expected);

    let (status, body) = get(router.clone(), "/api/v1/kecamatan?kec=7308").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, expected);

    let (status, _) = get(router.clone(), "/api/v1/kecamatan?pro=73").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = get(router, "/api/v1/kecamatan?kec=7399").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Kabupaten/Kota not found");
}

#[tokio::test]
async fn test_desa_by_segments_or_combined_code() {
    let dir = TempDir::new().unwrap();
    let router = loaded_router(&dir).await;

    let (status, body) = get(router.clone(), "/api/v1/desa?pro=73&kab=08&kec=010").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (status, body) = get(router.clone(), "/api/v1/desa?desa=7308010").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[1], json!({"id": "002", "nama": "WATAMPONE"}));

    let (status, body) = get(router.clone(), "/api/v1/desa?pro=73&kab=08&kec=999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Kecamatan not found");

    let (status, _) = get(router, "/api/v1/desa?desa=73").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_invalid_combined_code_is_rejected() {
    let dir = TempDir::new().unwrap();
    let router = loaded_router(&dir).await;

    // A malformed combined code wins over valid segment parameters
    let (status, body) = get(router.clone(), "/api/v1/kecamatan?kec=73x8&pro=73&kab=08").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Code must be numeric: 73x8");

    let (status, body) = get(router.clone(), "/api/v1/desa?desa=73080").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Invalid code length 5."));

    let (status, body) = get(router, "/api/v1/kecamatan?kec=73").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Parameter 'kec' must be a 4-digit kabupaten code");
}

#[tokio::test]
async fn test_info_resolves_ancestors() {
    let dir = TempDir::new().unwrap();
    let router = loaded_router(&dir).await;

    let (status, body) = get(router.clone(), "/api/v1/info/7308010002").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "type": "desa",
            "id": "002",
            "nama": "WATAMPONE",
            "provinsi": {"id": "73", "nama": "SULAWESI SELATAN"},
            "kabupaten": {"id": "08", "nama": "BONE"},
            "kecamatan": {"id": "010", "nama": "TANETE RIATTANG"}
        })
    );

    let (status, body) = get(router.clone(), "/api/v1/info/73").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["type"], "provinsi");
    assert_eq!(body["children"], 1);

    let (status, body) = get(router.clone(), "/api/v1/info/7308").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["type"], "kabupaten");
    assert_eq!(body["provinsi"]["id"], "73");

    let (status, _) = get(router.clone(), "/api/v1/info/7308010999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get(router.clone(), "/api/v1/info/730").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get(router, "/api/v1/info/73ab").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_scraper_info_is_public() {
    let dir = TempDir::new().unwrap();
    let (status, body) = get(loaded_router(&dir).await, "/api/v1/scraper/info").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["api_key_required"], true);
}

#[tokio::test]
async fn test_control_endpoints_require_key() {
    let dir = TempDir::new().unwrap();
    let router = loaded_router(&dir).await;

    let (status, body) = get(router.clone(), "/api/v1/scraper/status").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].as_str().unwrap().contains("X-API-Key"));

    let request = Request::get("/api/v1/scraper/status")
        .header("X-API-Key", "wrong")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(router.clone(), request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Invalid API key");

    let request = Request::get("/api/v1/scraper/status")
        .header("X-API-Key", KEY)
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(router.clone(), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "stopped", "running": false}));

    let (status, _) = get(router, &format!("/api/v1/scraper/progress?api_key={KEY}")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_control_endpoints_open_without_configured_key() {
    let dir = TempDir::new().unwrap();
    let router = build_router(state(&dir, ScriptedSource::new(), None));

    let (status, body) = get(router.clone(), "/api/v1/scraper/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["running"], false);

    let (_, body) = get(router, "/api/v1/scraper/info").await;
    assert_eq!(body["api_key_required"], false);
}

#[tokio::test]
async fn test_start_stop_through_api() {
    let dir = TempDir::new().unwrap();
    let source = ScriptedSource::new()
        .listing(Endpoint::ListProvinces, "", &[("11", "ACEH"), ("12", "SUMATERA UTARA")])
        .province("11", 3)
        .province("12", 3)
        .with_delay(Duration::from_millis(50));
    let state = state(&dir, source, Some(KEY));
    let router = build_router(state.clone());

    let post = |uri: &str| {
        Request::post(uri)
            .header("X-API-Key", KEY)
            .body(Body::empty())
            .unwrap()
    };

    let (status, body) = send(router.clone(), post("/api/v1/scraper/start?threads=3")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["threads"], 3);
    assert_eq!(body["status"], "running");

    let (status, body) = send(router.clone(), post("/api/v1/scraper/start")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Scraper is already running");

    let request = Request::get("/api/v1/scraper/progress")
        .header("X-API-Key", KEY)
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(router.clone(), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["running"], true);

    let (status, body) = send(router.clone(), post("/api/v1/scraper/stop")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "stopping");

    state.controller.wait().await.unwrap().unwrap();

    let (_, body) = send(router, post("/api/v1/scraper/stop")).await;
    assert_eq!(body["status"], "stopped");
}
