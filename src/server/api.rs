//! REST API handlers for the lookup server
//!
//! This module defines the API routes and handlers: read-only lookups over
//! the loaded dataset and the key-guarded crawl control endpoints.

use axum::{
    extract::{Path, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::crawler::lifecycle::{Progress, StopOutcome};
use crate::models::{District, Province, RegionCode, RegionCounts, RegionData, Regency};
use crate::utils::error::LifecycleError;

use super::server::AppState;

/// Workers used when `threads` is missing or out of range
pub const DEFAULT_THREADS: usize = 4;
const MAX_THREADS: usize = 10;

// ============================================================================
// API Response Types
// ============================================================================

/// Simple error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Handler error carrying its status code
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// `{id, nama}` of one node
#[derive(Debug, Clone, Serialize)]
pub struct NodeRef {
    pub id: String,
    pub nama: String,
}

impl NodeRef {
    fn new(id: &str, nama: &str) -> Self {
        Self {
            id: id.to_string(),
            nama: nama.to_string(),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub dataset_loaded: bool,
    pub data_count: DataCount,
}

#[derive(Debug, Serialize)]
pub struct DataCount {
    pub provinces: usize,
}

/// Node detail with its ancestors
#[derive(Debug, Serialize)]
pub struct InfoResponse {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub id: String,
    pub nama: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provinsi: Option<NodeRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kabupaten: Option<NodeRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kecamatan: Option<NodeRef>,
}

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub message: &'static str,
    pub threads: usize,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub message: &'static str,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub running: bool,
}

#[derive(Debug, Serialize)]
pub struct ScraperInfoResponse {
    pub message: &'static str,
    pub api_key_required: bool,
    pub methods: AuthMethods,
}

#[derive(Debug, Serialize)]
pub struct AuthMethods {
    pub header: &'static str,
    pub query: &'static str,
}

/// Lookup query parameters; combined codes win over separate segments
#[derive(Debug, Default, Deserialize)]
pub struct LookupParams {
    pub pro: Option<String>,
    pub kab: Option<String>,
    pub kec: Option<String>,
    pub desa: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StartParams {
    pub threads: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

// ============================================================================
// API Routes
// ============================================================================

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let scraper = Router::new()
        .route("/start", post(start_scraper))
        .route("/stop", post(stop_scraper))
        .route("/status", get(scraper_status))
        .route("/progress", get(scraper_progress))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key))
        // Public, added after the auth layer
        .route("/info", get(scraper_info));

    let api = Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(get_stats))
        .route("/provinsi", get(get_provinsi))
        .route("/kabupaten", get(get_kabupaten))
        .route("/kecamatan", get(get_kecamatan))
        .route("/desa", get(get_desa))
        .route("/info/{code}", get(get_info))
        .nest("/scraper", scraper);

    Router::new().nest("/api/v1", api).with_state(state)
}

// ============================================================================
// Auth
// ============================================================================

/// Check `X-API-Key` (or `?api_key=`) against the configured key
async fn require_api_key(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(expected) = state.api_key.as_deref() else {
        return next.run(request).await;
    };

    let provided = request
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| {
            request.uri().query().and_then(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .find(|(k, _)| k == "api_key")
                    .map(|(_, v)| v.into_owned())
                    .filter(|v| !v.is_empty())
            })
        });

    match provided {
        None => ApiError::new(
            StatusCode::UNAUTHORIZED,
            "API key is required. Use X-API-Key header or api_key query parameter",
        )
        .into_response(),
        Some(key) if key != expected => {
            ApiError::new(StatusCode::FORBIDDEN, "Invalid API key").into_response()
        }
        Some(_) => next.run(request).await,
    }
}

// ============================================================================
// Lookup Handlers
// ============================================================================

async fn loaded(state: &AppState) -> Result<Arc<RegionData>, ApiError> {
    state.dataset().await.ok_or_else(|| {
        ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "Dataset not loaded. Run a crawl first",
        )
    })
}

fn province<'a>(data: &'a RegionData, pro: &str) -> Result<&'a Province, ApiError> {
    data.find_province(pro)
        .ok_or_else(|| ApiError::not_found("Province not found"))
}

fn regency<'a>(prov: &'a Province, kab: &str) -> Result<&'a Regency, ApiError> {
    prov.find_regency(kab)
        .ok_or_else(|| ApiError::not_found("Kabupaten/Kota not found"))
}

fn district<'a>(kab: &'a Regency, kec: &str) -> Result<&'a District, ApiError> {
    kab.find_district(kec)
        .ok_or_else(|| ApiError::not_found("Kecamatan not found"))
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let data = state.dataset().await;

    Json(HealthResponse {
        status: "OK",
        message: "Indonesian Region API is running",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.start_time.elapsed().as_secs(),
        dataset_loaded: data.is_some(),
        data_count: DataCount {
            provinces: data.map(|d| d.pro.len()).unwrap_or(0),
        },
    })
}

async fn get_stats(State(state): State<AppState>) -> ApiResult<RegionCounts> {
    Ok(Json(loaded(&state).await?.counts()))
}

async fn get_provinsi(State(state): State<AppState>) -> ApiResult<Vec<NodeRef>> {
    let data = loaded(&state).await?;
    Ok(Json(
        data.pro.iter().map(|p| NodeRef::new(&p.id, &p.nama)).collect(),
    ))
}

async fn get_kabupaten(
    State(state): State<AppState>,
    Query(params): Query<LookupParams>,
) -> ApiResult<Vec<NodeRef>> {
    let data = loaded(&state).await?;
    let pro = non_empty(&params.pro)
        .ok_or_else(|| ApiError::bad_request("Parameter 'pro' is required"))?;

    let prov = province(&data, pro)?;
    Ok(Json(
        prov.kab.iter().map(|k| NodeRef::new(&k.id, &k.nama)).collect(),
    ))
}

/// Parse a combined code parameter, answering 400 with the parse error
fn parse_code(code: &str) -> Result<RegionCode, ApiError> {
    RegionCode::parse(code).map_err(|e| ApiError::bad_request(e.to_string()))
}

async fn get_kecamatan(
    State(state): State<AppState>,
    Query(params): Query<LookupParams>,
) -> ApiResult<Vec<NodeRef>> {
    let data = loaded(&state).await?;

    let (pro, kab) = match non_empty(&params.kec) {
        Some(code) => match parse_code(code)? {
            RegionCode::Regency { pro, kab } => (pro, kab),
            _ => {
                return Err(ApiError::bad_request(
                    "Parameter 'kec' must be a 4-digit kabupaten code",
                ))
            }
        },
        None => match (non_empty(&params.pro), non_empty(&params.kab)) {
            (Some(pro), Some(kab)) => (pro.to_string(), kab.to_string()),
            _ => {
                return Err(ApiError::bad_request(
                    "Parameters 'pro' and 'kab' are required, or use 'kec' with 4-digit code",
                ))
            }
        },
    };

    let kab = regency(province(&data, &pro)?, &kab)?;
    Ok(Json(
        kab.kec.iter().map(|k| NodeRef::new(&k.id, &k.nama)).collect(),
    ))
}

async fn get_desa(
    State(state): State<AppState>,
    Query(params): Query<LookupParams>,
) -> ApiResult<Vec<NodeRef>> {
    let data = loaded(&state).await?;

    let (pro, kab, kec) = match non_empty(&params.desa) {
        Some(code) => match parse_code(code)? {
            RegionCode::District { pro, kab, kec } => (pro, kab, kec),
            _ => {
                return Err(ApiError::bad_request(
                    "Parameter 'desa' must be a 7-digit kecamatan code",
                ))
            }
        },
        None => match (
            non_empty(&params.pro),
            non_empty(&params.kab),
            non_empty(&params.kec),
        ) {
            (Some(pro), Some(kab), Some(kec)) => {
                (pro.to_string(), kab.to_string(), kec.to_string())
            }
            _ => {
                return Err(ApiError::bad_request(
                    "Parameters 'pro', 'kab', and 'kec' are required, or use 'desa' with 7-digit code",
                ))
            }
        },
    };

    let kec = district(regency(province(&data, &pro)?, &kab)?, &kec)?;
    Ok(Json(
        kec.des.iter().map(|d| NodeRef::new(&d.id, &d.nama)).collect(),
    ))
}

async fn get_info(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<InfoResponse> {
    let code = parse_code(&code)?;
    let data = loaded(&state).await?;

    let info = match &code {
        RegionCode::Province { pro } => {
            let prov = province(&data, pro)?;
            InfoResponse {
                kind: code.level(),
                id: prov.id.clone(),
                nama: prov.nama.clone(),
                children: Some(prov.kab.len()),
                provinsi: None,
                kabupaten: None,
                kecamatan: None,
            }
        }
        RegionCode::Regency { pro, kab } => {
            let prov = province(&data, pro)?;
            let kab = regency(prov, kab)?;
            InfoResponse {
                kind: code.level(),
                id: kab.id.clone(),
                nama: kab.nama.clone(),
                children: Some(kab.kec.len()),
                provinsi: Some(NodeRef::new(&prov.id, &prov.nama)),
                kabupaten: None,
                kecamatan: None,
            }
        }
        RegionCode::District { pro, kab, kec } => {
            let prov = province(&data, pro)?;
            let kab = regency(prov, kab)?;
            let kec = district(kab, kec)?;
            InfoResponse {
                kind: code.level(),
                id: kec.id.clone(),
                nama: kec.nama.clone(),
                children: Some(kec.des.len()),
                provinsi: Some(NodeRef::new(&prov.id, &prov.nama)),
                kabupaten: Some(NodeRef::new(&kab.id, &kab.nama)),
                kecamatan: None,
            }
        }
        RegionCode::Village { pro, kab, kec, des } => {
            let prov = province(&data, pro)?;
            let kab = regency(prov, kab)?;
            let kec = district(kab, kec)?;
            let desa = kec
                .find_village(des)
                .ok_or_else(|| ApiError::not_found("Desa/Kelurahan not found"))?;
            InfoResponse {
                kind: code.level(),
                id: desa.id.clone(),
                nama: desa.nama.clone(),
                children: None,
                provinsi: Some(NodeRef::new(&prov.id, &prov.nama)),
                kabupaten: Some(NodeRef::new(&kab.id, &kab.nama)),
                kecamatan: Some(NodeRef::new(&kec.id, &kec.nama)),
            }
        }
    };

    Ok(Json(info))
}

// ============================================================================
// Scraper Control Handlers
// ============================================================================

/// Worker count from `?threads=`; falls back to the default when out of range
pub fn parse_threads(raw: Option<&str>) -> usize {
    raw.and_then(|t| t.trim().parse::<usize>().ok())
        .filter(|t| (1..=MAX_THREADS).contains(t))
        .unwrap_or(DEFAULT_THREADS)
}

async fn start_scraper(
    State(state): State<AppState>,
    Query(params): Query<StartParams>,
) -> ApiResult<StartResponse> {
    let threads = parse_threads(params.threads.as_deref());

    match state.controller.start(threads) {
        Ok(ack) => Ok(Json(StartResponse {
            message: "Scraper started successfully",
            threads: ack.workers,
            status: "running",
        })),
        Err(LifecycleError::AlreadyRunning) => Err(ApiError::new(
            StatusCode::CONFLICT,
            "Scraper is already running",
        )),
        Err(e) => Err(ApiError::bad_request(e.to_string())),
    }
}

async fn stop_scraper(State(state): State<AppState>) -> Json<StopResponse> {
    Json(match state.controller.stop() {
        StopOutcome::Stopping => StopResponse {
            message: "Scraper stop signal sent",
            status: "stopping",
        },
        StopOutcome::AlreadyStopped => StopResponse {
            message: "Scraper is not running",
            status: "stopped",
        },
    })
}

async fn scraper_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let running = state.controller.status();
    Json(StatusResponse {
        status: if running { "running" } else { "stopped" },
        running,
    })
}

async fn scraper_progress(State(state): State<AppState>) -> Json<Progress> {
    Json(state.controller.progress())
}

async fn scraper_info(State(state): State<AppState>) -> Json<ScraperInfoResponse> {
    Json(ScraperInfoResponse {
        message: "Scraper control endpoints require API key authentication",
        api_key_required: state.api_key.is_some(),
        methods: AuthMethods {
            header: "X-API-Key: your_api_key",
            query: "?api_key=your_api_key",
        },
    })
}
