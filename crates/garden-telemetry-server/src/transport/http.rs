//! HTTP transport — chart, heatmap and artifact endpoints, reading
//! ingestion, the device dispatcher and /health.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderName, Method, StatusCode};
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};

use garden_telemetry::{ArtifactId, Series, TelemetryService};

use crate::dispatch::{DeviceRecord, DeviceRegistry};
use crate::types::{
    HeatmapResponse, ReadingAccepted, ReadingInput, SeriesParams, ServerError, ServerResult,
    DEFAULT_SERIES_WINDOW_SECS,
};

/// Response header carrying the id of the artifact in the body.
pub const ARTIFACT_ID_HEADER: HeaderName = HeaderName::from_static("x-artifact-id");

const FORBIDDEN_PAGE: &str = "<html><h1>403 Forbidden</h1>\n\
    <h2>Sorry, you do not have permission to access this page.</h2></html>";

/// Shared server state passed to all handlers via axum State.
pub struct ServerState {
    pub service: Arc<TelemetryService>,
    pub devices: DeviceRegistry,
}

/// Build the axum Router with all endpoints.
pub fn router(state: Arc<ServerState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_index))
        .route("/health", get(handle_health))
        .route("/graph/:source/:window/:sensor", get(handle_graph))
        .route("/heatmap/:sensor", get(handle_heatmap_png))
        .route("/artifacts/:id", get(handle_artifact))
        .route("/api/v1/series/:source/:sensor", get(handle_series))
        .route("/api/v1/heatmap/:sensor", get(handle_heatmap_json))
        .route("/api/v1/readings", post(handle_reading))
        .route("/api/device/:uid", get(handle_device).post(handle_device))
        .layer(cors)
        .with_state(state)
}

/// HTTP server bound to one address.
pub struct HttpTransport {
    state: Arc<ServerState>,
}

impl HttpTransport {
    pub fn new(service: Arc<TelemetryService>, devices: DeviceRegistry) -> Self {
        Self {
            state: Arc::new(ServerState { service, devices }),
        }
    }

    /// Run the HTTP server on the given address until it fails.
    pub async fn run(&self, addr: &str) -> anyhow::Result<()> {
        let app = router(self.state.clone());
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("HTTP transport listening on http://{addr}");
        axum::serve(listener, app).await?;
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────

/// Run a blocking core call off the async workers.
async fn blocking<T, F>(f: F) -> ServerResult<T>
where
    F: FnOnce() -> ServerResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ServerError::Internal(format!("task panicked: {e}")))?
}

fn png_response(id: ArtifactId, bytes: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, "image/png".to_string()),
            (ARTIFACT_ID_HEADER, id.to_string()),
        ],
        bytes,
    )
        .into_response()
}

fn parse_window(raw: &str) -> ServerResult<u64> {
    raw.parse().map_err(|_| {
        ServerError::InvalidParams(format!("window must be a whole number of seconds, got {raw:?}"))
    })
}

// ── Handlers ────────────────────────────────────────────────────

async fn handle_index() -> impl IntoResponse {
    (StatusCode::FORBIDDEN, Html(FORBIDDEN_PAGE))
}

async fn handle_health(State(state): State<Arc<ServerState>>) -> ServerResult<Json<Value>> {
    let current = state.service.current_artifact()?.map(|h| h.id);
    Ok(Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "current_artifact": current,
        "devices": state.devices.len(),
    })))
}

/// Render a line chart and return its PNG.
async fn handle_graph(
    State(state): State<Arc<ServerState>>,
    Path((source, window, sensor)): Path<(String, String, String)>,
) -> ServerResult<Response> {
    let window = parse_window(&window)?;
    let service = state.service.clone();
    let chart = blocking(move || Ok(service.get_series(&source, &sensor, window)?)).await?;
    Ok(png_response(chart.handle.id, chart.bytes))
}

async fn handle_heatmap_png(
    State(state): State<Arc<ServerState>>,
    Path(sensor): Path<String>,
) -> ServerResult<Response> {
    let service = state.service.clone();
    let heatmap = blocking(move || Ok(service.get_heatmap(&sensor)?)).await?;
    Ok(png_response(heatmap.artifact.id, heatmap.bytes))
}

async fn handle_heatmap_json(
    State(state): State<Arc<ServerState>>,
    Path(sensor): Path<String>,
) -> ServerResult<Json<HeatmapResponse>> {
    let service = state.service.clone();
    let heatmap = blocking(move || Ok(service.get_heatmap(&sensor)?)).await?;
    Ok(Json(HeatmapResponse {
        artifact_id: heatmap.artifact.id,
        sensor_type: heatmap.sensor_type,
        cells: heatmap.cells,
    }))
}

/// Serve the committed artifact. Accepts the id with or without `.png`.
async fn handle_artifact(
    State(state): State<Arc<ServerState>>,
    Path(raw): Path<String>,
) -> ServerResult<Response> {
    let id: ArtifactId = raw
        .strip_suffix(".png")
        .unwrap_or(&raw)
        .parse()
        .map_err(|e: garden_telemetry::TelemetryError| ServerError::InvalidParams(e.to_string()))?;
    let service = state.service.clone();
    let bytes = blocking(move || Ok(service.artifact(id)?)).await?;
    Ok(png_response(id, bytes))
}

async fn handle_series(
    State(state): State<Arc<ServerState>>,
    Path((source, sensor)): Path<(String, String)>,
    params: Result<Query<SeriesParams>, QueryRejection>,
) -> ServerResult<Json<Series>> {
    let Query(params) = params.map_err(|e| ServerError::InvalidParams(e.body_text()))?;
    let window = params.window.unwrap_or(DEFAULT_SERIES_WINDOW_SECS);
    let service = state.service.clone();
    let series = blocking(move || Ok(service.series_data(&source, &sensor, window)?)).await?;
    Ok(Json(series))
}

/// Ingest one reading. Duplicates are reported, not rejected.
async fn handle_reading(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<ReadingInput>, JsonRejection>,
) -> ServerResult<(StatusCode, Json<ReadingAccepted>)> {
    let Json(input) = payload.map_err(|e| ServerError::InvalidParams(e.body_text()))?;
    if !input.value.is_finite() {
        return Err(ServerError::InvalidParams("value must be finite".to_string()));
    }
    let service = state.service.clone();
    let accepted = blocking(move || {
        let reading = input.into_reading(service.now_secs());
        let inserted = service.record(&reading)?;
        Ok(ReadingAccepted {
            content_id: reading.content_id,
            inserted,
        })
    })
    .await?;
    let status = if accepted.inserted {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(accepted)))
}

/// Device dispatcher lookup by hex-encoded friendly name.
async fn handle_device(
    State(state): State<Arc<ServerState>>,
    method: Method,
    Path(uid): Path<String>,
) -> ServerResult<Json<Value>> {
    let record: &DeviceRecord = state.devices.resolve(&uid, method.as_str())?;
    Ok(Json(json!({ "device": record })))
}
