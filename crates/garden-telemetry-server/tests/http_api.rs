//! HTTP API integration tests for garden-telemetry-server.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use garden_telemetry::{FixedClock, MemoryStore, PngRasterizer, Reading, TelemetryService};
use garden_telemetry_server::config::ServerConfig;
use garden_telemetry_server::dispatch::{device_uid, DeviceRegistry};
use garden_telemetry_server::transport::http::{router, ServerState, ARTIFACT_ID_HEADER};

// ─────────────────────── helpers ───────────────────────

const NOW: i64 = 1_600_000_000;

fn app(dir: &tempfile::TempDir) -> Router {
    let mut config = ServerConfig::default();
    config.telemetry.artifacts.dir = dir.path().join("images");
    config.telemetry.render.width = 320;
    config.telemetry.render.height = 200;
    config.telemetry.heatmap.marker_radius = 10;

    let store = MemoryStore::with_readings(vec![
        Reading::new("192.168.0.10", "temperature", "HQ", NOW - 300, 18.0),
        Reading::new("192.168.0.10", "temperature", "HQ", NOW - 200, 19.5),
        Reading::new("192.168.0.10", "temperature", "HQ", NOW - 100, 19.0),
        Reading::new("192.168.0.20", "temperature", "HQ", NOW - 100, 30.0),
    ])
    .unwrap();

    let service = TelemetryService::with_parts(
        &config.telemetry,
        Arc::new(store),
        Arc::new(FixedClock::at_secs(NOW)),
        Arc::new(PngRasterizer),
    )
    .unwrap();

    router(Arc::new(ServerState {
        service: Arc::new(service),
        devices: DeviceRegistry::new(&config.devices),
    }))
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let headers = resp.headers().clone();
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, headers, body.to_vec())
}

async fn get(app: &Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

fn json_body(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap()
}

// ─────────────────────── tests ───────────────────────

#[tokio::test]
async fn health_reports_ok() {
    let dir = tempfile::tempdir().unwrap();
    let (status, _, body) = get(&app(&dir), "/health").await;
    assert_eq!(status, StatusCode::OK);
    let body = json_body(&body);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["current_artifact"], Value::Null);
}

#[tokio::test]
async fn root_is_forbidden() {
    let dir = tempfile::tempdir().unwrap();
    let (status, _, body) = get(&app(&dir), "/").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(String::from_utf8(body).unwrap().contains("403 Forbidden"));
}

#[tokio::test]
async fn graph_returns_png_and_artifact_id() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir);
    let (status, headers, body) = get(&app, "/graph/192.168.0.10/3600/temperature").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["content-type"], "image/png");
    assert!(image::load_from_memory(&body).is_ok());

    let id = headers[ARTIFACT_ID_HEADER].to_str().unwrap().to_string();
    let (status, _, again) = get(&app, &format!("/artifacts/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again, body);

    let (status, _, _) = get(&app, &format!("/artifacts/{id}.png")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn overlapping_graph_requests_all_succeed() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir);

    let requests: Vec<_> = (0..16)
        .map(|i| {
            let app = app.clone();
            let uri = if i % 2 == 0 {
                "/graph/192.168.0.10/3600/temperature"
            } else {
                "/heatmap/temperature"
            };
            tokio::spawn(async move { get(&app, uri).await })
        })
        .collect();

    for request in requests {
        let (status, headers, body) = request.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert!(headers.contains_key(ARTIFACT_ID_HEADER));
        assert!(image::load_from_memory(&body).is_ok());
    }
}

#[tokio::test]
async fn graph_error_statuses() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir);

    // one reading in window
    let (status, _, body) = get(&app, "/graph/192.168.0.20/3600/temperature").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json_body(&body)["error"]["code"], "E_INSUFFICIENT_DATA");

    let (status, _, body) = get(&app, "/graph/192.168.0.10/3600/T").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_body(&body)["error"]["code"], "E_INVALID_SENSOR_TYPE");

    let (status, _, body) = get(&app, "/graph/192.168.0.10/lots/temperature").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_body(&body)["error"]["code"], "E_INVALID_PARAMS");
}

#[tokio::test]
async fn series_json() {
    let dir = tempfile::tempdir().unwrap();
    let (status, _, body) = get(&app(&dir), "/api/v1/series/192.168.0.10/temperature?window=250").await;
    assert_eq!(status, StatusCode::OK);
    let body = json_body(&body);
    let points = body["points"].as_array().unwrap();
    assert_eq!(points.len(), 2);
    assert_eq!(points[0]["timestamp"], NOW - 200);
    assert_eq!(points[1]["value"], 19.0);
}

#[tokio::test]
async fn heatmap_endpoints() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir);

    let (status, _, body) = get(&app, "/api/v1/heatmap/temperature").await;
    assert_eq!(status, StatusCode::OK);
    let body = json_body(&body);
    let cells = body["cells"].as_array().unwrap();
    assert_eq!(cells.len(), 5);
    assert_eq!(cells[0]["source_id"], "192.168.0.10");
    assert_eq!(cells[0]["value"], 19.0);
    assert_eq!(cells[1]["value"], Value::Null);

    let (status, headers, png) = get(&app, "/heatmap/temperature").await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers.contains_key(ARTIFACT_ID_HEADER));
    assert!(image::load_from_memory(&png).is_ok());
}

#[tokio::test]
async fn stale_artifact_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir);
    let (_, first, _) = get(&app, "/graph/192.168.0.10/3600/temperature").await;
    let (_, _, _) = get(&app, "/heatmap/humidity").await;

    let id = first[ARTIFACT_ID_HEADER].to_str().unwrap().to_string();
    let (status, _, body) = get(&app, &format!("/artifacts/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json_body(&body)["error"]["code"], "E_ARTIFACT_NOT_FOUND");

    let (status, _, _) = get(&app, "/artifacts/not-an-id").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn post_reading_reports_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir);
    let post = |payload: Value| {
        Request::post("/api/v1/readings")
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .unwrap()
    };
    let reading = json!({
        "source_id": "192.168.0.30",
        "sensor_type": "moisture",
        "timestamp": NOW - 10,
        "value": 55.0
    });

    let (status, _, body) = send(&app, post(reading.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    let first = json_body(&body);
    assert_eq!(first["inserted"], true);

    let (status, _, body) = send(&app, post(reading)).await;
    assert_eq!(status, StatusCode::OK);
    let second = json_body(&body);
    assert_eq!(second["inserted"], false);
    assert_eq!(second["content_id"], first["content_id"]);

    let (status, _, body) = send(&app, post(json!({ "source_id": "x", "sensor_type": "lux", "value": 1.0 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_body(&body)["error"]["code"], "E_INVALID_SENSOR_TYPE");

    let (status, _, _) = send(&app, post(json!({ "source_id": "x" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn device_dispatcher() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir);

    let uri = format!("/api/device/{}", device_uid("front lawn"));
    let (status, _, body) = get(&app, &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json_body(&body),
        json!({ "device": { "addr": "127.0.0.1:8080", "methods": ["GET", "POST"] } })
    );

    let uri = format!("/api/device/{}", device_uid("duck pond"));
    let (status, _, body) = send(&app, Request::post(uri).body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(&body),
        json!({ "error": "Request type not valid", "methods": ["GET"], "req_method": "POST" })
    );

    let (status, _, body) = get(&app, "/api/device/deadbeef").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json_body(&body), json!({ "error": "Device not found" }));
}
