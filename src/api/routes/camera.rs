//! Camera Routes
//!
//! Pass-through to the camera detection service, plus the live event
//! stream that feeds the WebSocket hub.
//!
//! - GET /api/camera/events - SSE relay, fans events out to subscribers
//! - GET /api/camera/stream - MJPEG pass-through
//! - GET /api/camera/snapshot - JPEG pass-through
//! - GET /api/camera/status, POST /api/camera/start, POST /api/camera/stop
//! - GET|POST /api/camera/config, GET|POST /api/camera/zones
//! - POST /api/camera/test/droidcam, POST /api/camera/test/rtsp

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use reqwest::Method;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::{wrappers::ReceiverStream, StreamExt};

use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::bridge::EventBridge;

/// GET /api/camera/events
///
/// Opens the upstream event stream and relays it line by line. The bridge
/// runs in its own task so it notices the caller leaving even while the
/// upstream is idle.
pub async fn camera_events(State(state): State<Arc<AppState>>) -> ApiResult<Response> {
    let bridge = EventBridge::new(
        Arc::clone(&state.hub),
        Arc::clone(&state.sink),
        state.offset(),
        state.shutdown.child_token(),
    );

    let upstream = bridge
        .connect(&state.camera)
        .await
        .map_err(|_| ApiError::BadGateway("Failed to connect to camera events".to_string()))?;

    let (relay_tx, relay_rx) = mpsc::channel::<Bytes>(state.config.relay_capacity.max(1));

    tokio::spawn(async move {
        bridge.run(upstream.bytes_stream(), relay_tx).await;
    });

    let body = Body::from_stream(ReceiverStream::new(relay_rx).map(Ok::<_, Infallible>));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .header("X-Accel-Buffering", "no")
        .body(body)
        .map_err(|e| ApiError::Internal(e.to_string()))
}

/// GET /api/camera/stream
pub async fn camera_stream(State(state): State<Arc<AppState>>) -> ApiResult<Response> {
    pass_through(&state, "/api/camera/stream", "Failed to connect to camera stream").await
}

/// GET /api/camera/snapshot
pub async fn camera_snapshot(State(state): State<Arc<AppState>>) -> ApiResult<Response> {
    pass_through(&state, "/api/camera/snapshot", "Failed to get snapshot").await
}

/// GET /api/camera/status
pub async fn camera_status(State(state): State<Arc<AppState>>) -> ApiResult<Response> {
    proxy_json(&state, Method::GET, "/api/camera/status", None, "Failed to get camera status").await
}

/// POST /api/camera/start
pub async fn start_camera(State(state): State<Arc<AppState>>) -> ApiResult<Response> {
    proxy_json(&state, Method::POST, "/api/camera/start", None, "Failed to start camera").await
}

/// POST /api/camera/stop
pub async fn stop_camera(State(state): State<Arc<AppState>>) -> ApiResult<Response> {
    proxy_json(&state, Method::POST, "/api/camera/stop", None, "Failed to stop camera").await
}

/// GET /api/camera/config
pub async fn get_camera_config(State(state): State<Arc<AppState>>) -> ApiResult<Response> {
    proxy_json(&state, Method::GET, "/api/camera/config", None, "Failed to get camera config").await
}

/// POST /api/camera/config
pub async fn update_camera_config(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<Response> {
    proxy_json(
        &state,
        Method::POST,
        "/api/camera/config",
        Some(body),
        "Failed to update camera config",
    )
    .await
}

/// GET /api/camera/zones
pub async fn get_zones(State(state): State<Arc<AppState>>) -> ApiResult<Response> {
    proxy_json(&state, Method::GET, "/api/camera/zones", None, "Failed to get zones").await
}

/// POST /api/camera/zones
pub async fn update_zones(State(state): State<Arc<AppState>>, body: Bytes) -> ApiResult<Response> {
    proxy_json(&state, Method::POST, "/api/camera/zones", Some(body), "Failed to update zones").await
}

/// POST /api/camera/test/droidcam
pub async fn test_droidcam(State(state): State<Arc<AppState>>, body: Bytes) -> ApiResult<Response> {
    proxy_json(
        &state,
        Method::POST,
        "/api/camera/test/droidcam",
        Some(body),
        "Failed to test DroidCam connection",
    )
    .await
}

/// POST /api/camera/test/rtsp
pub async fn test_rtsp(State(state): State<Arc<AppState>>, body: Bytes) -> ApiResult<Response> {
    proxy_json(
        &state,
        Method::POST,
        "/api/camera/test/rtsp",
        Some(body),
        "Failed to test RTSP connection",
    )
    .await
}

/// Forward a JSON call, mirroring the upstream status and body
async fn proxy_json(
    state: &AppState,
    method: Method,
    path: &str,
    body: Option<Bytes>,
    failure: &str,
) -> ApiResult<Response> {
    let reply = state
        .camera
        .request_json(method, path, body)
        .await
        .map_err(|e| {
            tracing::warn!(path = %path, error = %e, "Camera request failed");
            ApiError::BadGateway(failure.to_string())
        })?;

    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::BAD_GATEWAY);
    Ok((status, Json(reply.body)).into_response())
}

/// Stream an upstream body through with its content type
async fn pass_through(state: &AppState, path: &str, failure: &str) -> ApiResult<Response> {
    let upstream = state.camera.open_stream(path).await.map_err(|e| {
        tracing::warn!(path = %path, error = %e, "Camera stream failed");
        ApiError::BadGateway(failure.to_string())
    })?;

    let status = StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let content_type = upstream
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| HeaderValue::from_bytes(v.as_bytes()).ok());

    let mut builder = Response::builder().status(status);
    if let Some(content_type) = content_type {
        builder = builder.header(header::CONTENT_TYPE, content_type);
    }

    builder
        .body(Body::from_stream(upstream.bytes_stream()))
        .map_err(|e| ApiError::Internal(e.to_string()))
}
