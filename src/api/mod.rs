//! Doorlog REST API
//!
//! HTTP API layer, built with Axum.
//!
//! # Endpoints
//!
//! ## Logs
//! - `GET /api/logs` - List all entries
//! - `GET /api/logs/filter` - Entries for today, a date, or a date range
//! - `POST /api/logs` - Create an entry
//! - `DELETE /api/logs/:id` - Delete an entry
//!
//! ## Camera
//! - `GET /api/camera/events` - Live detection events (SSE)
//! - `GET /api/camera/stream` - MJPEG video
//! - `GET /api/camera/snapshot` - Current frame
//! - `GET /api/camera/status`, `POST /api/camera/start`, `POST /api/camera/stop`
//! - `GET|POST /api/camera/config`, `GET|POST /api/camera/zones`
//! - `POST /api/camera/test/droidcam`, `POST /api/camera/test/rtsp`
//!
//! ## WebSocket
//! - `GET /api/ws/events` - Receive-only event feed
//! - `GET /api/ws` - Event feed that also accepts log records
//!
//! ## Health
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe
//! - `GET /health` - Full health status

pub mod dto;
pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::{ApiConfig, AppState};

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::websocket::{events_websocket_handler, websocket_handler};

/// Build the API router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Log routes
        .route("/logs", get(routes::logs::list_logs).post(routes::logs::create_log))
        .route("/logs/filter", get(routes::logs::filter_logs))
        .route("/logs/:id", delete(routes::logs::delete_log))
        // Camera routes
        .route("/camera/events", get(routes::camera::camera_events))
        .route("/camera/stream", get(routes::camera::camera_stream))
        .route("/camera/snapshot", get(routes::camera::camera_snapshot))
        .route("/camera/status", get(routes::camera::camera_status))
        .route("/camera/start", post(routes::camera::start_camera))
        .route("/camera/stop", post(routes::camera::stop_camera))
        .route(
            "/camera/config",
            get(routes::camera::get_camera_config).post(routes::camera::update_camera_config),
        )
        .route(
            "/camera/zones",
            get(routes::camera::get_zones).post(routes::camera::update_zones),
        )
        .route("/camera/test/droidcam", post(routes::camera::test_droidcam))
        .route("/camera/test/rtsp", post(routes::camera::test_rtsp))
        // WebSocket routes
        .route("/ws", get(websocket_handler))
        .route("/ws/events", get(events_websocket_handler));

    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/ready", get(routes::health::readiness))
        .route("/", get(routes::health::full_health));

    let shared_state = Arc::new(state);

    Router::new()
        .nest("/api", api_routes)
        .nest("/health", health_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(shared_state)
}

/// Start the API server
///
/// On Ctrl+C or SIGTERM the state's shutdown token is cancelled, which
/// ends every open event stream so graceful shutdown can complete.
pub async fn serve(state: AppState) -> Result<(), ApiError> {
    let addr = state.config.addr();
    let shutdown = state.shutdown.clone();
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Doorlog API listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    tracing::info!("Doorlog API shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = token.cancelled() => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
    token.cancel();
}
