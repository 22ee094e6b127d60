//! Application State
//!
//! Shared state accessible by all API handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use chrono::FixedOffset;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::camera::CameraClient;
use crate::store::{DetectionSink, LogStore};
use crate::websocket::ConnectionHub;

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Access log database
    pub store: LogStore,
    /// Where the ingestion bridge records detections
    pub sink: Arc<dyn DetectionSink>,
    /// Camera detection service client
    pub camera: Arc<CameraClient>,
    /// WebSocket subscriber hub
    pub hub: Arc<ConnectionHub>,
    /// API configuration
    pub config: Arc<ApiConfig>,
    /// Cancelled when the server begins shutting down
    pub shutdown: CancellationToken,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    /// Create state whose detections are recorded in `store`
    pub fn new(
        store: LogStore,
        camera: Arc<CameraClient>,
        hub: Arc<ConnectionHub>,
        config: ApiConfig,
    ) -> Self {
        let sink: Arc<dyn DetectionSink> = Arc::new(store.clone());

        Self {
            store,
            sink,
            camera,
            hub,
            config: Arc::new(config),
            shutdown: CancellationToken::new(),
            start_time: Instant::now(),
        }
    }

    /// Replace the detection sink
    pub fn with_sink(mut self, sink: Arc<dyn DetectionSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Site UTC offset used for local days and default timestamps
    pub fn offset(&self) -> FixedOffset {
        self.store.offset()
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Get WebSocket connection count
    pub async fn ws_connection_count(&self) -> usize {
        self.hub.connection_count().await
    }
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Lines buffered per SSE caller of `/api/camera/events`
    pub relay_capacity: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            relay_capacity: 64,
        }
    }
}

impl ApiConfig {
    /// Create config with custom host and port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
