//! Camera Service REST Client

use bytes::Bytes;
use reqwest::{header, Client, Method, Response};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Camera service client
pub struct CameraClient {
    client: Client,
    config: CameraConfig,
}

/// Configuration for the camera client
#[derive(Debug, Clone)]
pub struct CameraConfig {
    /// Base URL of the detector service (e.g., "http://localhost:5000")
    pub base_url: String,
    /// Path of the SSE detection event stream
    pub events_path: String,
    /// Timeout for JSON control requests in milliseconds
    pub request_timeout_ms: u64,
    /// Timeout for establishing a TCP connection in milliseconds
    pub connect_timeout_ms: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            events_path: "/api/camera/events".to_string(),
            request_timeout_ms: 10_000,
            connect_timeout_ms: 5_000,
        }
    }
}

/// Status and JSON body of a proxied control call
#[derive(Debug, Clone, PartialEq)]
pub struct CameraReply {
    pub status: u16,
    /// Upstream body, or null if it was not JSON
    pub body: Value,
}

impl CameraClient {
    /// Create a new camera client with the given configuration
    ///
    /// No overall request timeout is set on the client itself: the event
    /// and video streams stay open indefinitely. Control calls set their own.
    pub fn new(config: CameraConfig) -> Result<Self, CameraError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .build()
            .map_err(CameraError::Request)?;

        Ok(Self { client, config })
    }

    /// Get the current configuration
    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Open the detector's server-sent event stream
    pub async fn open_events(&self) -> Result<Response, CameraError> {
        let url = self.url(&self.config.events_path);

        let response = self
            .client
            .get(&url)
            .header(header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(classify)?;

        if !response.status().is_success() {
            return Err(CameraError::Status(response.status().as_u16()));
        }

        tracing::debug!(url = %url, "Camera event stream opened");
        Ok(response)
    }

    /// Open a raw pass-through stream (snapshot image, MJPEG video)
    pub async fn open_stream(&self, path: &str) -> Result<Response, CameraError> {
        self.client
            .get(self.url(path))
            .send()
            .await
            .map_err(classify)
    }

    /// Call a JSON control endpoint, forwarding `body` verbatim
    pub async fn request_json(
        &self,
        method: Method,
        path: &str,
        body: Option<Bytes>,
    ) -> Result<CameraReply, CameraError> {
        let mut request = self
            .client
            .request(method, self.url(path))
            .timeout(Duration::from_millis(self.config.request_timeout_ms));

        if let Some(body) = body {
            request = request
                .header(header::CONTENT_TYPE, "application/json")
                .body(body);
        }

        let response = request.send().await.map_err(classify)?;
        let status = response.status().as_u16();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);

        Ok(CameraReply { status, body })
    }
}

fn classify(e: reqwest::Error) -> CameraError {
    if e.is_timeout() {
        CameraError::Timeout
    } else if e.is_connect() {
        CameraError::Unavailable
    } else {
        CameraError::Request(e)
    }
}

/// Camera client errors
#[derive(Debug, Error)]
pub enum CameraError {
    #[error("Camera service unavailable")]
    Unavailable,

    #[error("Camera service request timed out")]
    Timeout,

    #[error("Camera service returned status {0}")]
    Status(u16),

    #[error("Camera service request failed: {0}")]
    Request(#[from] reqwest::Error),
}
