//! # Doorlog
//!
//! Backend for a door-access logging system: an access log in SQLite, a
//! proxy to the camera detection service, and real-time distribution of
//! detection events to WebSocket dashboards.
//!
//! ## Modules
//!
//! - [`events`]: SSE line decoding and detection narrowing
//! - [`websocket`]: Subscriber hub, per-socket writer, upgrade handlers
//! - [`bridge`]: Relays the camera's event stream to a caller, the hub and the log
//! - [`store`]: Access log persistence
//! - [`camera`]: Camera detection service client
//! - [`api`]: REST API server with Axum
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Event Flow
//!
//! ```text
//! camera SSE ─▶ EventBridge ─┬─▶ SSE caller (raw lines)
//!                            ├─▶ ConnectionHub ─▶ subscriber queues ─▶ sockets
//!                            └─▶ DetectionSink (recognized detections)
//! ```

pub mod api;
pub mod bridge;
pub mod camera;
pub mod config;
pub mod events;
pub mod store;
pub mod websocket;

pub use api::{build_router, serve, ApiConfig, ApiError, AppState};

pub use bridge::{BridgeError, BridgeOutcome, BridgeState, CloseReason, EventBridge};

pub use camera::{CameraClient, CameraConfig, CameraError};

pub use config::{Config, ConfigError, LoggingConfig};

pub use events::{decode_line, DecodedLine, DetectionRecord, Event, LineBuffer};

pub use store::{DetectionSink, LogEntry, LogStore, NewLogEntry, StoreError, StoreResult};

pub use websocket::{ConnectionHub, HubConfig, HubError, SubscriberRole};
