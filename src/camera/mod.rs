//! Camera Detection Service
//!
//! HTTP client for the external detector that owns the camera: its SSE
//! event stream, JSON control endpoints, and raw image/video streams.

mod client;

pub use client::{CameraClient, CameraConfig, CameraError, CameraReply};
