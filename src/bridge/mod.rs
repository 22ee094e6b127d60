//! Ingestion Bridge
//!
//! Connects one SSE caller to the camera's detection stream. Each upstream
//! line is relayed to the caller untouched, decoded, published to the
//! WebSocket hub, and, for recognized detections, written to the access
//! log in the background.
//!
//! ```text
//! Connecting ──ok──▶ Streaming ──EOF / read error / caller gone / shutdown──▶ Closed
//!      └──────────────upstream unavailable──────────────────────────────────▶ Closed
//! ```

use bytes::Bytes;
use chrono::FixedOffset;
use futures_util::{Stream, StreamExt};
use std::fmt::Display;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::camera::{CameraClient, CameraError};
use crate::events::{decode_line, DecodedLine, DetectionRecord, LineBuffer};
use crate::store::DetectionSink;
use crate::websocket::ConnectionHub;

/// Lifecycle of a bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Connecting,
    Streaming,
    Closed,
}

/// Why streaming stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Upstream ended the stream
    EndOfStream,
    /// Reading from upstream failed
    UpstreamError,
    /// The SSE caller disconnected
    CallerGone,
    /// The server is shutting down
    Shutdown,
}

/// Counters for one streaming session
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BridgeSummary {
    /// Complete lines relayed to the caller
    pub lines: usize,
    /// Lines decoded into events
    pub events: usize,
    /// `data:` lines that failed to decode
    pub malformed: usize,
    /// Lines dropped for exceeding the line length limit
    pub oversized: usize,
    /// Persistence writes dispatched
    pub detections: usize,
}

/// Result of [`EventBridge::run`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeOutcome {
    pub reason: CloseReason,
    pub summary: BridgeSummary,
}

/// Bridge errors
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Camera events unavailable: {0}")]
    UpstreamUnavailable(#[from] CameraError),
}

/// Relays one upstream SSE stream to its caller and the hub
pub struct EventBridge {
    hub: Arc<ConnectionHub>,
    sink: Arc<dyn DetectionSink>,
    /// Site UTC offset for defaulted detection timestamps
    offset: FixedOffset,
    shutdown: CancellationToken,
    state: watch::Sender<BridgeState>,
}

impl EventBridge {
    pub fn new(
        hub: Arc<ConnectionHub>,
        sink: Arc<dyn DetectionSink>,
        offset: FixedOffset,
        shutdown: CancellationToken,
    ) -> Self {
        let (state, _) = watch::channel(BridgeState::Connecting);

        Self {
            hub,
            sink,
            offset,
            shutdown,
            state,
        }
    }

    /// Current state
    pub fn state(&self) -> BridgeState {
        *self.state.borrow()
    }

    /// Observe state transitions
    pub fn watch_state(&self) -> watch::Receiver<BridgeState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: BridgeState) {
        self.state.send_replace(state);
    }

    /// Open the upstream event stream. Not retried: on failure the bridge
    /// is closed and the caller gets the error.
    pub async fn connect(&self, camera: &CameraClient) -> Result<reqwest::Response, BridgeError> {
        self.set_state(BridgeState::Connecting);

        match camera.open_events().await {
            Ok(response) => Ok(response),
            Err(e) => {
                tracing::error!(error = %e, "Camera events error");
                self.set_state(BridgeState::Closed);
                Err(BridgeError::UpstreamUnavailable(e))
            }
        }
    }

    /// Stream `upstream` until it ends, fails, the caller drops `relay`, or
    /// shutdown is signalled. The upstream stream is dropped before the
    /// bridge reports `Closed`.
    pub async fn run<S, E>(&self, upstream: S, relay: mpsc::Sender<Bytes>) -> BridgeOutcome
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Display,
    {
        self.set_state(BridgeState::Streaming);

        let mut upstream = Box::pin(upstream);
        let mut lines = LineBuffer::new();
        let mut summary = BridgeSummary::default();

        let reason = 'stream: loop {
            let chunk = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break CloseReason::Shutdown,
                _ = relay.closed() => break CloseReason::CallerGone,
                chunk = upstream.next() => chunk,
            };

            let bytes = match chunk {
                None => break CloseReason::EndOfStream,
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "SSE read error");
                    break CloseReason::UpstreamError;
                }
                Some(Ok(bytes)) => bytes,
            };

            lines.push(&bytes);
            while let Some(line) = lines.next_line() {
                if let Err(reason) = self.relay_line(&relay, line.clone()).await {
                    break 'stream reason;
                }
                summary.lines += 1;
                self.process_line(&line, &mut summary);
            }
        };

        drop(upstream);
        summary.oversized = lines.dropped_lines();

        if lines.pending() > 0 {
            tracing::debug!(bytes = lines.pending(), "Discarding partial SSE line");
        }

        self.set_state(BridgeState::Closed);
        tracing::info!(
            reason = ?reason,
            lines = summary.lines,
            events = summary.events,
            malformed = summary.malformed,
            oversized = summary.oversized,
            detections = summary.detections,
            "Camera event stream closed"
        );

        BridgeOutcome { reason, summary }
    }

    async fn relay_line(&self, relay: &mpsc::Sender<Bytes>, line: Bytes) -> Result<(), CloseReason> {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(CloseReason::Shutdown),
            sent = relay.send(line) => sent.map_err(|_| CloseReason::CallerGone),
        }
    }

    fn process_line(&self, line: &[u8], summary: &mut BridgeSummary) {
        let event = match decode_line(line) {
            DecodedLine::NoPayload => return,
            DecodedLine::Malformed(reason) => {
                summary.malformed += 1;
                tracing::debug!(reason = %reason, "Dropping undecodable SSE line");
                return;
            }
            DecodedLine::Event(event) => event,
        };

        summary.events += 1;

        if let Err(e) = self.hub.publish(&event) {
            tracing::debug!(error = %e, "Event not broadcast");
        }

        if let Some(record) = DetectionRecord::from_event(&event, self.offset) {
            summary.detections += 1;
            self.persist(record);
        }
    }

    /// Fire-and-forget write; failures are only logged
    fn persist(&self, record: DetectionRecord) {
        let sink = Arc::clone(&self.sink);

        tokio::spawn(async move {
            let name = record.name.clone();
            match sink.record_detection(record).await {
                Ok(entry) => tracing::info!(
                    log_id = entry.id,
                    name = %entry.name,
                    authorized = entry.authorized,
                    confidence = entry.confidence,
                    "Detection logged"
                ),
                Err(e) => tracing::error!(name = %name, error = %e, "Failed to save detection log"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::DetectionRecord;
    use crate::store::{LogEntry, StoreError, StoreResult};
    use crate::websocket::{HubConfig, SubscriberRole};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    struct RecordingSink {
        tx: mpsc::UnboundedSender<DetectionRecord>,
        fail: bool,
    }

    #[async_trait]
    impl DetectionSink for RecordingSink {
        async fn record_detection(&self, record: DetectionRecord) -> StoreResult<LogEntry> {
            let _ = self.tx.send(record.clone());
            if self.fail {
                return Err(StoreError::Validation("sink offline".to_string()));
            }
            Ok(LogEntry {
                id: 1,
                authorized: record.authorized,
                confidence: record.confidence,
                name: record.name,
                role: record.role,
                timestamp: record.timestamp,
            })
        }
    }

    struct Fixture {
        bridge: EventBridge,
        hub: Arc<ConnectionHub>,
        records: mpsc::UnboundedReceiver<DetectionRecord>,
        shutdown: CancellationToken,
    }

    fn fixture(fail_sink: bool) -> Fixture {
        let hub = Arc::new(ConnectionHub::new(HubConfig::default()));
        let _ = Arc::clone(&hub).start_dispatcher();
        let (tx, records) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let bridge = EventBridge::new(
            Arc::clone(&hub),
            Arc::new(RecordingSink { tx, fail: fail_sink }),
            FixedOffset::east_opt(7 * 3600).unwrap(),
            shutdown.clone(),
        );
        Fixture {
            bridge,
            hub,
            records,
            shutdown,
        }
    }

    fn chunks(parts: &[&'static str]) -> impl Stream<Item = Result<Bytes, std::io::Error>> {
        futures_util::stream::iter(
            parts
                .iter()
                .map(|p| Ok(Bytes::from_static(p.as_bytes())))
                .collect::<Vec<_>>(),
        )
    }

    async fn drain(mut rx: mpsc::Receiver<Bytes>) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(line) = rx.recv().await {
            out.extend_from_slice(&line);
        }
        out
    }

    async fn next_broadcast(queue: &mut mpsc::Receiver<String>) -> serde_json::Value {
        let text = tokio::time::timeout(Duration::from_secs(1), queue.recv())
            .await
            .unwrap()
            .unwrap();
        serde_json::from_str(&text).unwrap()
    }

    const ALICE: &str = "data: {\"type\":\"detection\",\"data\":{\"name\":\"Alice\",\"authorized\":true,\"confidence\":0.97}}\n\n";
    const UNKNOWN: &str = "data: {\"type\":\"detection\",\"data\":{\"name\":\"Unknown\",\"authorized\":false}}\n\n";

    #[tokio::test]
    async fn test_detection_is_relayed_broadcast_and_persisted() {
        let mut f = fixture(false);
        let mut sub = f.hub.register(SubscriberRole::Listener).await.unwrap();
        let (relay, relayed) = mpsc::channel(64);

        let outcome = f.bridge.run(chunks(&[ALICE]), relay).await;
        assert_eq!(outcome.reason, CloseReason::EndOfStream);
        assert_eq!(outcome.summary.lines, 2);
        assert_eq!(outcome.summary.events, 1);
        assert_eq!(outcome.summary.detections, 1);

        assert_eq!(drain(relayed).await, ALICE.as_bytes());

        let event = next_broadcast(&mut sub.queue).await;
        assert_eq!(event["type"], "detection");
        assert_eq!(event["data"]["name"], "Alice");

        let record = tokio::time::timeout(Duration::from_secs(1), f.records.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.name, "Alice");
        assert!(record.authorized);
        assert_eq!(record.confidence, 0.97);
    }

    #[tokio::test]
    async fn test_unknown_detection_is_broadcast_not_persisted() {
        let f = fixture(false);
        let mut sub = f.hub.register(SubscriberRole::Listener).await.unwrap();
        let (relay, _relayed) = mpsc::channel(64);

        let outcome = f.bridge.run(chunks(&[UNKNOWN]), relay).await;
        assert_eq!(outcome.summary.events, 1);
        assert_eq!(outcome.summary.detections, 0);

        let event = next_broadcast(&mut sub.queue).await;
        assert_eq!(event["data"]["name"], "Unknown");
    }

    #[tokio::test]
    async fn test_malformed_line_is_relayed_only() {
        let f = fixture(false);
        let mut sub = f.hub.register(SubscriberRole::Listener).await.unwrap();
        let (relay, relayed) = mpsc::channel(64);

        let input = "data: {\"type\":\"detection\",oops}\n";
        let outcome = f.bridge.run(chunks(&[input]), relay).await;
        assert_eq!(outcome.summary.malformed, 1);
        assert_eq!(outcome.summary.events, 0);
        assert_eq!(outcome.summary.detections, 0);

        assert_eq!(drain(relayed).await, input.as_bytes());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(sub.queue.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_lines_split_across_chunks_keep_order() {
        let f = fixture(false);
        let mut sub = f.hub.register(SubscriberRole::Listener).await.unwrap();
        let (relay, relayed) = mpsc::channel(64);

        let outcome = f
            .bridge
            .run(
                chunks(&["data: {\"seq\":1}\ndata: {\"se", "q\":2}\n", "data: {\"seq\":3}\n"]),
                relay,
            )
            .await;
        assert_eq!(outcome.summary.events, 3);

        for n in 1..=3 {
            assert_eq!(next_broadcast(&mut sub.queue).await["seq"], n);
        }
        assert_eq!(
            drain(relayed).await,
            b"data: {\"seq\":1}\ndata: {\"seq\":2}\ndata: {\"seq\":3}\n"
        );
    }

    #[tokio::test]
    async fn test_oversized_line_is_dropped_and_stream_continues() {
        let f = fixture(false);
        let mut sub = f.hub.register(SubscriberRole::Listener).await.unwrap();
        let (relay, relayed) = mpsc::channel(64);

        let filler = Bytes::from(vec![b'x'; 16 * 1024]);
        let mut parts = vec![Ok::<_, std::io::Error>(Bytes::from_static(b"data: {\"pad\":\""))];
        parts.extend((0..8).map(|_| Ok(filler.clone())));
        parts.push(Ok(Bytes::from_static(b"\"}\ndata: {\"seq\":2}\n")));

        let outcome = f.bridge.run(futures_util::stream::iter(parts), relay).await;
        assert_eq!(outcome.reason, CloseReason::EndOfStream);
        assert_eq!(outcome.summary.oversized, 1);
        assert_eq!(outcome.summary.lines, 1);
        assert_eq!(outcome.summary.events, 1);

        assert_eq!(drain(relayed).await, b"data: {\"seq\":2}\n");
        assert_eq!(next_broadcast(&mut sub.queue).await["seq"], 2);
    }

    #[tokio::test]
    async fn test_partial_trailing_line_is_discarded() {
        let f = fixture(false);
        let (relay, relayed) = mpsc::channel(64);

        let outcome = f
            .bridge
            .run(chunks(&["data: {\"seq\":1}\ndata: {\"seq\":2}"]), relay)
            .await;
        assert_eq!(outcome.summary.lines, 1);
        assert_eq!(outcome.summary.events, 1);
        assert_eq!(drain(relayed).await, b"data: {\"seq\":1}\n");
    }

    #[tokio::test]
    async fn test_upstream_close_releases_stream_without_subscribers() {
        struct ReleaseFlag(Arc<AtomicBool>);
        impl Drop for ReleaseFlag {
            fn drop(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let f = fixture(false);
        assert_eq!(f.hub.connection_count().await, 0);

        let released = Arc::new(AtomicBool::new(false));
        let guard = ReleaseFlag(Arc::clone(&released));
        let upstream = chunks(&["data: {\"type\":\"status\"}\n"]).map(move |chunk| {
            let _held = &guard;
            chunk
        });

        let mut state = f.bridge.watch_state();
        let (relay, _relayed) = mpsc::channel(64);
        let outcome = f.bridge.run(upstream, relay).await;

        assert_eq!(outcome.reason, CloseReason::EndOfStream);
        assert_eq!(f.bridge.state(), BridgeState::Closed);
        assert!(state.has_changed().unwrap());
        assert_eq!(*state.borrow_and_update(), BridgeState::Closed);
        assert!(released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_upstream_error_closes_bridge() {
        let f = fixture(false);
        let (relay, relayed) = mpsc::channel(64);

        let upstream = futures_util::stream::iter(vec![
            Ok(Bytes::from_static(b"data: {\"seq\":1}\n")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
            Ok(Bytes::from_static(b"data: {\"seq\":2}\n")),
        ]);

        let outcome = f.bridge.run(upstream, relay).await;
        assert_eq!(outcome.reason, CloseReason::UpstreamError);
        assert_eq!(outcome.summary.events, 1);
        assert_eq!(drain(relayed).await, b"data: {\"seq\":1}\n");
        assert_eq!(f.bridge.state(), BridgeState::Closed);
    }

    #[tokio::test]
    async fn test_caller_disconnect_interrupts_blocking_read() {
        let f = fixture(false);
        let (relay, relayed) = mpsc::channel(64);
        drop(relayed);

        let upstream = futures_util::stream::pending::<Result<Bytes, std::io::Error>>();
        let outcome = tokio::time::timeout(Duration::from_secs(1), f.bridge.run(upstream, relay))
            .await
            .unwrap();
        assert_eq!(outcome.reason, CloseReason::CallerGone);
        assert_eq!(f.bridge.state(), BridgeState::Closed);
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_blocking_read() {
        let f = fixture(false);
        let (relay, _relayed) = mpsc::channel(64);

        let upstream = futures_util::stream::pending::<Result<Bytes, std::io::Error>>();
        let shutdown = f.shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            shutdown.cancel();
        });

        let outcome = tokio::time::timeout(Duration::from_secs(1), f.bridge.run(upstream, relay))
            .await
            .unwrap();
        assert_eq!(outcome.reason, CloseReason::Shutdown);
    }

    #[tokio::test]
    async fn test_sink_failure_does_not_stop_stream() {
        let mut f = fixture(true);
        let (relay, _relayed) = mpsc::channel(64);

        let outcome = f.bridge.run(chunks(&[ALICE, ALICE]), relay).await;
        assert_eq!(outcome.reason, CloseReason::EndOfStream);
        assert_eq!(outcome.summary.detections, 2);

        for _ in 0..2 {
            tokio::time::timeout(Duration::from_secs(1), f.records.recv())
                .await
                .unwrap()
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_connect_failure_closes_bridge() {
        let f = fixture(false);
        let camera = CameraClient::new(crate::camera::CameraConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            ..Default::default()
        })
        .unwrap();

        let result = f.bridge.connect(&camera).await;
        assert!(matches!(result, Err(BridgeError::UpstreamUnavailable(_))));
        assert_eq!(f.bridge.state(), BridgeState::Closed);
    }
}
