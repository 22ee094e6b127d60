//! WebSocket Connection Hub
//!
//! Owns the set of connected subscribers and fans broadcasts out to them.
//!
//! Every subscriber gets a bounded outbound queue whose only sending half
//! lives in the hub. Removing a subscriber from the map drops that sender,
//! which closes the queue exactly once and lets the subscriber's writer
//! task finish. Broadcasts never wait on a subscriber: a full queue evicts
//! it on the spot.
//!
//! Producers go through [`ConnectionHub::publish`], which feeds a bounded
//! intake drained by a single dispatcher task, so broadcast order matches
//! publish order.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::events::Event;

/// Unique identifier for a WebSocket connection
pub type ConnectionId = String;

/// What a connected client does besides receiving broadcasts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberRole {
    /// Receives broadcasts only; inbound frames are ignored
    Listener,
    /// Receives broadcasts and submits access log records
    Recorder,
}

impl SubscriberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriberRole::Listener => "listener",
            SubscriberRole::Recorder => "recorder",
        }
    }
}

/// Configuration for the connection hub
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Maximum number of concurrent connections
    pub max_connections: usize,
    /// Capacity of each subscriber's outbound queue
    pub queue_capacity: usize,
    /// Capacity of the broadcast intake in front of the dispatcher
    pub broadcast_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_connections: 1000,
            queue_capacity: 256,
            broadcast_capacity: 256,
        }
    }
}

/// Hub-side handle for one subscriber
struct ConnectionHandle {
    /// The only sender of this subscriber's outbound queue
    sender: mpsc::Sender<String>,
    role: SubscriberRole,
}

/// A successful registration: the subscriber's id and the receiving half
/// of its outbound queue, to be drained by the connection's writer task
#[derive(Debug)]
pub struct Subscription {
    pub id: ConnectionId,
    pub role: SubscriberRole,
    pub queue: mpsc::Receiver<String>,
}

/// Outcome of a single fan-out
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Enqueue attempts made (one per registered subscriber)
    pub attempted: usize,
    /// Messages that landed in a subscriber queue
    pub delivered: usize,
    /// Subscribers removed because their queue was full or closed
    pub evicted: usize,
}

/// Manages all WebSocket connections and broadcast fan-out
pub struct ConnectionHub {
    /// Active connections: ConnectionId → ConnectionHandle
    connections: RwLock<HashMap<ConnectionId, ConnectionHandle>>,
    /// Bounded intake feeding the dispatcher
    intake_tx: mpsc::Sender<String>,
    /// Receiving half of the intake, taken by the dispatcher once
    intake_rx: Mutex<Option<mpsc::Receiver<String>>>,
    config: HubConfig,
}

impl ConnectionHub {
    /// Create a new connection hub
    pub fn new(config: HubConfig) -> Self {
        let (intake_tx, intake_rx) = mpsc::channel(config.broadcast_capacity.max(1));

        Self {
            connections: RwLock::new(HashMap::new()),
            intake_tx,
            intake_rx: Mutex::new(Some(intake_rx)),
            config,
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Register a new subscriber
    ///
    /// Returns the subscription on success, or an error if the connection
    /// limit has been reached.
    pub async fn register(&self, role: SubscriberRole) -> Result<Subscription, HubError> {
        let mut connections = self.connections.write().await;
        if connections.len() >= self.config.max_connections {
            return Err(HubError::TooManyConnections(self.config.max_connections));
        }

        let (sender, queue) = mpsc::channel(self.config.queue_capacity.max(1));
        let id = Uuid::new_v4().to_string();
        connections.insert(id.clone(), ConnectionHandle { sender, role });

        tracing::info!(
            connection_id = %id,
            role = role.as_str(),
            total = connections.len(),
            "WebSocket subscriber registered"
        );

        Ok(Subscription { id, role, queue })
    }

    /// Remove a subscriber and close its outbound queue
    ///
    /// Returns false if the subscriber was not registered (already removed
    /// or never added); nothing is closed in that case.
    pub async fn unregister(&self, id: &str) -> bool {
        let mut connections = self.connections.write().await;
        let removed = connections.remove(id).is_some();

        if removed {
            tracing::info!(
                connection_id = %id,
                total = connections.len(),
                "WebSocket subscriber unregistered"
            );
        }

        removed
    }

    /// Offer a message to every registered subscriber without waiting.
    ///
    /// A subscriber whose queue is full is treated as unresponsive and
    /// evicted; one whose writer has gone away is dropped as well.
    pub async fn broadcast(&self, message: &str) -> BroadcastReport {
        let mut connections = self.connections.write().await;
        let mut report = BroadcastReport::default();

        connections.retain(|id, handle| {
            report.attempted += 1;
            match handle.sender.try_send(message.to_string()) {
                Ok(()) => {
                    report.delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        connection_id = %id,
                        role = handle.role.as_str(),
                        "Subscriber queue full, evicting"
                    );
                    report.evicted += 1;
                    false
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(connection_id = %id, "Subscriber writer gone, removing");
                    report.evicted += 1;
                    false
                }
            }
        });

        if report.attempted > 0 {
            tracing::trace!(
                subscribers = report.attempted,
                delivered = report.delivered,
                evicted = report.evicted,
                "Broadcast event"
            );
        }

        report
    }

    /// Queue an event for broadcast
    ///
    /// The event is serialized once here. If the intake is full the event
    /// is dropped for everyone and `IntakeFull` is returned; callers log it
    /// and move on.
    pub fn publish(&self, event: &Event) -> Result<(), HubError> {
        let text = serde_json::to_string(event).map_err(|e| HubError::Serialize(e.to_string()))?;
        self.publish_text(text)
    }

    /// Queue an already serialized message for broadcast
    pub fn publish_text(&self, text: String) -> Result<(), HubError> {
        match self.intake_tx.try_send(text) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                tracing::warn!(
                    capacity = self.config.broadcast_capacity,
                    "Broadcast intake full, dropping event"
                );
                Err(HubError::IntakeFull)
            }
            Err(TrySendError::Closed(_)) => Err(HubError::DispatcherStopped),
        }
    }

    /// Start the dispatcher that drains the intake into [`broadcast`].
    ///
    /// Only the first call starts a dispatcher. The task ends once the hub
    /// itself is dropped.
    ///
    /// [`broadcast`]: ConnectionHub::broadcast
    pub fn start_dispatcher(self: Arc<Self>) -> JoinHandle<()> {
        let intake = self.intake_rx.lock().ok().and_then(|mut rx| rx.take());

        let Some(mut intake) = intake else {
            tracing::warn!("Broadcast dispatcher already started");
            return tokio::spawn(async {});
        };

        let hub: Weak<Self> = Arc::downgrade(&self);
        drop(self);

        tracing::info!("Starting broadcast dispatcher");

        tokio::spawn(async move {
            while let Some(message) = intake.recv().await {
                let Some(hub) = hub.upgrade() else {
                    break;
                };
                hub.broadcast(&message).await;
            }
            tracing::debug!("Broadcast dispatcher stopped");
        })
    }

    /// Send a message directly to one subscriber
    ///
    /// Used for per-client replies. Fails rather than waits if the queue is
    /// full.
    pub async fn send_to(&self, id: &str, message: String) -> Result<(), HubError> {
        let connections = self.connections.read().await;
        Self::send_to_handle(&connections, id, message)
    }

    fn send_to_handle(
        connections: &HashMap<ConnectionId, ConnectionHandle>,
        id: &str,
        message: String,
    ) -> Result<(), HubError> {
        let handle = connections.get(id).ok_or(HubError::ConnectionNotFound)?;

        handle.sender.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => HubError::QueueFull,
            TrySendError::Closed(_) => HubError::ConnectionNotFound,
        })
    }

    /// Whether a subscriber is currently registered
    pub async fn contains(&self, id: &str) -> bool {
        self.connections.read().await.contains_key(id)
    }

    /// Get the current connection count
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}

/// Errors that can occur in the connection hub
#[derive(Debug, Error, PartialEq)]
pub enum HubError {
    #[error("Too many connections (limit: {0})")]
    TooManyConnections(usize),

    #[error("Connection not found")]
    ConnectionNotFound,

    #[error("Subscriber queue full")]
    QueueFull,

    #[error("Broadcast intake full, event dropped")]
    IntakeFull,

    #[error("Broadcast dispatcher stopped")]
    DispatcherStopped,

    #[error("Failed to serialize event: {0}")]
    Serialize(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn small_hub(queue_capacity: usize, broadcast_capacity: usize) -> ConnectionHub {
        ConnectionHub::new(HubConfig {
            max_connections: 100,
            queue_capacity,
            broadcast_capacity,
        })
    }

    fn event(n: u64) -> Event {
        json!({"type": "status", "seq": n}).as_object().cloned().unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = HubConfig::default();
        assert_eq!(config.max_connections, 1000);
        assert_eq!(config.queue_capacity, 256);
        assert_eq!(config.broadcast_capacity, 256);
    }

    #[tokio::test]
    async fn test_register_unregister() {
        let hub = ConnectionHub::new(HubConfig::default());

        let sub = hub.register(SubscriberRole::Listener).await.unwrap();
        assert!(!sub.id.is_empty());
        assert_eq!(hub.connection_count().await, 1);
        assert!(hub.contains(&sub.id).await);

        assert!(hub.unregister(&sub.id).await);
        assert_eq!(hub.connection_count().await, 0);
        assert!(!hub.contains(&sub.id).await);
    }

    #[tokio::test]
    async fn test_unregister_is_idempotent() {
        let hub = ConnectionHub::new(HubConfig::default());
        let mut sub = hub.register(SubscriberRole::Recorder).await.unwrap();

        assert!(hub.unregister(&sub.id).await);
        assert!(!hub.unregister(&sub.id).await);
        assert!(!hub.unregister("never-registered").await);

        // Queue was closed by the first unregister
        assert_eq!(sub.queue.recv().await, None);
    }

    #[tokio::test]
    async fn test_no_delivery_after_unregister() {
        let hub = ConnectionHub::new(HubConfig::default());
        let mut a = hub.register(SubscriberRole::Listener).await.unwrap();
        let mut b = hub.register(SubscriberRole::Listener).await.unwrap();

        hub.broadcast("first").await;
        hub.unregister(&a.id).await;
        let report = hub.broadcast("second").await;
        assert_eq!(report.attempted, 1);

        assert_eq!(a.queue.recv().await.as_deref(), Some("first"));
        assert_eq!(a.queue.recv().await, None);

        assert_eq!(b.queue.recv().await.as_deref(), Some("first"));
        assert_eq!(b.queue.recv().await.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_full_queue_evicts_only_slow_subscriber() {
        let hub = small_hub(1, 16);
        let mut slow = hub.register(SubscriberRole::Listener).await.unwrap();
        let mut fast = hub.register(SubscriberRole::Listener).await.unwrap();

        let report = hub.broadcast("one").await;
        assert_eq!(report.delivered, 2);
        assert_eq!(fast.queue.recv().await.as_deref(), Some("one"));

        // slow never drained, its single slot is still occupied
        let report = hub.broadcast("two").await;
        assert_eq!(
            report,
            BroadcastReport {
                attempted: 2,
                delivered: 1,
                evicted: 1
            }
        );

        assert!(!hub.contains(&slow.id).await);
        assert!(hub.contains(&fast.id).await);
        assert_eq!(fast.queue.recv().await.as_deref(), Some("two"));

        assert_eq!(slow.queue.recv().await.as_deref(), Some("one"));
        assert_eq!(slow.queue.recv().await, None);

        // Evicted subscriber cannot be closed twice
        assert!(!hub.unregister(&slow.id).await);
    }

    #[tokio::test]
    async fn test_broadcast_attempts_every_subscriber_once() {
        let hub = small_hub(1, 16);
        let mut subs = Vec::new();
        for _ in 0..5 {
            subs.push(hub.register(SubscriberRole::Listener).await.unwrap());
        }

        let report = hub.broadcast("e").await;
        assert_eq!(report.attempted, 5);
        assert_eq!(report.delivered, 5);

        // Every queue is now full: the next broadcast evicts each exactly once
        let report = hub.broadcast("e").await;
        assert_eq!(report.attempted, 5);
        assert_eq!(report.evicted, 5);
        assert_eq!(hub.connection_count().await, 0);

        let report = hub.broadcast("e").await;
        assert_eq!(report.attempted, 0);
    }

    #[tokio::test]
    async fn test_closed_queue_is_removed() {
        let hub = ConnectionHub::new(HubConfig::default());
        let sub = hub.register(SubscriberRole::Listener).await.unwrap();
        drop(sub.queue);

        let report = hub.broadcast("gone").await;
        assert_eq!(report.evicted, 1);
        assert_eq!(hub.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_connection_limit() {
        let hub = ConnectionHub::new(HubConfig {
            max_connections: 2,
            queue_capacity: 4,
            broadcast_capacity: 4,
        });

        let s1 = hub.register(SubscriberRole::Listener).await.unwrap();
        let _s2 = hub.register(SubscriberRole::Listener).await.unwrap();
        let result = hub.register(SubscriberRole::Listener).await;

        assert!(matches!(result, Err(HubError::TooManyConnections(2))));

        hub.unregister(&s1.id).await;
        assert!(hub.register(SubscriberRole::Listener).await.is_ok());
    }

    #[tokio::test]
    async fn test_publish_preserves_order() {
        let hub = Arc::new(ConnectionHub::new(HubConfig::default()));
        let mut sub = hub.register(SubscriberRole::Listener).await.unwrap();
        let _dispatcher = Arc::clone(&hub).start_dispatcher();

        for n in 0..10 {
            hub.publish(&event(n)).unwrap();
        }

        for n in 0..10 {
            let text = tokio::time::timeout(Duration::from_secs(1), sub.queue.recv())
                .await
                .unwrap()
                .unwrap();
            let value: serde_json::Value = serde_json::from_str(&text).unwrap();
            assert_eq!(value["seq"], n);
        }
    }

    #[tokio::test]
    async fn test_full_intake_drops_newest() {
        let hub = small_hub(4, 1);

        assert!(hub.publish(&event(1)).is_ok());
        assert_eq!(hub.publish(&event(2)), Err(HubError::IntakeFull));
    }

    #[tokio::test]
    async fn test_dispatcher_starts_once() {
        let hub = Arc::new(ConnectionHub::new(HubConfig::default()));
        let first = Arc::clone(&hub).start_dispatcher();
        let second = Arc::clone(&hub).start_dispatcher();

        second.await.unwrap();
        assert!(!first.is_finished());
        first.abort();
    }

    #[tokio::test]
    async fn test_dispatcher_stops_with_hub() {
        let hub = Arc::new(ConnectionHub::new(HubConfig::default()));
        let dispatcher = Arc::clone(&hub).start_dispatcher();
        drop(hub);

        tokio::time::timeout(Duration::from_secs(1), dispatcher)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_send_to() {
        let hub = small_hub(1, 4);
        let mut sub = hub.register(SubscriberRole::Recorder).await.unwrap();

        hub.send_to(&sub.id, "ack".to_string()).await.unwrap();
        assert_eq!(
            hub.send_to(&sub.id, "ack".to_string()).await,
            Err(HubError::QueueFull)
        );
        assert_eq!(sub.queue.recv().await.as_deref(), Some("ack"));

        assert_eq!(
            hub.send_to("missing", "ack".to_string()).await,
            Err(HubError::ConnectionNotFound)
        );
    }

    #[tokio::test]
    async fn test_concurrent_churn() {
        let hub = Arc::new(small_hub(8, 64));
        let _dispatcher = Arc::clone(&hub).start_dispatcher();

        let mut tasks = Vec::new();
        for _ in 0..20 {
            let hub = Arc::clone(&hub);
            tasks.push(tokio::spawn(async move {
                let mut sub = hub.register(SubscriberRole::Listener).await.unwrap();
                tokio::task::yield_now().await;
                // May already have been evicted by a broadcast on a full queue
                hub.unregister(&sub.id).await;
                // Drain whatever arrived while registered; the queue must end
                while sub.queue.recv().await.is_some() {}
            }));
        }
        for n in 0..50 {
            let _ = hub.publish(&event(n));
            tokio::task::yield_now().await;
        }

        for task in tasks {
            tokio::time::timeout(Duration::from_secs(5), task)
                .await
                .unwrap()
                .unwrap();
        }
        assert_eq!(hub.connection_count().await, 0);
    }
}
