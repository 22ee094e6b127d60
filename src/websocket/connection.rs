//! Subscriber Connection Writer
//!
//! Each socket has exactly one writer task. It drains the subscriber's
//! outbound queue in FIFO order and is the only code that writes to the
//! socket, so frames are never interleaved.

use axum::extract::ws::Message;
use futures_util::{Sink, SinkExt};
use std::fmt::Display;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Why a writer task stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterExit {
    /// The hub closed the queue (unregistered or evicted)
    QueueClosed,
    /// Writing to the socket failed
    TransportFailed,
}

/// Write every queued message to `sink` until the queue closes or a write
/// fails. On a clean close a Close frame is sent before returning.
pub async fn run_writer<S>(
    mut sink: S,
    mut queue: mpsc::Receiver<String>,
    connection_id: &str,
) -> WriterExit
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    while let Some(text) = queue.recv().await {
        if let Err(e) = sink.send(Message::Text(text)).await {
            tracing::debug!(
                connection_id = %connection_id,
                error = %e,
                "WebSocket send failed, closing connection"
            );
            return WriterExit::TransportFailed;
        }
    }

    tracing::debug!(connection_id = %connection_id, "Outbound queue closed");
    let _ = sink.send(Message::Close(None)).await;
    let _ = sink.close().await;
    WriterExit::QueueClosed
}

/// Spawn the writer task for one connection
pub fn spawn_writer<S>(
    sink: S,
    queue: mpsc::Receiver<String>,
    connection_id: String,
) -> JoinHandle<WriterExit>
where
    S: Sink<Message> + Unpin + Send + 'static,
    S::Error: Display,
{
    tokio::spawn(async move { run_writer(sink, queue, &connection_id).await })
}
