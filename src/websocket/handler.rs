//! WebSocket Handler
//!
//! Upgrades HTTP requests to subscriber connections and runs their
//! lifecycle: register, write queued messages, read inbound frames, and
//! unregister exactly once when either side stops.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;

use super::connection::spawn_writer;
use super::hub::{ConnectionHub, SubscriberRole, Subscription};
use super::messages::RecorderReply;
use crate::api::AppState;
use crate::store::{LogStore, NewLogEntry, StoreError};

/// Recorder endpoint (`/api/ws`): receives broadcasts and may submit
/// log records, each acknowledged on the same socket.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    let hub = Arc::clone(&state.hub);
    let store = state.store.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, hub, SubscriberRole::Recorder, store))
}

/// Listener endpoint (`/api/ws/events`): receive-only event feed
pub async fn events_websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    let hub = Arc::clone(&state.hub);
    let store = state.store.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, hub, SubscriberRole::Listener, store))
}

/// Handle an established WebSocket connection
async fn handle_socket(
    socket: WebSocket,
    hub: Arc<ConnectionHub>,
    role: SubscriberRole,
    store: LogStore,
) {
    let (mut sender, mut receiver) = socket.split();

    let Subscription {
        id: connection_id,
        queue,
        ..
    } = match hub.register(role).await {
        Ok(subscription) => subscription,
        Err(e) => {
            tracing::warn!(error = %e, role = role.as_str(), "Rejected WebSocket connection");
            let _ = sender
                .send(Message::Text(RecorderReply::error(e.to_string()).to_text()))
                .await;
            let _ = sender.close().await;
            return;
        }
    };

    let mut send_task = spawn_writer(sender, queue, connection_id.clone());

    let hub_for_recv = Arc::clone(&hub);
    let conn_id_for_recv = connection_id.clone();

    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(msg) => {
                    if !handle_ws_message(&hub_for_recv, &store, &conn_id_for_recv, role, msg).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!(
                        connection_id = %conn_id_for_recv,
                        error = %e,
                        "WebSocket receive error"
                    );
                    break;
                }
            }
        }
    });

    tokio::select! {
        exit = &mut send_task => {
            tracing::debug!(connection_id = %connection_id, exit = ?exit.ok(), "Writer stopped");
            recv_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
        }
    }

    hub.unregister(&connection_id).await;
}

/// Handle a received WebSocket message
///
/// Returns false if the connection should be closed.
async fn handle_ws_message(
    hub: &ConnectionHub,
    store: &LogStore,
    connection_id: &str,
    role: SubscriberRole,
    message: Message,
) -> bool {
    match (message, role) {
        (Message::Text(text), SubscriberRole::Recorder) => {
            handle_recorder_text(hub, store, connection_id, &text).await;
            true
        }
        (Message::Binary(_), SubscriberRole::Recorder) => {
            reply(hub, connection_id, RecorderReply::error("binary messages not supported")).await;
            true
        }
        (Message::Text(_) | Message::Binary(_), SubscriberRole::Listener) => {
            tracing::debug!(connection_id = %connection_id, "Ignoring inbound frame on listener");
            true
        }
        (Message::Ping(_) | Message::Pong(_), _) => true,
        (Message::Close(_), _) => {
            tracing::debug!(connection_id = %connection_id, "Client requested close");
            false
        }
    }
}

/// Store one submitted log record and acknowledge it
async fn handle_recorder_text(hub: &ConnectionHub, store: &LogStore, connection_id: &str, text: &str) {
    let entry = match serde_json::from_str::<NewLogEntry>(text) {
        Ok(entry) => entry,
        Err(e) => {
            tracing::debug!(connection_id = %connection_id, error = %e, "Invalid log record");
            reply(hub, connection_id, RecorderReply::invalid_json()).await;
            return;
        }
    };

    let response = match store.create(entry).await {
        Ok(saved) => {
            tracing::info!(log_id = saved.id, name = %saved.name, "Log saved from WebSocket");
            RecorderReply::saved()
        }
        Err(StoreError::Validation(reason)) => RecorderReply::error(reason),
        Err(e) => {
            tracing::error!(connection_id = %connection_id, error = %e, "Failed to save log");
            RecorderReply::db_failed()
        }
    };

    reply(hub, connection_id, response).await;
}

async fn reply(hub: &ConnectionHub, connection_id: &str, response: RecorderReply) {
    if let Err(e) = hub.send_to(connection_id, response.to_text()).await {
        tracing::debug!(connection_id = %connection_id, error = %e, "Reply not delivered");
    }
}
