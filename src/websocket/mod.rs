//! WebSocket Real-Time Streaming
//!
//! Fans detector events out to browser dashboards.
//!
//! ## Architecture
//!
//! - **ConnectionHub**: Membership, ordered broadcast, slow-subscriber eviction
//! - **Connection**: Per-socket writer task draining the subscriber queue
//! - **Handler**: WebSocket upgrade and inbound frame processing
//! - **Messages**: Replies sent to recorder clients
//!
//! ## Endpoints
//!
//! - `/api/ws/events` - listener, receive-only
//! - `/api/ws` - recorder, may also submit log records
//!
//! ## Example
//!
//! ```javascript
//! const ws = new WebSocket('ws://localhost:8080/api/ws/events');
//!
//! ws.onmessage = (event) => {
//!   const msg = JSON.parse(event.data);
//!   if (msg.type === 'detection') console.log(msg.data.name);
//! };
//! ```

mod connection;
mod handler;
mod hub;
mod messages;

pub use connection::{run_writer, spawn_writer, WriterExit};
pub use handler::{events_websocket_handler, websocket_handler};
pub use hub::{
    BroadcastReport, ConnectionHub, ConnectionId, HubConfig, HubError, SubscriberRole,
    Subscription,
};
pub use messages::RecorderReply;
