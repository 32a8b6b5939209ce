//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the browser client and the
//! API server for live invoice notifications.
//!
//! The socket is one-directional: clients subscribe by connecting and only
//! receive events. There is no replay: a client that connects after an event
//! was generated fetches history via `GET /notifications` instead.

use invoice_core::domain::Notification;
use serde::Serialize;

/// Represents the structured messages the server can push to the client.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A freshly generated due-date notification.
    Notification { notification: Notification },
}
