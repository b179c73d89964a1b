//! Relay protocol message definitions.
//!
//! JSON over WebSocket. Clients register a username, then subscribe to
//! community channels; the relay pushes full community snapshots and
//! notifications.

use std::sync::Arc;

use agora_core::{CommunityUpdatePayload, Error, Notification};
use serde::{Deserialize, Serialize};

// ── Client → Relay ────────────────────────────────────────────────────────────

/// Messages sent from a client to the relay server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Associate this connection with a username.
    /// Must be sent first after connecting.
    Register { username: String },

    /// Start receiving updates on a channel (`community:<id>` or
    /// `communities`).
    Subscribe { channel: String },

    /// Stop receiving updates on a channel.
    Unsubscribe { channel: String },

    /// Ping to keep connection alive.
    Ping,
}

// ── Relay → Client ────────────────────────────────────────────────────────────

/// Messages sent from the relay server to a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Registration acknowledged.
    Registered { username: String },

    Subscribed { channel: String },

    Unsubscribed { channel: String },

    /// A committed community change on a subscribed channel.
    Update {
        channel: String,
        payload: Arc<CommunityUpdatePayload>,
    },

    /// A notification addressed to the registered user.
    Notification { notification: Notification },

    /// Pong response to client ping.
    Pong,

    /// Error message. `code` follows the engine's error codes.
    Error { code: i32, message: String },
}

impl ServerMessage {
    /// Error message for a rejected command.
    pub fn from_error(err: &Error) -> Self {
        Self::Error {
            code: err.code(),
            message: err.to_string(),
        }
    }

    /// Error message for a protocol-level problem (bad frame, wrong order).
    pub fn protocol_error(message: impl Into<String>) -> Self {
        Self::Error {
            code: Error::InvalidInput(String::new()).code(),
            message: message.into(),
        }
    }
}
