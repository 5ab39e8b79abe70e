//! Gateway wire-format messages and event types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// `type` discriminators observed on inbound gateway events.
pub struct EventType;

impl EventType {
    pub const NEW_MESSAGE: &'static str = "new_message";
    pub const NOTIFICATION: &'static str = "notification";
    pub const NOTIFICATION_READ: &'static str = "notification_read";
    pub const JOINED_CONVERSATIONS: &'static str = "joined_conversations";
    pub const INCOMING_CALL: &'static str = "incoming_call";
    pub const CALL_STATE: &'static str = "call_state";
}

// ---------------------------------------------------------------------------
// Server → Client message
// ---------------------------------------------------------------------------

/// An event received from the gateway, tagged by `type`.
///
/// All fields other than the discriminator are optional; which ones are
/// populated depends on the event type. Unknown fields are preserved in
/// `extra` so listeners still see them through the raw envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub message: Option<Value>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub notification: Option<NotificationPayload>,
    #[serde(default)]
    pub notification_id: Option<String>,
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Payload of a `notification` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

/// Payload of an `incoming_call` event.
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingCallPayload {
    pub call_id: String,
    pub conversation_id: String,
    pub caller_id: String,
    #[serde(default)]
    pub caller_name: String,
}

/// Payload of a `call_state` event.
#[derive(Debug, Clone, Deserialize)]
pub struct CallStatePayload {
    pub call_id: String,
    pub state: String,
}

// ---------------------------------------------------------------------------
// Client → Server message
// ---------------------------------------------------------------------------

/// Messages the client sends after the connection opens.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Post-connect authentication. The credential travels in the message
    /// body, never in the connection URL.
    Authenticate { token: String },
    /// Declare the identity's interest set.
    JoinConversations { user_id: String },
}

// ---------------------------------------------------------------------------
// Fan-out envelope
// ---------------------------------------------------------------------------

/// Normalized envelope delivered to registered listeners: the `type`
/// discriminator plus the raw parsed JSON of the whole event.
#[derive(Debug, Clone)]
pub struct EventEnvelope {
    pub kind: String,
    pub data: Value,
}
