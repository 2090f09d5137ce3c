// ABOUTME: Gateway boundary: typed frames and the transport trait the session controller consumes.
// ABOUTME: The wire protocol is abstract; a connection is a pair of frame channels.

pub mod tcp;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Identity of a chat user as reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatUser {
    /// Unique identifier on the platform
    pub id: String,
    /// Display name, if the platform provides one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl ChatUser {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
        }
    }

    pub fn with_name(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: Some(name.into()),
        }
    }
}

/// Kind of a gateway event. Listeners subscribe by kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Message,
    MemberJoin,
    MemberLeave,
    PresenceUpdate,
    Other(String),
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Message => write!(f, "message"),
            Self::MemberJoin => write!(f, "member_join"),
            Self::MemberLeave => write!(f, "member_leave"),
            Self::PresenceUpdate => write!(f, "presence_update"),
            Self::Other(name) => write!(f, "{name}"),
        }
    }
}

/// A decoded event delivered to the router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayEvent {
    /// Gateway-assigned event id, used for operator logs
    pub id: String,
    pub kind: EventKind,
    /// Channel the event originated in
    pub channel_id: String,
    pub sender: ChatUser,
    /// Text body; empty for non-message events
    #[serde(default)]
    pub body: String,
    /// Kind-specific extras, passed through to handlers untouched
    #[serde(default)]
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Why the server closed the connection. Determines the reconnect path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum CloseReason {
    /// Session may be resumed with the stored token
    Resumable { detail: String },
    /// Session is gone; a fresh identify is required
    NonResumable { detail: String },
    /// Credentials rejected; not retryable
    AuthFailed { detail: String },
    /// Client and server disagree on the protocol; not retryable
    ProtocolMismatch { detail: String },
}

impl CloseReason {
    pub fn is_resumable(&self) -> bool {
        matches!(self, Self::Resumable { .. })
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::AuthFailed { .. } | Self::ProtocolMismatch { .. })
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resumable { detail } => write!(f, "resumable close: {detail}"),
            Self::NonResumable { detail } => write!(f, "non-resumable close: {detail}"),
            Self::AuthFailed { detail } => write!(f, "authentication failed: {detail}"),
            Self::ProtocolMismatch { detail } => write!(f, "protocol mismatch: {detail}"),
        }
    }
}

/// An event frame with its gateway sequence number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFrame {
    pub seq: u64,
    pub event: GatewayEvent,
}

/// Server-to-client frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayFrame {
    /// First frame after connect; carries the heartbeat cadence
    Hello { heartbeat_interval_ms: u64 },
    /// Identify accepted; carries the resume credential and starting sequence
    Ready { resume_token: String, seq: u64 },
    /// Resume accepted; replayed events follow as ordinary Event frames
    Resumed,
    Event(EventFrame),
    HeartbeatAck,
    /// Resume (or session) rejected; resumable says whether another resume may work
    InvalidSession { resumable: bool },
    Close { reason: CloseReason },
}

/// User-visible reply payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyContent {
    /// Ordinary response text
    Text(String),
    /// System notice (joins, status changes)
    Notice(String),
    /// User-visible error
    Error(String),
}

impl ReplyContent {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Text(s) | Self::Notice(s) | Self::Error(s) => s,
        }
    }
}

/// Client-to-server frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Identify { token: String },
    Resume { token: String, seq: u64 },
    Heartbeat { seq: u64 },
    Reply { channel_id: String, content: ReplyContent },
    Presence { text: String },
    Close,
}

/// One live connection: inbound frames and an outbound sink.
///
/// Dropping the receiver or the transport closing either channel ends the
/// connection; the session controller treats that as a resumable disconnect.
pub struct GatewayConnection {
    pub frames: mpsc::Receiver<GatewayFrame>,
    pub sink: mpsc::Sender<ClientFrame>,
}

/// Factory for gateway connections. One transport per process; `connect` is
/// called again for every reconnect attempt.
#[async_trait]
pub trait GatewayTransport: Send + Sync {
    async fn connect(&self) -> anyhow::Result<GatewayConnection>;
}
