use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::types::MessageId;

/// All commands understood by the relay, keyed by their wire id.
///
/// The frame id of a request selects the command; the reply reuses the same
/// id. [`Command::MessageBroadcast`] is the only server-initiated frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Command {
    /// Echo the request data back to the sender
    Echo = 1,

    /// Exchange an identity token for a bound session
    Authenticate = 10,

    /// Create a room owned by the caller
    CreateRoom = 201,

    /// Join a room by its shareable code
    JoinRoom = 202,

    /// Persist a chat message and fan it out to the room
    SendMessage = 301,

    /// Server -> client delivery of a message sent to a subscribed room
    MessageBroadcast = 302,

    /// Page through a room's history, newest first
    FetchMessages = 310,
}

impl Command {
    pub const fn id(self) -> u32 {
        self as u32
    }

    pub fn from_id(id: u32) -> Option<Self> {
        match id {
            1 => Some(Self::Echo),
            10 => Some(Self::Authenticate),
            201 => Some(Self::CreateRoom),
            202 => Some(Self::JoinRoom),
            301 => Some(Self::SendMessage),
            302 => Some(Self::MessageBroadcast),
            310 => Some(Self::FetchMessages),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Echo => "echo",
            Self::Authenticate => "authenticate",
            Self::CreateRoom => "create_room",
            Self::JoinRoom => "join_room",
            Self::SendMessage => "send_message",
            Self::MessageBroadcast => "message_broadcast",
            Self::FetchMessages => "fetch_messages",
        }
    }
}

impl TryFrom<u32> for Command {
    type Error = ProtocolError;

    fn try_from(id: u32) -> Result<Self, Self::Error> {
        Self::from_id(id).ok_or(ProtocolError::UnknownCommand(id))
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name(), self.id())
    }
}

/// Format a timestamp the way every payload carries it (RFC 3339, UTC, seconds).
pub fn wire_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

// Absent fields decode to their zero value; the handlers decide what is required.

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthenticateRequest {
    pub token: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateRoomRequest {
    pub user_id: String,
    pub room_name: String,
    pub is_private: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinRoomRequest {
    pub code: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SendMessageRequest {
    pub user_id: String,
    pub room_id: String,
    pub body: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchMessagesRequest {
    pub room_id: String,
    /// Decimal message id cursor; empty for the newest page.
    pub before_id: String,
    /// Non-positive means "use the default page size".
    pub limit: i64,
    pub user_id: String,
    pub include_system: bool,
}

// ---------------------------------------------------------------------------
// Replies
// ---------------------------------------------------------------------------

/// Envelope shared by every reply: `success`, a human-readable `message`, and
/// the command's own fields flattened alongside on success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply<T> {
    pub success: bool,
    pub message: String,
    #[serde(flatten)]
    pub body: Option<T>,
}

impl<T> Reply<T> {
    pub fn ok(message: impl Into<String>, body: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            body: Some(body),
        }
    }
}

/// Reply sent for any rejected command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Failure {
    pub success: bool,
    pub message: String,
}

impl Failure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Authenticated {
    pub user_id: String,
    pub user_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomCreated {
    pub room_id: String,
    pub room_code: String,
    pub room_name: String,
    pub is_private: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomJoined {
    pub room_id: String,
    pub code: String,
    pub title: String,
    pub owner_id: String,
    pub is_private: bool,
    pub created_at: String,
}

/// Body of both the 301 reply and the 302 broadcast.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: MessageId,
    pub room_id: String,
    pub sender_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sender_name: String,
    pub body: String,
    pub sent_at: String,
}

/// One history row in a 310 reply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    pub id: MessageId,
    pub room_id: String,
    pub sender_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sender_name: String,
    pub body: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePage {
    pub messages: Vec<HistoryEntry>,
    pub has_more: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_before_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_before_created_at: Option<String>,
}
