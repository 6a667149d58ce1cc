//! Chat event types
//!
//! Every event serializes to a JSON object discriminated by its `type` field:
//!
//! ```text
//! {"type":"connected","roomId":"lobby"}
//! {"type":"ping"}
//! {"type":"message","roomId":"lobby","message":{"id":..,"text":..,"sender":{"username":..},"createdAt":..,"reactions":{}}}
//! {"type":"room-users","roomId":"lobby","users":[{"username":..,"status":"online"}]}
//! {"type":"user-joined","roomId":"lobby","username":..,"status":"online","message":..}
//! {"type":"user-status-changed","roomId":"lobby","username":..,"status":"away","message":..}
//! {"type":"reaction-added","roomId":"lobby","messageId":..,"reactions":{..}}
//! ```

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::registry::RoomId;

/// Emoji to the usernames that reacted with it
pub type Reactions = BTreeMap<String, Vec<String>>;

/// Presence status of a room member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Online,
    Away,
    Offline,
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UserStatus::Online => "online",
            UserStatus::Away => "away",
            UserStatus::Offline => "offline",
        };
        f.write_str(s)
    }
}

/// Author of a chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSender {
    pub username: String,
}

/// A persisted chat message as pushed to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Id assigned by the persistence layer
    pub id: String,
    /// Message body
    pub text: String,
    /// Author
    pub sender: MessageSender,
    /// Creation time of the stored record
    #[serde(with = "millis_timestamp")]
    pub created_at: DateTime<Utc>,
    /// Reactions recorded so far
    #[serde(default)]
    pub reactions: Reactions,
}

/// RFC 3339 with exactly three fractional digits and a `Z` suffix
/// (`2024-05-01T12:00:00.000Z`), the format browsers produce for dates.
mod millis_timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&at.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        DateTime::<Utc>::deserialize(deserializer)
    }
}

impl ChatMessage {
    /// Create a message with no reactions
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        sender: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            sender: MessageSender {
                username: sender.into(),
            },
            created_at,
            reactions: Reactions::new(),
        }
    }

    /// Record `username` reacting with `emoji`
    ///
    /// Reacting twice with the same emoji appends the name twice, matching the
    /// way reaction lists are stored.
    pub fn add_reaction(&mut self, emoji: impl Into<String>, username: impl Into<String>) {
        self.reactions
            .entry(emoji.into())
            .or_default()
            .push(username.into());
    }
}

/// Member entry in a `room-users` snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomUser {
    pub username: String,
    pub status: UserStatus,
}

/// Event pushed to the subscribers of a room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ChatEvent {
    /// First frame on every new connection
    Connected { room_id: RoomId },

    /// Keep-alive
    Ping,

    /// A new chat message
    Message {
        room_id: RoomId,
        message: ChatMessage,
    },

    /// Full presence list of a room
    RoomUsers {
        room_id: RoomId,
        users: Vec<RoomUser>,
    },

    /// A member entered the room
    UserJoined {
        room_id: RoomId,
        username: String,
        status: UserStatus,
        message: String,
    },

    /// A member changed presence status
    UserStatusChanged {
        room_id: RoomId,
        username: String,
        status: UserStatus,
        message: String,
    },

    /// Reactions on a message changed
    ReactionAdded {
        room_id: RoomId,
        message_id: String,
        reactions: Reactions,
    },
}

/// Discriminant of a [`ChatEvent`], used for logging and stats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connected,
    Ping,
    Message,
    RoomUsers,
    UserJoined,
    UserStatusChanged,
    ReactionAdded,
}

impl EventKind {
    /// Wire name carried in the `type` field
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Connected => "connected",
            EventKind::Ping => "ping",
            EventKind::Message => "message",
            EventKind::RoomUsers => "room-users",
            EventKind::UserJoined => "user-joined",
            EventKind::UserStatusChanged => "user-status-changed",
            EventKind::ReactionAdded => "reaction-added",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ChatEvent {
    pub fn connected(room_id: RoomId) -> Self {
        ChatEvent::Connected { room_id }
    }

    pub fn ping() -> Self {
        ChatEvent::Ping
    }

    pub fn message(room_id: RoomId, message: ChatMessage) -> Self {
        ChatEvent::Message { room_id, message }
    }

    pub fn room_users(room_id: RoomId, users: Vec<RoomUser>) -> Self {
        ChatEvent::RoomUsers { room_id, users }
    }

    /// Announce a member joining, with the notice text shown to the others
    pub fn user_joined(room_id: RoomId, username: impl Into<String>) -> Self {
        let username = username.into();
        ChatEvent::UserJoined {
            room_id,
            message: format!("{} has joined the room", username),
            username,
            status: UserStatus::Online,
        }
    }

    pub fn user_status_changed(
        room_id: RoomId,
        username: impl Into<String>,
        status: UserStatus,
    ) -> Self {
        let username = username.into();
        ChatEvent::UserStatusChanged {
            room_id,
            message: format!("{} is now {}", username, status),
            username,
            status,
        }
    }

    /// Status change sent when a member's last connection goes away
    pub fn user_disconnected(room_id: RoomId, username: impl Into<String>) -> Self {
        let username = username.into();
        ChatEvent::UserStatusChanged {
            room_id,
            message: format!("{} has disconnected", username),
            username,
            status: UserStatus::Offline,
        }
    }

    pub fn reaction_added(
        room_id: RoomId,
        message_id: impl Into<String>,
        reactions: Reactions,
    ) -> Self {
        ChatEvent::ReactionAdded {
            room_id,
            message_id: message_id.into(),
            reactions,
        }
    }

    /// Event discriminant
    pub fn kind(&self) -> EventKind {
        match self {
            ChatEvent::Connected { .. } => EventKind::Connected,
            ChatEvent::Ping => EventKind::Ping,
            ChatEvent::Message { .. } => EventKind::Message,
            ChatEvent::RoomUsers { .. } => EventKind::RoomUsers,
            ChatEvent::UserJoined { .. } => EventKind::UserJoined,
            ChatEvent::UserStatusChanged { .. } => EventKind::UserStatusChanged,
            ChatEvent::ReactionAdded { .. } => EventKind::ReactionAdded,
        }
    }

    /// Room the event belongs to (`None` for pings)
    pub fn room_id(&self) -> Option<&RoomId> {
        match self {
            ChatEvent::Ping => None,
            ChatEvent::Connected { room_id }
            | ChatEvent::Message { room_id, .. }
            | ChatEvent::RoomUsers { room_id, .. }
            | ChatEvent::UserJoined { room_id, .. }
            | ChatEvent::UserStatusChanged { room_id, .. }
            | ChatEvent::ReactionAdded { room_id, .. } => Some(room_id),
        }
    }
}
