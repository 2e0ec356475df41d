//! Typed client and server events.
//!
//! The wire format is always an [`Envelope`]; these types give each known
//! event name a concrete payload so callers match on variants instead of
//! poking at raw JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use mp_core::constants::reserved_events;
use mp_core::error::{MpError, MpResult};

use crate::envelope::Envelope;

pub type ChatId = i64;
pub type UserId = i64;
pub type MessageId = i64;
pub type RequestId = i64;

/// Every event name the server is known to send.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ServerEventKind {
    /// Connection opened or closed (`connection`, client-generated).
    Connection,
    /// Transport error (`error`, client-generated) or server-side failure.
    Error,
    /// A message was posted to a joined chat (`new_message`).
    NewMessage,
    /// Flat chat message payload (`chat_message`).
    ChatMessage,
    /// Delivery status of a sent message changed (`message_status`).
    MessageStatus,
    /// The server confirmed a `join_chat` (`joined_chat`).
    JoinedChat,
    /// Another participant joined the chat (`user_joined`).
    UserJoined,
    /// A participant started typing (`typing_start`).
    TypingStart,
    /// A participant stopped typing (`typing_stop`).
    TypingStop,
    /// A user's activity flag changed (`user_status_changed`).
    UserStatusChanged,
    /// A user came online (`user_online`).
    UserOnline,
    /// A user went offline (`user_offline`).
    UserOffline,
    /// A subscribed request changed (`request_update`).
    RequestUpdate,
    /// A user notification (`notification`).
    Notification,
    /// Anything else.
    Unknown(String),
}

impl ServerEventKind {
    /// Parse an event name.
    pub fn from_name(name: &str) -> Self {
        match name {
            reserved_events::CONNECTION => Self::Connection,
            reserved_events::ERROR => Self::Error,
            "new_message" => Self::NewMessage,
            "chat_message" => Self::ChatMessage,
            "message_status" => Self::MessageStatus,
            "joined_chat" => Self::JoinedChat,
            "user_joined" => Self::UserJoined,
            "typing_start" => Self::TypingStart,
            "typing_stop" => Self::TypingStop,
            "user_status_changed" => Self::UserStatusChanged,
            "user_online" => Self::UserOnline,
            "user_offline" => Self::UserOffline,
            "request_update" => Self::RequestUpdate,
            "notification" => Self::Notification,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// The wire name of this event.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Connection => reserved_events::CONNECTION,
            Self::Error => reserved_events::ERROR,
            Self::NewMessage => "new_message",
            Self::ChatMessage => "chat_message",
            Self::MessageStatus => "message_status",
            Self::JoinedChat => "joined_chat",
            Self::UserJoined => "user_joined",
            Self::TypingStart => "typing_start",
            Self::TypingStop => "typing_stop",
            Self::UserStatusChanged => "user_status_changed",
            Self::UserOnline => "user_online",
            Self::UserOffline => "user_offline",
            Self::RequestUpdate => "request_update",
            Self::Notification => "notification",
            Self::Unknown(s) => s.as_str(),
        }
    }

    /// Events produced by the connection itself rather than the server.
    pub fn is_reserved(&self) -> bool {
        matches!(self, Self::Connection | Self::Error)
    }

    /// Whether this event relates to chat traffic.
    pub fn is_chat_event(&self) -> bool {
        matches!(
            self,
            Self::NewMessage
                | Self::ChatMessage
                | Self::MessageStatus
                | Self::JoinedChat
                | Self::UserJoined
                | Self::TypingStart
                | Self::TypingStop
        )
    }

    /// Whether this event relates to who is online.
    pub fn is_presence_event(&self) -> bool {
        matches!(
            self,
            Self::UserOnline | Self::UserOffline | Self::UserStatusChanged
        )
    }

    /// All known event names.
    pub fn all_event_names() -> &'static [&'static str] {
        &[
            "connection",
            "error",
            "new_message",
            "chat_message",
            "message_status",
            "joined_chat",
            "user_joined",
            "typing_start",
            "typing_stop",
            "user_status_changed",
            "user_online",
            "user_offline",
            "request_update",
            "notification",
        ]
    }
}

impl std::fmt::Display for ServerEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of the reserved `connection` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    /// Close reason, only present on disconnect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Payload of the `error` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

/// Who sent a chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sender {
    pub id: UserId,
    #[serde(default)]
    pub name: Option<String>,
}

/// A chat message as the server broadcasts it. Unknown fields are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub id: Option<MessageId>,
    #[serde(default, rename = "chatId", alias = "chat_id")]
    pub chat_id: Option<ChatId>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub sender: Option<Sender>,
    #[serde(default, rename = "createdAt", alias = "created_at")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatMessage {
    /// Message body, whichever field the server filled in.
    pub fn body(&self) -> Option<&str> {
        self.content.as_deref().or(self.text.as_deref())
    }
}

/// Payload of `new_message`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMessagePayload {
    #[serde(rename = "chatId", alias = "chat_id")]
    pub chat_id: ChatId,
    pub message: ChatMessage,
}

/// Payload of `message_status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageStatusPayload {
    #[serde(rename = "messageId", alias = "message_id")]
    pub message_id: MessageId,
    pub status: String,
}

/// Payload of `joined_chat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinedChatPayload {
    #[serde(rename = "chatId", alias = "chat_id")]
    pub chat_id: ChatId,
}

/// A user reference carried by typing and presence events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    #[serde(rename = "userId", alias = "user_id")]
    pub user_id: UserId,
    #[serde(default, rename = "userName", alias = "user_name")]
    pub user_name: Option<String>,
}

/// Payload of `user_status_changed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStatusPayload {
    #[serde(rename = "userId", alias = "user_id")]
    pub user_id: UserId,
    #[serde(rename = "isActive", alias = "is_active")]
    pub is_active: bool,
}

/// Payload of `request_update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestUpdatePayload {
    #[serde(rename = "requestId", alias = "request_id")]
    pub request_id: RequestId,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Payload of `notification`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default, rename = "type", alias = "kind")]
    pub kind: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A decoded inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Connection(ConnectionStatus),
    Error(ErrorPayload),
    NewMessage(NewMessagePayload),
    ChatMessage(ChatMessage),
    MessageStatus(MessageStatusPayload),
    JoinedChat(JoinedChatPayload),
    UserJoined(UserRef),
    TypingStart(UserRef),
    TypingStop(UserRef),
    UserStatusChanged(UserStatusPayload),
    UserOnline(UserRef),
    UserOffline(UserRef),
    RequestUpdate(RequestUpdatePayload),
    Notification(NotificationPayload),
    Unknown(Envelope),
}

impl ServerEvent {
    /// Decode an envelope into its typed event.
    ///
    /// Unknown event names become [`ServerEvent::Unknown`]; a known name with
    /// a payload of the wrong shape is an error.
    pub fn decode(envelope: &Envelope) -> MpResult<Self> {
        fn payload<T: serde::de::DeserializeOwned>(envelope: &Envelope) -> MpResult<T> {
            T::deserialize(&envelope.data).map_err(|e| {
                MpError::Serialization(format!("bad `{}` payload: {e}", envelope.event))
            })
        }

        let event = match ServerEventKind::from_name(&envelope.event) {
            ServerEventKind::Connection => Self::Connection(payload(envelope)?),
            ServerEventKind::Error => Self::Error(payload(envelope)?),
            ServerEventKind::NewMessage => Self::NewMessage(payload(envelope)?),
            ServerEventKind::ChatMessage => Self::ChatMessage(payload(envelope)?),
            ServerEventKind::MessageStatus => Self::MessageStatus(payload(envelope)?),
            ServerEventKind::JoinedChat => Self::JoinedChat(payload(envelope)?),
            ServerEventKind::UserJoined => Self::UserJoined(payload(envelope)?),
            ServerEventKind::TypingStart => Self::TypingStart(payload(envelope)?),
            ServerEventKind::TypingStop => Self::TypingStop(payload(envelope)?),
            ServerEventKind::UserStatusChanged => Self::UserStatusChanged(payload(envelope)?),
            ServerEventKind::UserOnline => Self::UserOnline(payload(envelope)?),
            ServerEventKind::UserOffline => Self::UserOffline(payload(envelope)?),
            ServerEventKind::RequestUpdate => Self::RequestUpdate(payload(envelope)?),
            ServerEventKind::Notification => Self::Notification(payload(envelope)?),
            ServerEventKind::Unknown(_) => Self::Unknown(envelope.clone()),
        };
        Ok(event)
    }

    pub fn kind(&self) -> ServerEventKind {
        match self {
            Self::Connection(_) => ServerEventKind::Connection,
            Self::Error(_) => ServerEventKind::Error,
            Self::NewMessage(_) => ServerEventKind::NewMessage,
            Self::ChatMessage(_) => ServerEventKind::ChatMessage,
            Self::MessageStatus(_) => ServerEventKind::MessageStatus,
            Self::JoinedChat(_) => ServerEventKind::JoinedChat,
            Self::UserJoined(_) => ServerEventKind::UserJoined,
            Self::TypingStart(_) => ServerEventKind::TypingStart,
            Self::TypingStop(_) => ServerEventKind::TypingStop,
            Self::UserStatusChanged(_) => ServerEventKind::UserStatusChanged,
            Self::UserOnline(_) => ServerEventKind::UserOnline,
            Self::UserOffline(_) => ServerEventKind::UserOffline,
            Self::RequestUpdate(_) => ServerEventKind::RequestUpdate,
            Self::Notification(_) => ServerEventKind::Notification,
            Self::Unknown(env) => ServerEventKind::Unknown(env.event.clone()),
        }
    }
}

/// A file reference attached to an outgoing chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub file_name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// Every event the client sends.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    JoinChat {
        chat_id: ChatId,
    },
    LeaveChat {
        chat_id: ChatId,
    },
    SendMessage {
        chat_id: ChatId,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        attachments: Option<Vec<Attachment>>,
    },
    MarkRead {
        chat_id: ChatId,
        message_ids: Vec<MessageId>,
    },
    TypingStart {
        chat_id: ChatId,
    },
    TypingStop {
        chat_id: ChatId,
    },
    SubscribeRequest {
        request_id: RequestId,
    },
    UnsubscribeRequest {
        request_id: RequestId,
    },
}

impl ClientEvent {
    /// The wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinChat { .. } => "join_chat",
            Self::LeaveChat { .. } => "leave_chat",
            Self::SendMessage { .. } => "send_message",
            Self::MarkRead { .. } => "mark_read",
            Self::TypingStart { .. } => "typing_start",
            Self::TypingStop { .. } => "typing_stop",
            Self::SubscribeRequest { .. } => "subscribe_request",
            Self::UnsubscribeRequest { .. } => "unsubscribe_request",
        }
    }

    pub fn to_envelope(&self) -> MpResult<Envelope> {
        let value = serde_json::to_value(self)?;
        Envelope::from_value(value)
            .ok_or_else(|| MpError::Internal(format!("{} did not serialize as an envelope", self.name())))
    }
}
