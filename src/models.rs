// src/models.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque handle for one live socket. Assigned by the server on upgrade.
pub type ConnectionId = Uuid;
pub type RoomId = String;
pub type MessageId = String;

/// Identity supplied by the auth collaborator at join time. Trusted as-is.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    #[default]
    Online,
    Away,
    Busy,
}

/// Server-side record binding a live connection to a user and a room.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: ConnectionId,
    pub username: String,
    pub email: Option<String>,
    pub avatar: Option<String>,
    pub status: PresenceStatus,
    pub joined_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub last_seen: Option<DateTime<Utc>>,
    pub room_id: Option<RoomId>,
}

/// Static room definition.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RoomInfo {
    pub id: RoomId,
    pub name: String,
    pub description: String,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    File,
}

/// Descriptor returned by the upload store. The core never checks that the
/// referenced blob exists.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileAttachment {
    pub id: String,
    pub original_name: String,
    pub stored_name: String,
    pub size: u64,
    pub mimetype: String,
    pub url: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub emoji: String,
    pub user_id: ConnectionId,
    pub username: String,
    pub timestamp: DateTime<Utc>,
}

/// A room message as stored in history and broadcast to members.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: MessageId,
    pub room_id: RoomId,
    pub sender: String,
    pub sender_id: ConnectionId,
    pub sender_avatar: Option<String>,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub file: Option<FileAttachment>,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    #[serde(default)]
    pub is_edited: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PrivateMessage {
    pub id: MessageId,
    pub sender: String,
    pub sender_id: ConnectionId,
    pub sender_avatar: Option<String>,
    pub recipient_id: ConnectionId,
    pub recipient_name: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub is_read: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TypingUser {
    pub id: ConnectionId,
    pub username: String,
    pub started_typing: DateTime<Utc>,
}

/// Who acknowledged a message.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptUser {
    pub user_id: ConnectionId,
    pub username: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub user_id: ConnectionId,
    pub username: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessageReceipts {
    pub delivery_receipts: Vec<Receipt>,
    pub read_receipts: Vec<Receipt>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotAuthenticated,
    NotFound,
    InvalidEvent,
    Internal,
}

/// An event sent from a client to the server.
/// Deserialized from incoming JSON text.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Profile fields sit beside `type`. `username` is required; a frame
    /// without it is an invalid event.
    UserJoin {
        #[serde(flatten)]
        profile: UserProfile,
    },
    JoinRoom {
        room_id: RoomId,
    },
    SendMessage {
        content: String,
    },
    SendFileMessage {
        file: FileAttachment,
        #[serde(default)]
        caption: String,
    },
    Typing {
        is_typing: bool,
    },
    UpdateStatus {
        status: PresenceStatus,
    },
    SendPrivateMessage {
        recipient_id: ConnectionId,
        content: String,
    },
    GetPrivateMessages {
        recipient_id: ConnectionId,
    },
    MarkPrivateMessagesRead {
        sender_id: ConnectionId,
    },
    AddReaction {
        message_id: MessageId,
        emoji: String,
    },
    RemoveReaction {
        message_id: MessageId,
        emoji: String,
    },
    MarkMessageRead {
        message_id: MessageId,
    },
    MarkMessagesDelivered {
        message_ids: Vec<MessageId>,
    },
    GetMessageReceipts {
        message_id: MessageId,
    },
}

/// An event sent from the server to a client.
/// Serialized into JSON text for sending.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    UserAuthenticated {
        user: Session,
    },
    RoomList {
        rooms: Vec<RoomInfo>,
    },
    MessageHistory {
        room_id: RoomId,
        messages: Vec<ChatMessage>,
    },
    RoomJoined {
        room_id: RoomId,
    },
    UserJoined {
        id: ConnectionId,
        username: String,
        room_id: RoomId,
    },
    UserLeft {
        id: ConnectionId,
        username: String,
        room_id: RoomId,
        left_at: DateTime<Utc>,
    },
    UserList {
        room_id: RoomId,
        users: Vec<Session>,
    },
    ReceiveMessage {
        message: ChatMessage,
    },
    TypingUsers {
        room_id: RoomId,
        users: Vec<TypingUser>,
    },
    ReceivePrivateMessage {
        message: PrivateMessage,
    },
    PrivateMessageSent {
        message: PrivateMessage,
    },
    PrivateMessageHistory {
        recipient_id: ConnectionId,
        messages: Vec<PrivateMessage>,
    },
    PrivateMessagesMarkedRead {
        read_by: ConnectionId,
    },
    ReactionUpdated {
        message_id: MessageId,
        room_id: RoomId,
        reactions: Vec<Reaction>,
    },
    MessageReadReceipt {
        message_id: MessageId,
        read_by: ReceiptUser,
        read_at: DateTime<Utc>,
    },
    MessagesDelivered {
        message_ids: Vec<MessageId>,
        delivered_to: ReceiptUser,
        delivered_at: DateTime<Utc>,
    },
    MessageReceipts {
        message_id: MessageId,
        #[serde(flatten)]
        receipts: MessageReceipts,
    },
    Error {
        code: ErrorKind,
        message: String,
    },
}
