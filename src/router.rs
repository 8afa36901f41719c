// src/router.rs

//! Event router: inbound client events in, addressed outbound events out.
//!
//! The router owns every store and performs no I/O. Each call validates the
//! sender against the registry, mutates the relevant store and returns the
//! [`Dispatch`]es the transport must deliver. Callers hold one lock around the
//! router, so every handler runs atomically with respect to all stores and
//! per-room broadcast order is the order events were accepted.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::{
    conversations::{ConversationStore, canonical_key},
    error::ChatError,
    models::{
        ChatMessage, ClientMessage, ConnectionId, ErrorKind, FileAttachment, MessageId,
        MessageKind, PresenceStatus, PrivateMessage, ReceiptUser, RoomId, ServerMessage, Session,
        UserProfile,
    },
    reactions,
    receipts::ReceiptTracker,
    registry::ConnectionRegistry,
    rooms::RoomStore,
};

/// One outbound event and the connections that should receive it.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub recipients: Vec<ConnectionId>,
    pub message: ServerMessage,
}

impl Dispatch {
    pub fn to_one(recipient: ConnectionId, message: ServerMessage) -> Self {
        Self { recipients: vec![recipient], message }
    }
}

#[derive(Debug, Default)]
pub struct EventRouter {
    registry: ConnectionRegistry,
    rooms: RoomStore,
    conversations: ConversationStore,
    receipts: ReceiptTracker,
    /// Disambiguates ids minted within the same millisecond
    message_seq: u64,
}

impl EventRouter {
    pub fn new(rooms: RoomStore) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            rooms,
            conversations: ConversationStore::new(),
            receipts: ReceiptTracker::new(),
            message_seq: 0,
        }
    }

    /// Process one inbound event from `conn`.
    ///
    /// Core failures come back as a single `error` event to the actor; they
    /// never reach other connections.
    pub fn handle(&mut self, conn: ConnectionId, event: ClientMessage) -> Vec<Dispatch> {
        let result = match event {
            ClientMessage::UserJoin { profile } => self.join(conn, profile),
            ClientMessage::JoinRoom { room_id } => self.switch_room(conn, room_id),
            ClientMessage::SendMessage { content } => self.send_message(conn, content),
            ClientMessage::SendFileMessage { file, caption } => {
                self.send_file_message(conn, file, caption)
            }
            ClientMessage::Typing { is_typing: true } => Ok(self.typing_start(conn)),
            ClientMessage::Typing { is_typing: false } => Ok(self.typing_stop(conn)),
            ClientMessage::UpdateStatus { status } => Ok(self.update_status(conn, status)),
            ClientMessage::SendPrivateMessage { recipient_id, content } => {
                self.send_private_message(conn, recipient_id, content)
            }
            ClientMessage::GetPrivateMessages { recipient_id } => {
                self.private_history(conn, recipient_id)
            }
            ClientMessage::MarkPrivateMessagesRead { sender_id } => {
                self.mark_private_read(conn, sender_id)
            }
            ClientMessage::AddReaction { message_id, emoji } => {
                self.add_reaction(conn, message_id, emoji)
            }
            ClientMessage::RemoveReaction { message_id, emoji } => {
                self.remove_reaction(conn, message_id, emoji)
            }
            ClientMessage::MarkMessageRead { message_id } => self.mark_message_read(conn, message_id),
            ClientMessage::MarkMessagesDelivered { message_ids } => {
                self.mark_messages_delivered(conn, message_ids)
            }
            ClientMessage::GetMessageReceipts { message_id } => {
                Ok(self.message_receipts(conn, message_id))
            }
        };

        match result {
            Ok(dispatches) => dispatches,
            Err(err) => {
                tracing::warn!(conn = %conn, error = %err, "event rejected");
                vec![Self::error(conn, err.kind(), err.to_string())]
            }
        }
    }

    /// Bind `conn` to an identity in the default room. A second join from the
    /// same connection replaces the first session.
    pub fn join(&mut self, conn: ConnectionId, profile: UserProfile) -> Result<Vec<Dispatch>, ChatError> {
        let now = Utc::now();
        let mut out = Vec::new();

        if let Some(previous) = self.registry.unregister(conn) {
            if let Some(room) = &previous.room_id {
                out.extend(self.depart(&previous, room, now));
            }
        }

        let room = self
            .rooms
            .default_room()
            .cloned()
            .ok_or_else(|| ChatError::RoomNotFound(String::new()))?;
        let session = self.registry.register(conn, profile, room.clone(), now)?;

        tracing::info!(conn = %conn, user = %session.username, room = %room, "user joined");

        out.push(Dispatch::to_one(conn, ServerMessage::UserAuthenticated { user: session.clone() }));
        out.push(Dispatch::to_one(conn, ServerMessage::RoomList { rooms: self.rooms.rooms() }));
        out.extend(self.arrive(&session, &room)?);
        Ok(out)
    }

    /// Move the actor to `target`, notifying both rooms.
    pub fn switch_room(&mut self, conn: ConnectionId, target: RoomId) -> Result<Vec<Dispatch>, ChatError> {
        let session = self.session(conn)?.clone();
        if !self.rooms.contains(&target) {
            return Err(ChatError::RoomNotFound(target));
        }

        let now = Utc::now();
        let mut out = Vec::new();
        let previous = self.registry.set_room(conn, target.clone());

        match previous {
            Some(old) if old == target => {
                // Re-entering the current room only refreshes the actor's view.
                out.push(Dispatch::to_one(conn, ServerMessage::MessageHistory {
                    room_id: target.clone(),
                    messages: self.rooms.history(&target)?,
                }));
                out.push(Dispatch::to_one(conn, ServerMessage::RoomJoined { room_id: target }));
                return Ok(out);
            }
            Some(old) => out.extend(self.depart(&session, &old, now)),
            None => {}
        }

        tracing::info!(conn = %conn, user = %session.username, room = %target, "user switched room");
        out.extend(self.arrive(&session, &target)?);
        Ok(out)
    }

    pub fn send_message(&mut self, conn: ConnectionId, content: String) -> Result<Vec<Dispatch>, ChatError> {
        let session = self.session(conn)?.clone();
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        self.post(&session, content, MessageKind::Text, None)
    }

    /// Post an attachment message. The descriptor comes from the upload store
    /// and is trusted as-is.
    pub fn send_file_message(
        &mut self,
        conn: ConnectionId,
        file: FileAttachment,
        caption: String,
    ) -> Result<Vec<Dispatch>, ChatError> {
        let session = self.session(conn)?.clone();
        self.post(&session, caption, MessageKind::File, Some(file))
    }

    pub fn typing_start(&mut self, conn: ConnectionId) -> Vec<Dispatch> {
        self.set_typing(conn, true)
    }

    pub fn typing_stop(&mut self, conn: ConnectionId) -> Vec<Dispatch> {
        self.set_typing(conn, false)
    }

    /// Change presence status. Ignored for connections without a session.
    pub fn update_status(&mut self, conn: ConnectionId, status: PresenceStatus) -> Vec<Dispatch> {
        match self.registry.set_status(conn, status, Utc::now()) {
            Some(room) => vec![self.presence(&room)],
            None => Vec::new(),
        }
    }

    /// Deliver a private message to an online recipient. Offline recipients
    /// are reported to the sender; nothing is queued.
    pub fn send_private_message(
        &mut self,
        conn: ConnectionId,
        recipient_id: ConnectionId,
        content: String,
    ) -> Result<Vec<Dispatch>, ChatError> {
        let sender = self.session(conn)?.clone();
        let recipient = self
            .registry
            .lookup(recipient_id)
            .ok_or(ChatError::RecipientOffline(recipient_id))?
            .username
            .clone();

        let now = Utc::now();
        let message = PrivateMessage {
            id: self.next_id("pm", now),
            sender: sender.username,
            sender_id: conn,
            sender_avatar: sender.avatar,
            recipient_id,
            recipient_name: recipient,
            content,
            timestamp: now,
            is_read: false,
        };

        self.conversations.append(&canonical_key(conn, recipient_id), message.clone());
        tracing::debug!(conn = %conn, recipient = %recipient_id, id = %message.id, "private message");

        Ok(vec![
            Dispatch::to_one(recipient_id, ServerMessage::ReceivePrivateMessage {
                message: message.clone(),
            }),
            Dispatch::to_one(conn, ServerMessage::PrivateMessageSent { message }),
        ])
    }

    pub fn private_history(
        &mut self,
        conn: ConnectionId,
        recipient_id: ConnectionId,
    ) -> Result<Vec<Dispatch>, ChatError> {
        self.session(conn)?;
        let messages = self.conversations.history(&canonical_key(conn, recipient_id));
        Ok(vec![Dispatch::to_one(conn, ServerMessage::PrivateMessageHistory {
            recipient_id,
            messages,
        })])
    }

    /// Mark everything `sender_id` sent to the actor as read and tell the
    /// sender, if they are still online.
    pub fn mark_private_read(
        &mut self,
        conn: ConnectionId,
        sender_id: ConnectionId,
    ) -> Result<Vec<Dispatch>, ChatError> {
        self.session(conn)?;
        self.conversations.mark_read(&canonical_key(conn, sender_id), conn);

        if self.registry.lookup(sender_id).is_none() {
            return Ok(Vec::new());
        }
        Ok(vec![Dispatch::to_one(sender_id, ServerMessage::PrivateMessagesMarkedRead {
            read_by: conn,
        })])
    }

    /// Toggle the actor's `emoji` reaction on a message in their current room.
    pub fn add_reaction(
        &mut self,
        conn: ConnectionId,
        message_id: MessageId,
        emoji: String,
    ) -> Result<Vec<Dispatch>, ChatError> {
        let (room, username) = self.actor_room(conn)?;
        let message = self
            .rooms
            .find_message_mut(&room, &message_id)
            .ok_or_else(|| ChatError::MessageNotFound(message_id.clone()))?;

        let reactions =
            reactions::toggle(&mut message.reactions, &emoji, conn, &username, Utc::now()).to_vec();
        Ok(vec![self.to_room(&room, ServerMessage::ReactionUpdated {
            message_id,
            room_id: room.clone(),
            reactions,
        }, None)])
    }

    /// Remove the actor's own `emoji` reaction, if present. Never adds one.
    pub fn remove_reaction(
        &mut self,
        conn: ConnectionId,
        message_id: MessageId,
        emoji: String,
    ) -> Result<Vec<Dispatch>, ChatError> {
        let (room, _) = self.actor_room(conn)?;
        let message = self
            .rooms
            .find_message_mut(&room, &message_id)
            .ok_or_else(|| ChatError::MessageNotFound(message_id.clone()))?;

        let reactions = reactions::remove_own(&mut message.reactions, &emoji, conn).to_vec();
        Ok(vec![self.to_room(&room, ServerMessage::ReactionUpdated {
            message_id,
            room_id: room.clone(),
            reactions,
        }, None)])
    }

    /// Record a read receipt. Only the first acknowledgement is broadcast.
    pub fn mark_message_read(
        &mut self,
        conn: ConnectionId,
        message_id: MessageId,
    ) -> Result<Vec<Dispatch>, ChatError> {
        let (room, username) = self.actor_room(conn)?;
        let reader = ReceiptUser { user_id: conn, username };
        let now = Utc::now();

        if !self.receipts.mark_read(&message_id, &reader, now) {
            return Ok(Vec::new());
        }
        Ok(vec![self.to_room(&room, ServerMessage::MessageReadReceipt {
            message_id,
            read_by: reader,
            read_at: now,
        }, Some(conn))])
    }

    /// Record delivery for each id and announce them in one event. Repeated
    /// ids are announced once, in first-seen order.
    pub fn mark_messages_delivered(
        &mut self,
        conn: ConnectionId,
        mut message_ids: Vec<MessageId>,
    ) -> Result<Vec<Dispatch>, ChatError> {
        let (room, username) = self.actor_room(conn)?;
        let mut seen = HashSet::new();
        message_ids.retain(|id| seen.insert(id.clone()));
        if message_ids.is_empty() {
            return Ok(Vec::new());
        }

        let recipient = ReceiptUser { user_id: conn, username };
        let now = Utc::now();
        for id in &message_ids {
            self.receipts.mark_delivered(id, &recipient, now);
        }

        Ok(vec![self.to_room(&room, ServerMessage::MessagesDelivered {
            message_ids,
            delivered_to: recipient,
            delivered_at: now,
        }, Some(conn))])
    }

    pub fn message_receipts(&self, conn: ConnectionId, message_id: MessageId) -> Vec<Dispatch> {
        let receipts = self.receipts.snapshot(&message_id);
        vec![Dispatch::to_one(conn, ServerMessage::MessageReceipts { message_id, receipts })]
    }

    /// Tear down `conn`. Safe to call more than once.
    ///
    /// Conversations and receipts are left untouched.
    pub fn disconnect(&mut self, conn: ConnectionId) -> Vec<Dispatch> {
        let Some(session) = self.registry.unregister(conn) else {
            return Vec::new();
        };
        tracing::info!(conn = %conn, user = %session.username, "user left");

        match &session.room_id {
            Some(room) => self.depart(&session, room, Utc::now()),
            None => Vec::new(),
        }
    }

    /// Actor-only error event.
    pub fn error(conn: ConnectionId, code: ErrorKind, message: impl Into<String>) -> Dispatch {
        Dispatch::to_one(conn, ServerMessage::Error { code, message: message.into() })
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn rooms(&self) -> &RoomStore {
        &self.rooms
    }

    pub fn receipts(&self) -> &ReceiptTracker {
        &self.receipts
    }

    fn session(&self, conn: ConnectionId) -> Result<&Session, ChatError> {
        self.registry.lookup(conn).ok_or(ChatError::NotAuthenticated)
    }

    fn actor_room(&self, conn: ConnectionId) -> Result<(RoomId, String), ChatError> {
        let session = self.session(conn)?;
        let room = session.room_id.clone().ok_or(ChatError::NotAuthenticated)?;
        Ok((room, session.username.clone()))
    }

    fn post(
        &mut self,
        session: &Session,
        content: String,
        kind: MessageKind,
        file: Option<FileAttachment>,
    ) -> Result<Vec<Dispatch>, ChatError> {
        let room = session.room_id.clone().ok_or(ChatError::NotAuthenticated)?;
        let now = Utc::now();
        let message = ChatMessage {
            id: self.next_id("msg", now),
            room_id: room.clone(),
            sender: session.username.clone(),
            sender_id: session.id,
            sender_avatar: session.avatar.clone(),
            content,
            kind,
            timestamp: now,
            file,
            reactions: Vec::new(),
            is_edited: false,
        };

        self.rooms.append(&room, message.clone())?;
        tracing::debug!(conn = %session.id, room = %room, id = %message.id, "room message");
        Ok(vec![self.to_room(&room, ServerMessage::ReceiveMessage { message }, None)])
    }

    fn set_typing(&mut self, conn: ConnectionId, is_typing: bool) -> Vec<Dispatch> {
        let Some(session) = self.registry.lookup(conn).cloned() else {
            return Vec::new();
        };
        let Some(room) = session.room_id.clone() else {
            return Vec::new();
        };
        if self.rooms.set_typing(&room, &session, is_typing, Utc::now()).is_err() {
            return Vec::new();
        }
        self.typing_refresh(&room, Some(conn))
    }

    /// Announce `session` in `room` and send the actor the room's history.
    /// The registry must already place the session in `room`.
    fn arrive(&self, session: &Session, room: &RoomId) -> Result<Vec<Dispatch>, ChatError> {
        Ok(vec![
            Dispatch::to_one(session.id, ServerMessage::MessageHistory {
                room_id: room.clone(),
                messages: self.rooms.history(room)?,
            }),
            Dispatch::to_one(session.id, ServerMessage::RoomJoined { room_id: room.clone() }),
            self.to_room(room, ServerMessage::UserJoined {
                id: session.id,
                username: session.username.clone(),
                room_id: room.clone(),
            }, Some(session.id)),
            self.presence(room),
        ])
    }

    /// Notify `room` that `session` is gone. The registry must no longer list
    /// the session in `room`.
    fn depart(&mut self, session: &Session, room: &str, now: DateTime<Utc>) -> Vec<Dispatch> {
        let mut out = Vec::new();
        if self.rooms.clear_typing(room, session.id) {
            out.extend(self.typing_refresh(room, None));
        }
        out.push(self.to_room(room, ServerMessage::UserLeft {
            id: session.id,
            username: session.username.clone(),
            room_id: room.to_string(),
            left_at: now,
        }, None));
        out.push(self.presence(room));
        out
    }

    /// Typing state for everyone in `room` except `actor`. Each recipient's
    /// list leaves the recipient out.
    fn typing_refresh(&self, room: &str, actor: Option<ConnectionId>) -> Vec<Dispatch> {
        let mut members: Vec<ConnectionId> =
            self.registry.connections_in_room(room).filter(|id| Some(*id) != actor).collect();
        members.sort();
        members
            .into_iter()
            .map(|member| {
                Dispatch::to_one(member, ServerMessage::TypingUsers {
                    room_id: room.to_string(),
                    users: self.rooms.typing_snapshot(room, Some(member)),
                })
            })
            .collect()
    }

    fn presence(&self, room: &str) -> Dispatch {
        self.to_room(room, ServerMessage::UserList {
            room_id: room.to_string(),
            users: self.registry.sessions_in_room(room),
        }, None)
    }

    fn to_room(&self, room: &str, message: ServerMessage, exclude: Option<ConnectionId>) -> Dispatch {
        let recipients =
            self.registry.connections_in_room(room).filter(|id| Some(*id) != exclude).collect();
        Dispatch { recipients, message }
    }

    fn next_id(&mut self, prefix: &str, now: DateTime<Utc>) -> MessageId {
        self.message_seq += 1;
        format!("{prefix}_{}_{}", now.timestamp_millis(), self.message_seq)
    }
}
