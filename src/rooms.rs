// src/rooms.rs

//! Static rooms with bounded history and per-room typing sets.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};

use crate::{
    error::ChatError,
    models::{ChatMessage, ConnectionId, RoomId, RoomInfo, Session, TypingUser},
};

/// Most recent messages kept per room. Older ones are dropped silently.
pub const ROOM_HISTORY_CAPACITY: usize = 100;

/// The rooms every server starts with. The first is where new sessions land.
pub fn default_rooms() -> Vec<RoomInfo> {
    vec![
        RoomInfo {
            id: "general".to_string(),
            name: "General".to_string(),
            description: "General chat room".to_string(),
        },
        RoomInfo {
            id: "random".to_string(),
            name: "Random".to_string(),
            description: "Random discussions".to_string(),
        },
    ]
}

/// One room: its definition, a cached history, and who is typing.
#[derive(Debug)]
struct Room {
    info: RoomInfo,
    history: VecDeque<ChatMessage>,
    typing: HashMap<ConnectionId, TypingUser>,
}

#[derive(Debug)]
pub struct RoomStore {
    rooms: HashMap<RoomId, Room>,
    /// Definition order, for listing
    order: Vec<RoomId>,
    capacity: usize,
}

impl Default for RoomStore {
    fn default() -> Self {
        Self::new(default_rooms(), ROOM_HISTORY_CAPACITY)
    }
}

impl RoomStore {
    /// Build a store for a fixed set of rooms. `definitions` must not be empty.
    pub fn new(definitions: Vec<RoomInfo>, capacity: usize) -> Self {
        let mut rooms = HashMap::with_capacity(definitions.len());
        let mut order = Vec::with_capacity(definitions.len());
        for info in definitions {
            order.push(info.id.clone());
            rooms.insert(
                info.id.clone(),
                Room {
                    info,
                    history: VecDeque::with_capacity(capacity),
                    typing: HashMap::new(),
                },
            );
        }
        Self { rooms, order, capacity }
    }

    pub fn rooms(&self) -> Vec<RoomInfo> {
        self.order.iter().filter_map(|id| self.rooms.get(id)).map(|r| r.info.clone()).collect()
    }

    pub fn default_room(&self) -> Option<&RoomId> {
        self.order.first()
    }

    pub fn contains(&self, room: &str) -> bool {
        self.rooms.contains_key(room)
    }

    /// Snapshot of a room's history, oldest first.
    pub fn history(&self, room: &str) -> Result<Vec<ChatMessage>, ChatError> {
        let room = self.room(room)?;
        Ok(room.history.iter().cloned().collect())
    }

    /// Add a message at the tail, evicting from the head past capacity.
    pub fn append(&mut self, room: &str, message: ChatMessage) -> Result<(), ChatError> {
        let capacity = self.capacity;
        let room = self.room_mut(room)?;
        room.history.push_back(message);
        while room.history.len() > capacity {
            room.history.pop_front();
        }
        Ok(())
    }

    pub fn find_message(&self, room: &str, message_id: &str) -> Option<&ChatMessage> {
        self.rooms.get(room)?.history.iter().find(|m| m.id == message_id)
    }

    pub fn find_message_mut(&mut self, room: &str, message_id: &str) -> Option<&mut ChatMessage> {
        self.rooms.get_mut(room)?.history.iter_mut().find(|m| m.id == message_id)
    }

    /// Add or remove `session` from the room's typing set.
    ///
    /// Returns `true` if membership changed. A repeated start keeps the
    /// original start time.
    pub fn set_typing(
        &mut self,
        room: &str,
        session: &Session,
        is_typing: bool,
        now: DateTime<Utc>,
    ) -> Result<bool, ChatError> {
        let room = self.room_mut(room)?;
        if !is_typing {
            return Ok(room.typing.remove(&session.id).is_some());
        }
        if room.typing.contains_key(&session.id) {
            return Ok(false);
        }
        room.typing.insert(
            session.id,
            TypingUser { id: session.id, username: session.username.clone(), started_typing: now },
        );
        Ok(true)
    }

    /// Drop a connection from a room's typing set. Returns `true` if it was there.
    pub fn clear_typing(&mut self, room: &str, id: ConnectionId) -> bool {
        self.rooms.get_mut(room).is_some_and(|r| r.typing.remove(&id).is_some())
    }

    /// Who is typing in `room`, earliest first, leaving out `excluding`.
    pub fn typing_snapshot(&self, room: &str, excluding: Option<ConnectionId>) -> Vec<TypingUser> {
        let Some(room) = self.rooms.get(room) else {
            return Vec::new();
        };
        let mut users: Vec<TypingUser> =
            room.typing.values().filter(|t| Some(t.id) != excluding).cloned().collect();
        users.sort_by(|a, b| a.started_typing.cmp(&b.started_typing).then(a.id.cmp(&b.id)));
        users
    }

    pub fn is_typing(&self, room: &str, id: ConnectionId) -> bool {
        self.rooms.get(room).is_some_and(|r| r.typing.contains_key(&id))
    }

    fn room(&self, room: &str) -> Result<&Room, ChatError> {
        self.rooms.get(room).ok_or_else(|| ChatError::RoomNotFound(room.to_string()))
    }

    fn room_mut(&mut self, room: &str) -> Result<&mut Room, ChatError> {
        self.rooms.get_mut(room).ok_or_else(|| ChatError::RoomNotFound(room.to_string()))
    }
}
