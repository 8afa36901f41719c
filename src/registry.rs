// src/registry.rs

//! Connection registry: who is present and where.
//!
//! Maps each connection handle to its [`Session`] and keeps a room → members
//! index in step with every join, room switch and disconnect, so broadcasts
//! never scan the full session table. The registry is a plain state container
//! and never emits events; callers run teardown with the session returned from
//! [`ConnectionRegistry::unregister`].

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::{
    error::ChatError,
    models::{ConnectionId, PresenceStatus, RoomId, Session, UserProfile},
};

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    /// Connection handle → session
    sessions: HashMap<ConnectionId, Session>,
    /// Room id → handles whose current room it is
    room_members: HashMap<RoomId, HashSet<ConnectionId>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session for `id` placed in `room`.
    ///
    /// Fails if the handle already has a session. Re-joins go through
    /// [`Self::unregister`] first.
    pub fn register(
        &mut self,
        id: ConnectionId,
        profile: UserProfile,
        room: RoomId,
        now: DateTime<Utc>,
    ) -> Result<Session, ChatError> {
        if self.sessions.contains_key(&id) {
            return Err(ChatError::AlreadyRegistered(id));
        }

        let session = Session {
            id,
            username: profile.username,
            email: profile.email,
            avatar: profile.avatar,
            status: PresenceStatus::Online,
            joined_at: now,
            last_seen: None,
            room_id: Some(room.clone()),
        };

        self.room_members.entry(room).or_default().insert(id);
        self.sessions.insert(id, session.clone());
        Ok(session)
    }

    pub fn lookup(&self, id: ConnectionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    /// Move a session to `room`, returning the room it left.
    ///
    /// No-op for unregistered handles.
    pub fn set_room(&mut self, id: ConnectionId, room: RoomId) -> Option<RoomId> {
        let session = self.sessions.get_mut(&id)?;
        let previous = session.room_id.replace(room.clone());

        if let Some(old) = &previous {
            remove_member(&mut self.room_members, old, id);
        }
        self.room_members.entry(room).or_default().insert(id);
        previous
    }

    /// Update presence status. Returns the session's room so the caller can
    /// refresh that room's presence list.
    pub fn set_status(
        &mut self,
        id: ConnectionId,
        status: PresenceStatus,
        now: DateTime<Utc>,
    ) -> Option<RoomId> {
        let session = self.sessions.get_mut(&id)?;
        session.status = status;
        session.last_seen = Some(now);
        session.room_id.clone()
    }

    /// Remove and return the session so teardown can use its last-known data.
    pub fn unregister(&mut self, id: ConnectionId) -> Option<Session> {
        let session = self.sessions.remove(&id)?;
        if let Some(room) = &session.room_id {
            remove_member(&mut self.room_members, room, id);
        }
        Some(session)
    }

    /// Sessions currently in `room`, oldest join first.
    pub fn sessions_in_room(&self, room: &str) -> Vec<Session> {
        let mut sessions: Vec<Session> = self
            .connections_in_room(room)
            .filter_map(|id| self.sessions.get(&id).cloned())
            .collect();
        sessions.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then(a.id.cmp(&b.id)));
        sessions
    }

    /// Handles whose current room is `room`.
    pub fn connections_in_room(&self, room: &str) -> impl Iterator<Item = ConnectionId> + '_ {
        self.room_members.get(room).into_iter().flat_map(|members| members.iter().copied())
    }

    /// Every live session, oldest join first.
    pub fn all_sessions(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self.sessions.values().cloned().collect();
        sessions.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then(a.id.cmp(&b.id)));
        sessions
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn room_session_count(&self, room: &str) -> usize {
        self.room_members.get(room).map_or(0, HashSet::len)
    }
}

fn remove_member(index: &mut HashMap<RoomId, HashSet<ConnectionId>>, room: &str, id: ConnectionId) {
    if let Some(members) = index.get_mut(room) {
        members.remove(&id);
        if members.is_empty() {
            index.remove(room);
        }
    }
}
