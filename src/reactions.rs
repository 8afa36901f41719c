// src/reactions.rs

//! Emoji reactions on room messages.
//!
//! Reactions live on the [`ChatMessage`](crate::models::ChatMessage) record
//! itself, so these functions take the message's reaction list directly. The
//! list holds at most one entry per (emoji, user).

use chrono::{DateTime, Utc};

use crate::models::{ConnectionId, Reaction};

/// Add the reaction, or remove it if this user already reacted with `emoji`.
///
/// Returns the full updated list for broadcasting. Two identical calls
/// cancel out.
pub fn toggle<'a>(
    reactions: &'a mut Vec<Reaction>,
    emoji: &str,
    user_id: ConnectionId,
    username: &str,
    now: DateTime<Utc>,
) -> &'a [Reaction] {
    let existing = reactions.iter().position(|r| r.emoji == emoji && r.user_id == user_id);
    match existing {
        Some(index) => {
            reactions.remove(index);
        }
        None => reactions.push(Reaction {
            emoji: emoji.to_string(),
            user_id,
            username: username.to_string(),
            timestamp: now,
        }),
    }
    reactions
}

/// Remove only this user's `emoji` reaction, if any. Never adds.
pub fn remove_own<'a>(
    reactions: &'a mut Vec<Reaction>,
    emoji: &str,
    user_id: ConnectionId,
) -> &'a [Reaction] {
    reactions.retain(|r| !(r.emoji == emoji && r.user_id == user_id));
    reactions
}
