// src/conversations.rs

//! Private message threads between two connections.

use std::collections::{HashMap, VecDeque};

use crate::models::{ConnectionId, PrivateMessage};

pub const CONVERSATION_HISTORY_CAPACITY: usize = 50;

/// Order-independent key for the thread between two handles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConversationKey(String);

impl ConversationKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Sort the two handles and join them, so both participants resolve to the
/// same conversation.
pub fn canonical_key(a: ConnectionId, b: ConnectionId) -> ConversationKey {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    ConversationKey(format!("{low}_{high}"))
}

#[derive(Debug)]
pub struct ConversationStore {
    conversations: HashMap<ConversationKey, VecDeque<PrivateMessage>>,
    capacity: usize,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::with_capacity(CONVERSATION_HISTORY_CAPACITY)
    }
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { conversations: HashMap::new(), capacity }
    }

    pub fn append(&mut self, key: &ConversationKey, message: PrivateMessage) {
        let capacity = self.capacity;
        let thread = self.open(key);
        thread.push_back(message);
        while thread.len() > capacity {
            thread.pop_front();
        }
    }

    /// Messages in the thread, oldest first. Opens the thread if it is new.
    pub fn history(&mut self, key: &ConversationKey) -> Vec<PrivateMessage> {
        self.open(key).iter().cloned().collect()
    }

    /// Flag every message addressed to `reader` as read. Returns how many
    /// changed; a second call returns zero.
    pub fn mark_read(&mut self, key: &ConversationKey, reader: ConnectionId) -> usize {
        let Some(thread) = self.conversations.get_mut(key) else {
            return 0;
        };
        let mut changed = 0;
        for message in thread.iter_mut().filter(|m| m.recipient_id == reader && !m.is_read) {
            message.is_read = true;
            changed += 1;
        }
        changed
    }

    #[cfg(test)]
    fn contains(&self, key: &ConversationKey) -> bool {
        self.conversations.contains_key(key)
    }

    #[cfg(test)]
    fn conversation_count(&self) -> usize {
        self.conversations.len()
    }

    fn open(&mut self, key: &ConversationKey) -> &mut VecDeque<PrivateMessage> {
        self.conversations.entry(key.clone()).or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn private(n: usize, from: ConnectionId, to: ConnectionId) -> PrivateMessage {
        PrivateMessage {
            id: format!("pm_{n}"),
            sender: "sender".into(),
            sender_id: from,
            sender_avatar: None,
            recipient_id: to,
            recipient_name: "recipient".into(),
            content: format!("note {n}"),
            timestamp: Utc::now(),
            is_read: false,
        }
    }

    #[test]
    fn canonical_key_ignores_argument_order() {
        let a = Uuid::from_u128(7);
        let b = Uuid::from_u128(3);
        assert_eq!(canonical_key(a, b), canonical_key(b, a));
        assert!(canonical_key(a, b).as_str().starts_with(&b.to_string()));
    }

    #[test]
    fn history_opens_thread_lazily() {
        let mut store = ConversationStore::new();
        let key = canonical_key(Uuid::from_u128(1), Uuid::from_u128(2));

        assert!(!store.contains(&key));
        assert!(store.history(&key).is_empty());
        assert!(store.contains(&key));
    }

    #[test]
    fn append_keeps_last_fifty() {
        let mut store = ConversationStore::new();
        let (a, b) = (Uuid::from_u128(1), Uuid::from_u128(2));
        let key = canonical_key(a, b);

        for n in 0..60 {
            store.append(&key, private(n, a, b));
        }

        let history = store.history(&key);
        assert_eq!(history.len(), CONVERSATION_HISTORY_CAPACITY);
        assert_eq!(history[0].id, "pm_10");
        assert_eq!(history[49].id, "pm_59");
    }

    #[test]
    fn mark_read_only_touches_messages_to_reader() {
        let mut store = ConversationStore::new();
        let (a, b) = (Uuid::from_u128(1), Uuid::from_u128(2));
        let key = canonical_key(a, b);
        store.append(&key, private(1, a, b));
        store.append(&key, private(2, b, a));
        store.append(&key, private(3, a, b));

        assert_eq!(store.mark_read(&key, b), 2);
        assert_eq!(store.mark_read(&key, b), 0);

        let history = store.history(&key);
        assert!(history[0].is_read);
        assert!(!history[1].is_read);
        assert!(history[2].is_read);
    }

    #[test]
    fn mark_read_on_missing_thread_does_not_create_it() {
        let mut store = ConversationStore::new();
        let key = canonical_key(Uuid::from_u128(1), Uuid::from_u128(2));

        assert_eq!(store.mark_read(&key, Uuid::from_u128(1)), 0);
        assert_eq!(store.conversation_count(), 0);
    }
}
