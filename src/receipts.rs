// src/receipts.rs

//! Delivery and read acknowledgements, per message and per identity.
//!
//! Kept apart from room and conversation storage: receipts outlive history
//! eviction and the acknowledging connection.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use crate::models::{ConnectionId, MessageId, MessageReceipts, Receipt, ReceiptUser};

#[derive(Debug, Default)]
struct ReceiptSets {
    delivered: BTreeMap<ConnectionId, Receipt>,
    read: BTreeMap<ConnectionId, Receipt>,
}

#[derive(Debug, Default)]
pub struct ReceiptTracker {
    messages: HashMap<MessageId, ReceiptSets>,
}

impl ReceiptTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record delivery to `user`. Returns `false` if already recorded.
    pub fn mark_delivered(&mut self, message_id: &str, user: &ReceiptUser, now: DateTime<Utc>) -> bool {
        let sets = self.messages.entry(message_id.to_string()).or_default();
        insert_once(&mut sets.delivered, user, now)
    }

    /// Record that `user` read the message. Returns `false` if already recorded.
    pub fn mark_read(&mut self, message_id: &str, user: &ReceiptUser, now: DateTime<Utc>) -> bool {
        let sets = self.messages.entry(message_id.to_string()).or_default();
        insert_once(&mut sets.read, user, now)
    }

    /// Both receipt sets for a message, earliest acknowledgement first.
    pub fn snapshot(&self, message_id: &str) -> MessageReceipts {
        let Some(sets) = self.messages.get(message_id) else {
            return MessageReceipts::default();
        };
        MessageReceipts {
            delivery_receipts: ordered(&sets.delivered),
            read_receipts: ordered(&sets.read),
        }
    }
}

fn insert_once(set: &mut BTreeMap<ConnectionId, Receipt>, user: &ReceiptUser, now: DateTime<Utc>) -> bool {
    if set.contains_key(&user.user_id) {
        return false;
    }
    set.insert(
        user.user_id,
        Receipt { user_id: user.user_id, username: user.username.clone(), timestamp: now },
    );
    true
}

fn ordered(set: &BTreeMap<ConnectionId, Receipt>) -> Vec<Receipt> {
    let mut receipts: Vec<Receipt> = set.values().cloned().collect();
    receipts.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.user_id.cmp(&b.user_id)));
    receipts
}
