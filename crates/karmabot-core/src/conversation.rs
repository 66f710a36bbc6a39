// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory conversation state for multi-step guided flows.
//!
//! At most one conversation per user. Entries expire a fixed time after
//! their last transition; expired entries read as absent and are removed by
//! [`ConversationStore::purge_expired`].

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};

use crate::clock::Clock;

/// Default lifetime of a conversation step.
pub const DEFAULT_TTL_MINUTES: i64 = 10;

/// Step of the birthday registration flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationStep {
    /// Waiting for a `DD/MM` date.
    AwaitingDate,
    /// Waiting for a yes/no confirmation of the stored date.
    AwaitingConfirm,
}

/// A user's active conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    /// User the conversation belongs to.
    pub user_id: i64,
    /// Group the flow was started from.
    pub group_id: i64,
    /// Current step.
    pub step: ConversationStep,
    /// Scratch values collected so far.
    pub data: HashMap<String, String>,
    /// Instant after which the conversation reads as absent.
    pub expires_at: DateTime<Utc>,
}

impl Conversation {
    /// Scratch value by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }
}

/// Conversations keyed by user id behind a single reader/writer lock.
pub struct ConversationStore {
    conversations: RwLock<HashMap<i64, Conversation>>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl ConversationStore {
    /// Store with the default ten minute TTL.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_ttl(clock, Duration::minutes(DEFAULT_TTL_MINUTES))
    }

    /// Store with a custom TTL.
    pub fn with_ttl(clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            conversations: RwLock::new(HashMap::new()),
            clock,
            ttl,
        }
    }

    /// Start (or restart) a conversation, discarding any previous one.
    pub fn start(&self, user_id: i64, group_id: i64, step: ConversationStep) {
        let conversation = Conversation {
            user_id,
            group_id,
            step,
            data: HashMap::new(),
            expires_at: self.clock.now() + self.ttl,
        };
        self.write().insert(user_id, conversation);
    }

    /// Active conversation for `user_id`, if any.
    pub fn get(&self, user_id: i64) -> Option<Conversation> {
        let now = self.clock.now();
        self.read()
            .get(&user_id)
            .filter(|c| now <= c.expires_at)
            .cloned()
    }

    /// Whether `user_id` has an active conversation.
    pub fn is_active(&self, user_id: i64) -> bool {
        self.get(user_id).is_some()
    }

    /// Move to `step` and refresh the TTL. Returns false when there is no
    /// active conversation.
    pub fn set_step(&self, user_id: i64, step: ConversationStep) -> bool {
        self.update(user_id, |c| c.step = step)
    }

    /// Store `data` and move to `step` in one write, refreshing the TTL.
    /// Returns false, leaving nothing behind, when there is no active
    /// conversation.
    pub fn transition(
        &self,
        user_id: i64,
        step: ConversationStep,
        data: impl IntoIterator<Item = (&'static str, String)>,
    ) -> bool {
        self.update(user_id, |c| {
            c.data
                .extend(data.into_iter().map(|(k, v)| (k.to_string(), v)));
            c.step = step;
        })
    }

    /// Store a scratch value and refresh the TTL.
    pub fn set_data(&self, user_id: i64, key: &str, value: impl Into<String>) -> bool {
        let value = value.into();
        self.update(user_id, |c| {
            c.data.insert(key.to_string(), value);
        })
    }

    /// Refresh the TTL without changing anything else.
    pub fn touch(&self, user_id: i64) -> bool {
        self.update(user_id, |_| {})
    }

    /// End the conversation.
    pub fn end(&self, user_id: i64) {
        self.write().remove(&user_id);
    }

    /// Remove expired conversations. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut conversations = self.write();
        let before = conversations.len();
        conversations.retain(|_, c| now <= c.expires_at);
        before - conversations.len()
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn update(&self, user_id: i64, apply: impl FnOnce(&mut Conversation)) -> bool {
        let now = self.clock.now();
        let mut conversations = self.write();
        match conversations.get_mut(&user_id) {
            Some(c) if now <= c.expires_at => {
                apply(c);
                c.expires_at = now + self.ttl;
                true
            }
            _ => false,
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<i64, Conversation>> {
        self.conversations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<i64, Conversation>> {
        self.conversations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn store() -> (Arc<ManualClock>, ConversationStore) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap(),
        ));
        let store = ConversationStore::new(clock.clone());
        (clock, store)
    }

    #[test]
    fn test_start_and_get() {
        let (clock, store) = store();

        store.start(7, -100, ConversationStep::AwaitingDate);

        let conversation = store.get(7).unwrap();
        assert_eq!(conversation.group_id, -100);
        assert_eq!(conversation.step, ConversationStep::AwaitingDate);
        assert_eq!(conversation.expires_at, clock.now() + Duration::minutes(10));
        assert!(store.get(8).is_none());
    }

    #[test]
    fn test_expired_conversation_reads_as_absent() {
        let (clock, store) = store();
        store.start(7, -100, ConversationStep::AwaitingDate);

        clock.advance(Duration::minutes(11));

        assert!(store.get(7).is_none());
        assert!(!store.set_step(7, ConversationStep::AwaitingConfirm));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_transitions_refresh_ttl() {
        let (clock, store) = store();
        store.start(7, -100, ConversationStep::AwaitingDate);

        clock.advance(Duration::minutes(9));
        assert!(store.set_data(7, "day", "25"));
        clock.advance(Duration::minutes(9));
        assert!(store.set_step(7, ConversationStep::AwaitingConfirm));
        clock.advance(Duration::minutes(9));

        let conversation = store.get(7).unwrap();
        assert_eq!(conversation.step, ConversationStep::AwaitingConfirm);
        assert_eq!(conversation.get("day"), Some("25"));
    }

    #[test]
    fn test_transition_writes_step_and_data_together() {
        let (clock, store) = store();
        store.start(7, -100, ConversationStep::AwaitingDate);

        assert!(store.transition(
            7,
            ConversationStep::AwaitingConfirm,
            [("day", "25".to_string()), ("month", "12".to_string())],
        ));
        let conversation = store.get(7).unwrap();
        assert_eq!(conversation.step, ConversationStep::AwaitingConfirm);
        assert_eq!(conversation.get("month"), Some("12"));

        clock.advance(Duration::minutes(11));
        assert!(!store.transition(
            7,
            ConversationStep::AwaitingDate,
            [("day", "1".to_string())],
        ));
        clock.set(Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap());
        let conversation = store.get(7).unwrap();
        assert_eq!(conversation.step, ConversationStep::AwaitingConfirm);
        assert_eq!(conversation.get("day"), Some("25"));
    }

    #[test]
    fn test_restart_discards_previous_data() {
        let (_, store) = store();
        store.start(7, -100, ConversationStep::AwaitingDate);
        store.set_data(7, "day", "1");

        store.start(7, -200, ConversationStep::AwaitingDate);

        let conversation = store.get(7).unwrap();
        assert_eq!(conversation.group_id, -200);
        assert!(conversation.data.is_empty());
    }

    #[test]
    fn test_end_and_purge() {
        let (clock, store) = store();
        store.start(1, -100, ConversationStep::AwaitingDate);
        store.start(2, -100, ConversationStep::AwaitingDate);
        store.start(3, -100, ConversationStep::AwaitingDate);

        store.end(1);
        clock.advance(Duration::minutes(5));
        store.touch(2);
        clock.advance(Duration::minutes(6));

        assert_eq!(store.purge_expired(), 1);
        assert!(store.is_active(2));
        assert!(!store.is_active(3));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_concurrent_access() {
        let (_, store) = store();
        let store = Arc::new(store);

        let handles: Vec<_> = (0..8)
            .map(|user_id| {
                let store = store.clone();
                std::thread::spawn(move || {
                    store.start(user_id, -100, ConversationStep::AwaitingDate);
                    store.set_data(user_id, "day", user_id.to_string());
                    store.get(user_id)
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap().is_some());
        }
        assert_eq!(store.len(), 8);
    }
}
