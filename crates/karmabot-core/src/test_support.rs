// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared fixtures for unit tests.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use karmabot_protocol::{ApiError, BotApi, Chat, Message, SendMessageRequest, Update, User};

use crate::persistence::SqlitePersistence;

/// In-memory [`BotApi`] that records sent messages and replays scripted
/// `getUpdates` results.
#[derive(Default)]
pub(crate) struct RecordingApi {
    sent: Mutex<Vec<SendMessageRequest>>,
    batches: Mutex<VecDeque<Result<Vec<Update>, ApiError>>>,
    offsets: Mutex<Vec<i64>>,
    failing_chats: Mutex<HashSet<i64>>,
}

impl RecordingApi {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_updates(&self, updates: Vec<Update>) {
        self.batches.lock().unwrap().push_back(Ok(updates));
    }

    pub(crate) fn push_error(&self, error: ApiError) {
        self.batches.lock().unwrap().push_back(Err(error));
    }

    /// Make every `sendMessage` to `chat_id` fail with HTTP 500.
    pub(crate) fn fail_sends_to(&self, chat_id: i64) {
        self.failing_chats.lock().unwrap().insert(chat_id);
    }

    pub(crate) fn sent(&self) -> Vec<SendMessageRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn texts(&self) -> Vec<String> {
        self.sent().into_iter().map(|r| r.text).collect()
    }

    pub(crate) fn requested_offsets(&self) -> Vec<i64> {
        self.offsets.lock().unwrap().clone()
    }
}

#[async_trait]
impl BotApi for RecordingApi {
    async fn get_updates(&self, offset: i64, _timeout_secs: u64) -> Result<Vec<Update>, ApiError> {
        self.offsets.lock().unwrap().push(offset);
        self.batches
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn send_message(&self, request: &SendMessageRequest) -> Result<(), ApiError> {
        if self.failing_chats.lock().unwrap().contains(&request.chat_id) {
            return Err(ApiError::Status { status: 500 });
        }
        self.sent.lock().unwrap().push(request.clone());
        Ok(())
    }
}

pub(crate) const GROUP_ID: i64 = -1001;

pub(crate) fn user(id: i64, first_name: &str) -> User {
    User {
        id,
        first_name: first_name.to_string(),
        ..Default::default()
    }
}

pub(crate) fn group_message(message_id: i64, from: &User, text: &str) -> Message {
    Message {
        message_id,
        from: Some(from.clone()),
        chat: Chat {
            id: GROUP_ID,
            kind: "supergroup".to_string(),
            title: Some("Friends".to_string()),
        },
        date: 0,
        text: Some(text.to_string()),
        reply_to_message: None,
    }
}

pub(crate) fn private_message(message_id: i64, from: &User, text: &str) -> Message {
    Message {
        message_id,
        from: Some(from.clone()),
        chat: Chat {
            id: from.id,
            kind: "private".to_string(),
            title: None,
        },
        date: 0,
        text: Some(text.to_string()),
        reply_to_message: None,
    }
}

/// `message` sent as a reply to `original`.
pub(crate) fn reply(mut message: Message, original: Message) -> Message {
    message.reply_to_message = Some(Box::new(original));
    message
}

pub(crate) fn update(update_id: i64, message: Message) -> Update {
    Update {
        update_id,
        message: Some(message),
        edited_message: None,
        channel_post: None,
    }
}

pub(crate) async fn memory_store() -> SqlitePersistence {
    SqlitePersistence::connect("sqlite::memory:", 1)
        .await
        .expect("in-memory store")
}
