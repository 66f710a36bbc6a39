// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Telegram Bot API wire types.
//!
//! Only the fields karmabot reads are modelled; unknown fields are ignored
//! during deserialization so newer API versions keep parsing.

use serde::{Deserialize, Serialize};

/// Envelope returned by every Bot API method.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdatesResponse<T> {
    /// Whether the request succeeded.
    pub ok: bool,
    /// Method result (absent when `ok` is false).
    pub result: Option<T>,
    /// Human-readable error description when `ok` is false.
    #[serde(default)]
    pub description: Option<String>,
    /// Bot API error code when `ok` is false.
    #[serde(default)]
    pub error_code: Option<i32>,
}

/// One inbound event from `getUpdates`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Update {
    /// Monotonically increasing update identifier.
    pub update_id: i64,
    /// New incoming message of any kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    /// Edited version of a known message. Received but not processed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_message: Option<Message>,
    /// New channel post. Received but not processed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_post: Option<Message>,
}

/// A chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Unique message identifier inside the chat.
    pub message_id: i64,
    /// Sender; empty for messages sent to channels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<User>,
    /// Chat the message belongs to.
    pub chat: Chat,
    /// Date the message was sent (unix time).
    #[serde(default)]
    pub date: i64,
    /// UTF-8 text for text messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Original message when this message is a reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_message: Option<Box<Message>>,
}

impl Message {
    /// Message text, or an empty string for non-text messages.
    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }
}

/// A Telegram user or bot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct User {
    /// Unique identifier.
    pub id: i64,
    /// True if this user is a bot.
    #[serde(default)]
    pub is_bot: bool,
    /// First name.
    #[serde(default)]
    pub first_name: String,
    /// Last name.
    #[serde(default)]
    pub last_name: Option<String>,
    /// Username without the leading `@`.
    #[serde(default)]
    pub username: Option<String>,
}

/// A chat (private, group, supergroup or channel).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chat {
    /// Unique identifier; negative for groups.
    pub id: i64,
    /// One of `private`, `group`, `supergroup`, `channel`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Title for groups and channels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Chat {
    /// Whether this is a 1:1 chat between a user and the bot.
    pub fn is_private(&self) -> bool {
        self.kind == "private"
    }

    /// Whether this is a group or supergroup.
    pub fn is_group(&self) -> bool {
        self.kind == "group" || self.kind == "supergroup"
    }
}

/// Body of a `sendMessage` call.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SendMessageRequest {
    /// Target chat.
    pub chat_id: i64,
    /// Message text.
    pub text: String,
    /// Message to thread the reply under.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_message_id: Option<i64>,
    /// `Markdown`, `MarkdownV2` or `HTML`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_mode: Option<String>,
    /// Inline keyboard attached to the message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_markup: Option<InlineKeyboardMarkup>,
}

impl SendMessageRequest {
    /// Plain text message.
    pub fn text(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            reply_to_message_id: None,
            parse_mode: None,
            reply_markup: None,
        }
    }

    /// Thread this message as a reply.
    pub fn reply_to(mut self, message_id: i64) -> Self {
        self.reply_to_message_id = Some(message_id);
        self
    }

    /// Render the text as legacy Markdown.
    pub fn markdown(mut self) -> Self {
        self.parse_mode = Some("Markdown".to_string());
        self
    }

    /// Attach an inline keyboard.
    pub fn keyboard(mut self, markup: InlineKeyboardMarkup) -> Self {
        self.reply_markup = Some(markup);
        self
    }
}

/// Inline keyboard shown under a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InlineKeyboardMarkup {
    /// Rows of buttons.
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

impl InlineKeyboardMarkup {
    /// Keyboard with a single URL button.
    pub fn single_url(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            inline_keyboard: vec![vec![InlineKeyboardButton {
                text: text.into(),
                url: Some(url.into()),
                callback_data: None,
            }]],
        }
    }
}

/// One inline keyboard button.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InlineKeyboardButton {
    /// Label.
    pub text: String,
    /// URL opened when pressed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Data sent back in a callback query.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_data: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_reply_update() {
        let raw = r#"{
            "update_id": 42,
            "message": {
                "message_id": 7,
                "from": {"id": 10, "is_bot": false, "first_name": "Ana", "username": "ana"},
                "chat": {"id": -100, "type": "supergroup", "title": "Friends"},
                "date": 1700000000,
                "text": "+1 nice",
                "reply_to_message": {
                    "message_id": 6,
                    "from": {"id": 11, "is_bot": false, "first_name": "Beto"},
                    "chat": {"id": -100, "type": "supergroup"},
                    "date": 1699999990,
                    "text": "hello"
                }
            }
        }"#;

        let update: Update = serde_json::from_str(raw).unwrap();
        assert_eq!(update.update_id, 42);

        let message = update.message.unwrap();
        assert_eq!(message.text(), "+1 nice");
        assert!(message.chat.is_group());
        assert!(!message.chat.is_private());

        let replied = message.reply_to_message.unwrap();
        assert_eq!(replied.from.unwrap().id, 11);
    }

    #[test]
    fn test_deserialize_ignores_unknown_update_kinds() {
        let raw = r#"{"update_id": 1, "callback_query": {"id": "abc"}}"#;
        let update: Update = serde_json::from_str(raw).unwrap();
        assert!(update.message.is_none());
    }

    #[test]
    fn test_deserialize_error_envelope() {
        let raw = r#"{"ok": false, "error_code": 409, "description": "Conflict: terminated by other getUpdates request"}"#;
        let envelope: UpdatesResponse<Vec<Update>> = serde_json::from_str(raw).unwrap();
        assert!(!envelope.ok);
        assert!(envelope.result.is_none());
        assert_eq!(envelope.error_code, Some(409));
    }

    #[test]
    fn test_send_message_request_skips_empty_fields() {
        let request = SendMessageRequest::text(5, "hi");
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json, serde_json::json!({"chat_id": 5, "text": "hi"}));
    }

    #[test]
    fn test_send_message_request_with_keyboard() {
        let request = SendMessageRequest::text(5, "*hi*")
            .markdown()
            .reply_to(9)
            .keyboard(InlineKeyboardMarkup::single_url("Go", "https://t.me/bot"));
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["parse_mode"], "Markdown");
        assert_eq!(json["reply_to_message_id"], 9);
        assert_eq!(
            json["reply_markup"]["inline_keyboard"][0][0]["url"],
            "https://t.me/bot"
        );
    }
}
