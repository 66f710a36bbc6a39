// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Karmabot Protocol - Telegram Bot API wire layer
//!
//! This crate provides everything karmabot needs to talk to the remote chat
//! platform:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    karmabot-protocol                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  BotApi trait: get_updates (long-poll) + send_message       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  RetryPolicy: bounded attempts, linear backoff, Sleeper     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Serialization: JSON (serde) over HTTPS (reqwest)           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use karmabot_protocol::{BotApi, TelegramClient, TelegramClientConfig};
//!
//! let client = TelegramClient::new(TelegramClientConfig::new("123:abc"))?;
//! let updates = client.get_updates(0, 25).await?;
//! for update in updates {
//!     println!("{}", update.update_id);
//! }
//! ```

pub mod client;
pub mod retry;
pub mod types;

pub use client::{ApiError, BotApi, TelegramClient, TelegramClientConfig};
pub use retry::{RetryPolicy, Sleeper, TokioSleeper};
pub use types::{
    Chat, InlineKeyboardButton, InlineKeyboardMarkup, Message, SendMessageRequest, Update,
    UpdatesResponse, User,
};
