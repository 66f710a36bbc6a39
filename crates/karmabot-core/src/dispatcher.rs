// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Routes each inbound update to exactly one handler.
//!
//! Classification order:
//!
//! 1. a slash command (optionally suffixed with this bot's `@name`),
//! 2. a private message from a user with an active conversation,
//! 3. a reply whose first token is `+1` or `-1`,
//! 4. anything else is dropped.
//!
//! Handler errors never stop a batch. They are written to the error sink
//! and the next update is processed.

use std::sync::Arc;

use karmabot_protocol::{BotApi, Message, Update};
use tracing::{debug, instrument};

use crate::birthday::BirthdayFlow;
use crate::clock::Clock;
use crate::commands::{Command, ParsedCommand, parse_command};
use crate::conversation::ConversationStore;
use crate::error::Result;
use crate::error_sink::record_error;
use crate::events;
use crate::karma::{KarmaPipeline, KarmaValidator, Reaction};
use crate::leaderboard::{self, Board};
use crate::persistence::{ErrorRecord, Persistence};

/// Handler selected for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'a> {
    /// A recognized slash command.
    Command(ParsedCommand<'a>),
    /// Input for the sender's active conversation.
    Conversation,
    /// A karma reaction reply.
    Reaction(Reaction),
    /// Not for us.
    Ignore,
}

/// Update router shared by the poll loop.
pub struct Dispatcher {
    api: Arc<dyn BotApi>,
    conversations: Arc<ConversationStore>,
    karma: KarmaPipeline,
    birthday: BirthdayFlow,
    bot_username: String,
}

impl Dispatcher {
    /// Create a dispatcher.
    pub fn new(
        api: Arc<dyn BotApi>,
        conversations: Arc<ConversationStore>,
        clock: Arc<dyn Clock>,
        bot_username: impl Into<String>,
    ) -> Self {
        let bot_username = bot_username.into();
        Self {
            karma: KarmaPipeline::new(api.clone(), KarmaValidator::new(clock)),
            birthday: BirthdayFlow::new(api.clone(), conversations.clone(), bot_username.clone()),
            api,
            conversations,
            bot_username,
        }
    }

    /// Process `updates` in order and return the next offset.
    ///
    /// The offset moves past every update seen, including ones whose
    /// handler failed.
    pub async fn process_batch(
        &self,
        store: &dyn Persistence,
        updates: &[Update],
        offset: i64,
    ) -> i64 {
        let mut next_offset = offset;

        for update in updates {
            next_offset = next_offset.max(update.update_id + 1);

            if let Err(e) = self.dispatch(store, update).await {
                let mut record = ErrorRecord {
                    error: e.to_string(),
                    ..Default::default()
                };
                if let Some(message) = &update.message {
                    record.group_id = Some(message.chat.id);
                    record.sender_id = message.from.as_ref().map(|u| u.id);
                    record.receiver_id = message
                        .reply_to_message
                        .as_ref()
                        .and_then(|m| m.from.as_ref())
                        .map(|u| u.id);
                }
                record_error(store, record).await;
            }
        }

        next_offset
    }

    /// Classify `message`.
    pub fn classify<'a>(&self, message: &'a Message) -> Route<'a> {
        let text = message.text();

        if let Some(command) = parse_command(text, &self.bot_username) {
            return Route::Command(command);
        }

        if message.chat.is_private()
            && let Some(sender) = &message.from
            && self.conversations.is_active(sender.id)
        {
            return Route::Conversation;
        }

        if message.reply_to_message.is_some()
            && let Some(reaction) = Reaction::parse(text)
        {
            return Route::Reaction(reaction);
        }

        Route::Ignore
    }

    /// Handle one update.
    #[instrument(skip_all, fields(update_id = update.update_id))]
    pub async fn dispatch(&self, store: &dyn Persistence, update: &Update) -> Result<()> {
        let Some(message) = &update.message else {
            debug!("Skipping update without a message");
            return Ok(());
        };

        match self.classify(message) {
            Route::Command(command) => self.run_command(store, message, command).await,
            Route::Conversation => {
                if let Some(sender) = &message.from {
                    self.birthday
                        .handle_message(store, message.chat.id, sender, message.text())
                        .await?;
                }
                Ok(())
            }
            Route::Reaction(reaction) => {
                self.karma.apply(store, message, reaction).await?;
                Ok(())
            }
            Route::Ignore => Ok(()),
        }
    }

    async fn run_command(
        &self,
        store: &dyn Persistence,
        message: &Message,
        parsed: ParsedCommand<'_>,
    ) -> Result<()> {
        let chat = &message.chat;
        if parsed.command.group_only() && !chat.is_group() {
            debug!(command = ?parsed.command, "Ignoring group command outside a group");
            return Ok(());
        }

        match parsed.command {
            Command::Start => {
                if chat.is_private()
                    && let Some(sender) = &message.from
                {
                    self.birthday.start(chat.id, sender, parsed.args).await?;
                }
                Ok(())
            }
            Command::LovedUsers => {
                leaderboard::send_leaderboard(self.api.as_ref(), store, chat.id, Board::Loved).await
            }
            Command::HatedUsers => {
                leaderboard::send_leaderboard(self.api.as_ref(), store, chat.id, Board::Hated).await
            }
            Command::Add | Command::Birthday => self.birthday.send_button(chat.id).await,
            Command::CreateEvent => match &message.from {
                Some(sender) => {
                    events::create_event(self.api.as_ref(), store, chat.id, sender.id, parsed.args)
                        .await
                }
                None => Ok(()),
            },
            Command::Events => events::list_events(self.api.as_ref(), store, chat.id).await,
            Command::DeleteEvent => {
                events::delete_event(self.api.as_ref(), store, chat.id, parsed.args).await
            }
        }
    }
}
