// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Karma pipeline: reaction parsing, eligibility checks and the ledger.
//!
//! A reply whose first token is `+1` or `-1` grants or takes one point from
//! the author of the replied-to message:
//!
//! ```text
//! reply "+1" ──► KarmaValidator ──► ledger::grant_karma ──► ledger::record_grant_given ──► reply
//!                     │
//!                     └── Rejected ──► one notice, no writes
//! ```

pub mod ledger;
pub mod validator;

pub use validator::{KarmaValidator, Rejection, Verdict};

use std::sync::Arc;

use karmabot_protocol::{BotApi, Message, SendMessageRequest};
use tracing::{info, instrument, warn};

use crate::error::Result;
use crate::persistence::{MemberProfile, Persistence};

/// A karma reaction token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    /// `+1`
    PlusOne,
    /// `-1`
    MinusOne,
}

impl Reaction {
    /// Parse the first whitespace-delimited token of `text`.
    pub fn parse(text: &str) -> Option<Self> {
        match text.split_whitespace().next()? {
            "+1" => Some(Self::PlusOne),
            "-1" => Some(Self::MinusOne),
            _ => None,
        }
    }

    /// Signed score change.
    pub fn delta(self) -> i64 {
        match self {
            Self::PlusOne => 1,
            Self::MinusOne => -1,
        }
    }

    fn verb(self) -> &'static str {
        match self {
            Self::PlusOne => "given to",
            Self::MinusOne => "taken from",
        }
    }
}

/// What happened to a reaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KarmaOutcome {
    /// Both ledger writes succeeded.
    Granted {
        /// Receiver's new total.
        total: i64,
    },
    /// A validation rule refused the grant.
    Rejected(Rejection),
    /// The message lacks a sender or a replied-to author.
    Ignored,
}

/// Runs a reaction through validation and the ledger and replies in chat.
pub struct KarmaPipeline {
    api: Arc<dyn BotApi>,
    validator: KarmaValidator,
}

impl KarmaPipeline {
    /// Create a pipeline.
    pub fn new(api: Arc<dyn BotApi>, validator: KarmaValidator) -> Self {
        Self { api, validator }
    }

    /// Apply `reaction` carried by `message`.
    ///
    /// Rejections are answered in chat and returned as outcomes. Ledger
    /// failures are answered with "Error adding karma" and returned as
    /// errors so the caller can record them.
    #[instrument(skip_all, fields(chat_id = message.chat.id, message_id = message.message_id, reaction = ?reaction))]
    pub async fn apply(
        &self,
        store: &dyn Persistence,
        message: &Message,
        reaction: Reaction,
    ) -> Result<KarmaOutcome> {
        let Some(sender) = message.from.as_ref() else {
            return Ok(KarmaOutcome::Ignored);
        };
        let Some(replied) = message.reply_to_message.as_deref() else {
            return Ok(KarmaOutcome::Ignored);
        };
        let Some(receiver) = replied.from.as_ref() else {
            return Ok(KarmaOutcome::Ignored);
        };

        let chat_id = message.chat.id;
        let sender = MemberProfile::from(sender);
        let receiver_profile = MemberProfile::from(receiver);

        let verdict = self
            .validator
            .check(store, &sender, receiver.id, chat_id)
            .await?;

        if let Verdict::Rejected(rejection) = verdict {
            info!(
                sender_id = sender.user_id,
                receiver_id = receiver.id,
                ?rejection,
                "Karma grant rejected"
            );
            self.api
                .send_message(
                    &SendMessageRequest::text(chat_id, rejection.message())
                        .reply_to(replied.message_id),
                )
                .await?;
            return Ok(KarmaOutcome::Rejected(rejection));
        }

        let written = async {
            let total = ledger::grant_karma(store, &receiver_profile, chat_id, reaction).await?;
            ledger::record_grant_given(store, &sender, chat_id, reaction).await?;
            Ok::<_, crate::error::Error>(total)
        }
        .await;

        let total = match written {
            Ok(total) => total,
            Err(e) => {
                let notice = SendMessageRequest::text(chat_id, "Error adding karma")
                    .reply_to(message.message_id);
                if let Err(send_err) = self.api.send_message(&notice).await {
                    warn!(error = %send_err, "Failed to send karma error notice");
                }
                return Err(e);
            }
        };

        info!(
            sender_id = sender.user_id,
            receiver_id = receiver.id,
            total,
            "Karma updated"
        );

        let text = format!(
            "Karma {} {}. Total karma: {}",
            reaction.verb(),
            receiver.first_name,
            total
        );
        self.api
            .send_message(&SendMessageRequest::text(chat_id, text).reply_to(replied.message_id))
            .await?;

        Ok(KarmaOutcome::Granted { total })
    }
}
