// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Eligibility checks run before a karma grant.

use std::sync::Arc;

use chrono::Duration;
use tracing::debug;

use crate::clock::Clock;
use crate::error::Result;
use crate::persistence::{MemberProfile, Persistence};

/// Minimum seconds between two grants by the same sender in one group.
pub const DEFAULT_COOLDOWN_SECS: i64 = 60;

/// Why a grant was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Sender replied to their own message.
    SelfGrant,
    /// Sender has `allowed_to_give_karma = false`.
    SenderBlocked,
    /// Receiver has `allowed_to_receive_karma = false`.
    ReceiverBlocked,
    /// Sender granted karma less than a cooldown ago.
    CoolingDown,
}

impl Rejection {
    /// Text sent back to the chat.
    pub fn message(&self) -> &'static str {
        match self {
            Self::SelfGrant => "Wew. You can't give karma to yourself dummy ~",
            Self::SenderBlocked => "Sorry bro you can't give aura points around here.",
            Self::ReceiverBlocked => "Sorry bro this person can't receive aura points.",
            Self::CoolingDown => "Whoops you are not allowed to give karma yet :(",
        }
    }
}

/// Outcome of [`KarmaValidator::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The grant may proceed; the sender's cooldown has been stamped.
    Allowed,
    /// The grant was refused; nothing was written.
    Rejected(Rejection),
}

/// Self-grant, permission and cooldown checks.
pub struct KarmaValidator {
    clock: Arc<dyn Clock>,
    cooldown: Duration,
}

impl KarmaValidator {
    /// Validator with the default 60 second cooldown.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_cooldown(clock, Duration::seconds(DEFAULT_COOLDOWN_SECS))
    }

    /// Validator with a custom cooldown.
    pub fn with_cooldown(clock: Arc<dyn Clock>, cooldown: Duration) -> Self {
        Self { clock, cooldown }
    }

    /// Run the checks in order: self-grant, sender permission, receiver
    /// permission, cooldown. On success the sender's `last_karma_given` is
    /// set to now, creating the sender's row if needed.
    ///
    /// Missing rows count as allowed, and a sender without a timestamp is
    /// not subject to the cooldown.
    pub async fn check(
        &self,
        store: &dyn Persistence,
        sender: &MemberProfile,
        receiver_id: i64,
        group_id: i64,
    ) -> Result<Verdict> {
        if sender.user_id == receiver_id {
            return Ok(Verdict::Rejected(Rejection::SelfGrant));
        }

        let sender_record = store.get_karma_record(sender.user_id, group_id).await?;
        if let Some(record) = &sender_record
            && !record.allowed_to_give_karma
        {
            return Ok(Verdict::Rejected(Rejection::SenderBlocked));
        }

        let receiver_record = store.get_karma_record(receiver_id, group_id).await?;
        if let Some(record) = &receiver_record
            && !record.allowed_to_receive_karma
        {
            return Ok(Verdict::Rejected(Rejection::ReceiverBlocked));
        }

        let now = self.clock.now();
        if let Some(last) = sender_record.and_then(|r| r.last_karma_given)
            && now - last < self.cooldown
        {
            debug!(
                sender_id = sender.user_id,
                group_id,
                elapsed_secs = (now - last).num_seconds(),
                "Sender still cooling down"
            );
            return Ok(Verdict::Rejected(Rejection::CoolingDown));
        }

        store.stamp_karma_given(sender, group_id, now).await?;
        Ok(Verdict::Allowed)
    }
}
