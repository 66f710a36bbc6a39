// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Karma score mutations.
//!
//! A grant is two independent writes: the receiver's score, then the
//! sender's given/taken counter. They do not share a transaction, so a
//! failure in the second write leaves the receiver's change in place.

use crate::error::Result;
use crate::persistence::{KarmaIncrement, MemberProfile, Persistence};

use super::Reaction;

/// Apply `reaction` to the receiver's score and return the new total.
///
/// Creates the receiver's row on first grant and refreshes their names.
pub async fn grant_karma(
    store: &dyn Persistence,
    receiver: &MemberProfile,
    group_id: i64,
    reaction: Reaction,
) -> Result<i64> {
    let increment = KarmaIncrement {
        karma: reaction.delta(),
        ..Default::default()
    };
    store.upsert_karma(receiver, group_id, increment).await
}

/// Count the grant against the sender: `karma_given` for `+1`,
/// `karma_taken` for `-1`. The sender's own score is not touched.
pub async fn record_grant_given(
    store: &dyn Persistence,
    sender: &MemberProfile,
    group_id: i64,
    reaction: Reaction,
) -> Result<()> {
    let increment = match reaction {
        Reaction::PlusOne => KarmaIncrement {
            given: 1,
            ..Default::default()
        },
        Reaction::MinusOne => KarmaIncrement {
            taken: 1,
            ..Default::default()
        },
    };
    store.upsert_karma(sender, group_id, increment).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::SqlitePersistence;

    const GROUP: i64 = -42;

    fn profile(user_id: i64, first_name: &str) -> MemberProfile {
        MemberProfile {
            user_id,
            first_name: first_name.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_grant_then_record_from_empty_store() {
        let store = SqlitePersistence::connect("sqlite::memory:", 1).await.unwrap();
        let ana = profile(1, "Ana");
        let beto = profile(2, "Beto");

        let total = grant_karma(&store, &beto, GROUP, Reaction::PlusOne).await.unwrap();
        record_grant_given(&store, &ana, GROUP, Reaction::PlusOne).await.unwrap();

        assert_eq!(total, 1);
        let receiver = store.get_karma_record(2, GROUP).await.unwrap().unwrap();
        assert_eq!(receiver.karma, 1);
        let sender = store.get_karma_record(1, GROUP).await.unwrap().unwrap();
        assert_eq!(sender.karma_given, 1);
        assert_eq!(sender.karma_taken, 0);
        assert_eq!(sender.karma, 0);

        let total = grant_karma(&store, &beto, GROUP, Reaction::PlusOne).await.unwrap();
        assert_eq!(total, 2);
    }

    #[tokio::test]
    async fn test_minus_one_counts_as_taken() {
        let store = SqlitePersistence::connect("sqlite::memory:", 1).await.unwrap();
        let ana = profile(1, "Ana");
        let beto = profile(2, "Beto");

        let total = grant_karma(&store, &beto, GROUP, Reaction::MinusOne).await.unwrap();
        record_grant_given(&store, &ana, GROUP, Reaction::MinusOne).await.unwrap();

        assert_eq!(total, -1);
        let sender = store.get_karma_record(1, GROUP).await.unwrap().unwrap();
        assert_eq!(sender.karma_taken, 1);
        assert_eq!(sender.karma_given, 0);
    }
}
