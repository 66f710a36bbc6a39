// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persistence interfaces and backends for karmabot-core.
//!
//! This module defines the persistence abstraction and backend implementations.

pub mod postgres;
pub mod sqlite;

pub use self::postgres::PostgresPersistence;
pub use self::sqlite::SqlitePersistence;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use karmabot_protocol::User;

use crate::error::Result;

/// `event_type` of a birthday row.
pub const EVENT_TYPE_BIRTHDAY: &str = "birthday";
/// `event_type` of a free-form event row.
pub const EVENT_TYPE_EVENT: &str = "event";

/// Display names of a chat member, refreshed on every write.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MemberProfile {
    /// Platform user id.
    pub user_id: i64,
    /// First name.
    pub first_name: String,
    /// Last name.
    pub last_name: Option<String>,
    /// Username without `@`.
    pub username: Option<String>,
}

impl From<&User> for MemberProfile {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            username: user.username.clone(),
        }
    }
}

/// Karma row for a (user, group) pair.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct KarmaRecord {
    /// Platform user id.
    pub user_id: i64,
    /// Chat id of the group.
    pub group_id: i64,
    /// Latest known first name.
    pub first_name: Option<String>,
    /// Latest known last name.
    pub last_name: Option<String>,
    /// Latest known username.
    pub username: Option<String>,
    /// Sum of every signed grant received in this group.
    pub karma: i64,
    /// Number of positive grants this user gave.
    pub karma_given: i64,
    /// Number of negative grants this user gave.
    pub karma_taken: i64,
    /// When this user last passed the cooldown check.
    pub last_karma_given: Option<DateTime<Utc>>,
    /// Whether this user may grant karma.
    pub allowed_to_give_karma: bool,
    /// Whether this user may receive karma.
    pub allowed_to_receive_karma: bool,
}

/// Additive change applied by [`Persistence::upsert_karma`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KarmaIncrement {
    /// Added to `karma`.
    pub karma: i64,
    /// Added to `karma_given`.
    pub given: i64,
    /// Added to `karma_taken`.
    pub taken: i64,
}

/// One leaderboard line.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct LeaderboardEntry {
    /// `first_name last_name`, trimmed; may be empty.
    pub full_name: String,
    /// Current karma.
    pub karma: i64,
}

/// Event to insert with [`Persistence::create_event`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGroupEvent {
    /// Owning group.
    pub group_id: i64,
    /// Creator.
    pub user_id: i64,
    /// Title.
    pub title: String,
    /// Free text description.
    pub description: String,
    /// Date of a one-time event.
    pub event_date: Option<DateTime<Utc>>,
    /// `weekly`, `monthly` or `annually` for recurring events.
    pub recurrence_type: Option<String>,
    /// Recurrence anchor, e.g. `MON 09:00`.
    pub recurrence_day: Option<String>,
}

/// Event row joined with the owner's names from `users_ranking`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct GroupEventRecord {
    /// Database primary key.
    pub id: i64,
    /// Owning group.
    pub group_id: i64,
    /// Owner (birthday person or creator).
    pub user_id: i64,
    /// `birthday` or `event`.
    pub event_type: String,
    /// Title.
    pub title: String,
    /// Description.
    pub description: Option<String>,
    /// Date of a one-time event.
    pub event_date: Option<DateTime<Utc>>,
    /// Whether the event repeats.
    pub is_recurring: bool,
    /// Recurrence period.
    pub recurrence_type: Option<String>,
    /// Recurrence anchor (`DD/MM` for birthdays).
    pub recurrence_day: Option<String>,
    /// Insertion time.
    pub created_at: DateTime<Utc>,
    /// Owner first name, empty when unknown.
    pub first_name: String,
    /// Owner last name, empty when unknown.
    pub last_name: String,
    /// Owner username, empty when unknown.
    pub username: String,
}

impl GroupEventRecord {
    /// Whether this row is a birthday.
    pub fn is_birthday(&self) -> bool {
        self.event_type == EVENT_TYPE_BIRTHDAY
    }
}

/// Row for the `bot_errors` table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErrorRecord {
    /// Chat the failing update came from.
    pub group_id: Option<i64>,
    /// Author of the failing update.
    pub sender_id: Option<i64>,
    /// Author of the replied-to message, for karma updates.
    pub receiver_id: Option<i64>,
    /// Error text.
    pub error: String,
}

/// Persistence interface used by the update engine.
#[allow(missing_docs)]
#[async_trait]
pub trait Persistence: Send + Sync {
    async fn get_karma_record(&self, user_id: i64, group_id: i64) -> Result<Option<KarmaRecord>>;

    /// Insert-or-update the member's row, setting `last_karma_given` to `at`.
    /// Counters are left untouched (a new row starts at zero).
    async fn stamp_karma_given(
        &self,
        member: &MemberProfile,
        group_id: i64,
        at: DateTime<Utc>,
    ) -> Result<()>;

    /// Insert-or-additive-update of the member's counters.
    ///
    /// Returns the post-mutation `karma` total.
    async fn upsert_karma(
        &self,
        member: &MemberProfile,
        group_id: i64,
        increment: KarmaIncrement,
    ) -> Result<i64>;

    /// Make sure the member has a ranking row in the group, refreshing names.
    async fn ensure_member(&self, member: &MemberProfile, group_id: i64) -> Result<()>;

    async fn most_loved(&self, group_id: i64, limit: i64) -> Result<Vec<LeaderboardEntry>>;

    async fn most_hated(&self, group_id: i64, limit: i64) -> Result<Vec<LeaderboardEntry>>;

    /// Insert or replace the member's birthday (`DD/MM`) in the group.
    async fn upsert_birthday(&self, user_id: i64, group_id: i64, day_month: &str) -> Result<()>;

    /// Insert a free-form event and return its id.
    async fn create_event(&self, event: &NewGroupEvent) -> Result<i64>;

    /// All events of a group, newest first.
    async fn list_group_events(&self, group_id: i64) -> Result<Vec<GroupEventRecord>>;

    /// Delete an event scoped to its group. Returns whether a row was removed.
    async fn delete_event(&self, event_id: i64, group_id: i64) -> Result<bool>;

    /// Birthdays whose `DD/MM` anchor equals `day_month`, across all groups.
    async fn birthdays_on(&self, day_month: &str) -> Result<Vec<GroupEventRecord>>;

    async fn insert_error_record(&self, record: &ErrorRecord) -> Result<()>;

    /// Round-trip probe used before reusing a pool.
    async fn health_check(&self) -> Result<()>;
}
