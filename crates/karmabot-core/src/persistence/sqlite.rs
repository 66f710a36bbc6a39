// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQLite-backed persistence implementation.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::error::{Error, Result};
use crate::migrations;

use super::{
    ErrorRecord, GroupEventRecord, KarmaIncrement, KarmaRecord, LeaderboardEntry, MemberProfile,
    NewGroupEvent, Persistence,
};

/// SQLite-backed persistence provider.
#[derive(Clone)]
pub struct SqlitePersistence {
    pool: SqlitePool,
}

impl SqlitePersistence {
    /// Create a new SQLite persistence provider from an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a `sqlite:` URL, creating the file if needed, and run
    /// migrations.
    ///
    /// In-memory URLs get a single connection so every query sees the same
    /// database.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let max_connections = if url.contains(":memory:") {
            1
        } else {
            max_connections
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        migrations::run_sqlite(&pool).await?;

        Ok(Self { pool })
    }

    /// Create and initialize a new SQLite persistence from a file path.
    ///
    /// Parent directories are created when missing.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Other(format!("Failed to create directory {:?}: {}", parent, e))
            })?;
        }

        Self::connect(&format!("sqlite:{}", path.to_string_lossy()), 5).await
    }

    /// Underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

const EVENT_COLUMNS: &str = r#"
    SELECT e.id, e.group_id, e.user_id, e.event_type, e.title, e.description,
           e.event_date, e.is_recurring, e.recurrence_type, e.recurrence_day, e.created_at,
           COALESCE(u.first_name, '') AS first_name,
           COALESCE(u.last_name, '') AS last_name,
           COALESCE(u.username, '') AS username
    FROM group_events e
    LEFT JOIN users_ranking u ON e.user_id = u.user_id AND e.group_id = u.group_id
"#;

#[async_trait]
impl Persistence for SqlitePersistence {
    async fn get_karma_record(&self, user_id: i64, group_id: i64) -> Result<Option<KarmaRecord>> {
        let record = sqlx::query_as::<_, KarmaRecord>(
            r#"
            SELECT user_id, group_id, first_name, last_name, username,
                   karma, karma_given, karma_taken, last_karma_given,
                   allowed_to_give_karma, allowed_to_receive_karma
            FROM users_ranking
            WHERE user_id = ? AND group_id = ?
            "#,
        )
        .bind(user_id)
        .bind(group_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn stamp_karma_given(
        &self,
        member: &MemberProfile,
        group_id: i64,
        at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users_ranking (user_id, group_id, first_name, last_name, username, last_karma_given)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (user_id, group_id) DO UPDATE SET
                first_name = excluded.first_name,
                last_name = excluded.last_name,
                username = excluded.username,
                last_karma_given = excluded.last_karma_given
            "#,
        )
        .bind(member.user_id)
        .bind(group_id)
        .bind(&member.first_name)
        .bind(&member.last_name)
        .bind(&member.username)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn upsert_karma(
        &self,
        member: &MemberProfile,
        group_id: i64,
        increment: KarmaIncrement,
    ) -> Result<i64> {
        let (karma,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO users_ranking
                (user_id, group_id, first_name, last_name, username, karma, karma_given, karma_taken)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (user_id, group_id) DO UPDATE SET
                first_name = excluded.first_name,
                last_name = excluded.last_name,
                username = excluded.username,
                karma = users_ranking.karma + excluded.karma,
                karma_given = users_ranking.karma_given + excluded.karma_given,
                karma_taken = users_ranking.karma_taken + excluded.karma_taken
            RETURNING karma
            "#,
        )
        .bind(member.user_id)
        .bind(group_id)
        .bind(&member.first_name)
        .bind(&member.last_name)
        .bind(&member.username)
        .bind(increment.karma)
        .bind(increment.given)
        .bind(increment.taken)
        .fetch_one(&self.pool)
        .await?;

        Ok(karma)
    }

    async fn ensure_member(&self, member: &MemberProfile, group_id: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users_ranking (user_id, group_id, first_name, last_name, username)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (user_id, group_id) DO UPDATE SET
                first_name = excluded.first_name,
                last_name = excluded.last_name,
                username = excluded.username
            "#,
        )
        .bind(member.user_id)
        .bind(group_id)
        .bind(&member.first_name)
        .bind(&member.last_name)
        .bind(&member.username)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn most_loved(&self, group_id: i64, limit: i64) -> Result<Vec<LeaderboardEntry>> {
        let entries = sqlx::query_as::<_, LeaderboardEntry>(
            r#"
            SELECT TRIM(COALESCE(first_name, '') || ' ' || COALESCE(last_name, '')) AS full_name, karma
            FROM users_ranking
            WHERE group_id = ? AND karma > 0
            ORDER BY karma DESC, full_name ASC
            LIMIT ?
            "#,
        )
        .bind(group_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    async fn most_hated(&self, group_id: i64, limit: i64) -> Result<Vec<LeaderboardEntry>> {
        let entries = sqlx::query_as::<_, LeaderboardEntry>(
            r#"
            SELECT TRIM(COALESCE(first_name, '') || ' ' || COALESCE(last_name, '')) AS full_name, karma
            FROM users_ranking
            WHERE group_id = ? AND karma < 0
            ORDER BY karma ASC, full_name ASC
            LIMIT ?
            "#,
        )
        .bind(group_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    async fn upsert_birthday(&self, user_id: i64, group_id: i64, day_month: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO group_events
                (group_id, user_id, event_type, title, is_recurring, recurrence_type, recurrence_day)
            VALUES (?, ?, 'birthday', 'Cumpleaños', 1, 'annually', ?)
            ON CONFLICT (user_id, group_id, event_type) WHERE event_type = 'birthday'
            DO UPDATE SET recurrence_day = excluded.recurrence_day
            "#,
        )
        .bind(group_id)
        .bind(user_id)
        .bind(day_month)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn create_event(&self, event: &NewGroupEvent) -> Result<i64> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO group_events
                (group_id, user_id, event_type, title, description, event_date,
                 is_recurring, recurrence_type, recurrence_day)
            VALUES (?, ?, 'event', ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(event.group_id)
        .bind(event.user_id)
        .bind(&event.title)
        .bind(&event.description)
        .bind(event.event_date)
        .bind(event.recurrence_type.is_some())
        .bind(&event.recurrence_type)
        .bind(&event.recurrence_day)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn list_group_events(&self, group_id: i64) -> Result<Vec<GroupEventRecord>> {
        let query = format!(
            "{} WHERE e.group_id = ? ORDER BY e.created_at DESC, e.id DESC",
            EVENT_COLUMNS
        );
        let events = sqlx::query_as::<_, GroupEventRecord>(&query)
            .bind(group_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(events)
    }

    async fn delete_event(&self, event_id: i64, group_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM group_events WHERE id = ? AND group_id = ?")
            .bind(event_id)
            .bind(group_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn birthdays_on(&self, day_month: &str) -> Result<Vec<GroupEventRecord>> {
        let query = format!(
            "{} WHERE e.event_type = 'birthday' AND e.recurrence_day = ? ORDER BY e.group_id, e.id",
            EVENT_COLUMNS
        );
        let events = sqlx::query_as::<_, GroupEventRecord>(&query)
            .bind(day_month)
            .fetch_all(&self.pool)
            .await?;

        Ok(events)
    }

    async fn insert_error_record(&self, record: &ErrorRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO bot_errors (group_id, sender_id, receiver_id, error)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(record.group_id)
        .bind(record.sender_id)
        .bind(record.receiver_id)
        .bind(&record.error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
