// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PostgreSQL-backed persistence implementation.
//!
//! Every upsert is a single `INSERT ... ON CONFLICT` statement so concurrent
//! writers for the same (user, group) pair never lose an increment.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::Result;

use super::{
    ErrorRecord, GroupEventRecord, KarmaIncrement, KarmaRecord, LeaderboardEntry, MemberProfile,
    NewGroupEvent, Persistence,
};

/// PostgreSQL-backed persistence implementation.
#[derive(Clone)]
pub struct PostgresPersistence {
    pool: PgPool,
}

impl PostgresPersistence {
    /// Create a new Postgres-backed persistence implementation.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Underlying pool.
    pub fn pool(&self) -> &PgPool {
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
impl Persistence for PostgresPersistence {
    async fn get_karma_record(&self, user_id: i64, group_id: i64) -> Result<Option<KarmaRecord>> {
        let record = sqlx::query_as::<_, KarmaRecord>(
            r#"
            SELECT user_id, group_id, first_name, last_name, username,
                   karma, karma_given, karma_taken, last_karma_given,
                   allowed_to_give_karma, allowed_to_receive_karma
            FROM users_ranking
            WHERE user_id = $1 AND group_id = $2
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
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id, group_id) DO UPDATE SET
                first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                username = EXCLUDED.username,
                last_karma_given = EXCLUDED.last_karma_given
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
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (user_id, group_id) DO UPDATE SET
                first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                username = EXCLUDED.username,
                karma = users_ranking.karma + EXCLUDED.karma,
                karma_given = users_ranking.karma_given + EXCLUDED.karma_given,
                karma_taken = users_ranking.karma_taken + EXCLUDED.karma_taken
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
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id, group_id) DO UPDATE SET
                first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                username = EXCLUDED.username
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
            SELECT TRIM(CONCAT(first_name, ' ', last_name)) AS full_name, karma
            FROM users_ranking
            WHERE group_id = $1 AND karma > 0
            ORDER BY karma DESC, full_name ASC
            LIMIT $2
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
            SELECT TRIM(CONCAT(first_name, ' ', last_name)) AS full_name, karma
            FROM users_ranking
            WHERE group_id = $1 AND karma < 0
            ORDER BY karma ASC, full_name ASC
            LIMIT $2
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
            VALUES ($1, $2, 'birthday', 'Cumpleaños', TRUE, 'annually', $3)
            ON CONFLICT (user_id, group_id, event_type) WHERE event_type = 'birthday'
            DO UPDATE SET recurrence_day = EXCLUDED.recurrence_day
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
            VALUES ($1, $2, 'event', $3, $4, $5, $6, $7, $8)
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
            "{} WHERE e.group_id = $1 ORDER BY e.created_at DESC, e.id DESC",
            EVENT_COLUMNS
        );
        let events = sqlx::query_as::<_, GroupEventRecord>(&query)
            .bind(group_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(events)
    }

    async fn delete_event(&self, event_id: i64, group_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM group_events WHERE id = $1 AND group_id = $2")
            .bind(event_id)
            .bind(group_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn birthdays_on(&self, day_month: &str) -> Result<Vec<GroupEventRecord>> {
        let query = format!(
            "{} WHERE e.event_type = 'birthday' AND e.recurrence_day = $1 ORDER BY e.group_id, e.id",
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
            VALUES ($1, $2, $3, $4)
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
