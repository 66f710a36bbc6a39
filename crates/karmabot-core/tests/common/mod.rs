// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for karmabot-core integration tests.
//!
//! PostgreSQL tests run only when `TEST_DATABASE_URL` is set.

#![allow(dead_code)]

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use sqlx::PgPool;

use karmabot_core::persistence::PostgresPersistence;

/// Test context holding a migrated PostgreSQL pool.
pub struct TestContext {
    pub pool: PgPool,
    pub store: PostgresPersistence,
}

impl TestContext {
    /// Connect to `TEST_DATABASE_URL` and apply migrations.
    pub async fn new() -> Option<Self> {
        let database_url = std::env::var("TEST_DATABASE_URL").ok()?;
        let pool = PgPool::connect(&database_url).await.ok()?;
        karmabot_core::migrations::run_postgres(&pool).await.ok()?;

        Some(Self {
            store: PostgresPersistence::new(pool.clone()),
            pool,
        })
    }

    /// Remove every row belonging to `group_id`.
    pub async fn cleanup_group(&self, group_id: i64) {
        for table in ["users_ranking", "group_events", "bot_errors"] {
            sqlx::query(&format!("DELETE FROM {} WHERE group_id = $1", table))
                .bind(group_id)
                .execute(&self.pool)
                .await
                .expect("Failed to clean up test rows");
        }
    }
}

/// Negative chat id that no other test run uses.
pub fn unique_group_id() -> i64 {
    static COUNTER: AtomicI64 = AtomicI64::new(0);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0);
    -((nanos % 1_000_000_000_000) * 1000 + COUNTER.fetch_add(1, Ordering::SeqCst) % 1000) - 1
}

/// Helper macro to skip tests if TEST_DATABASE_URL is not set.
#[macro_export]
macro_rules! skip_if_no_db {
    () => {
        if std::env::var("TEST_DATABASE_URL").is_err() {
            eprintln!("Skipping test: TEST_DATABASE_URL not set");
            return;
        }
    };
}
