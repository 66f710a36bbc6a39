// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Pool manager tests against a live server. Require `TEST_DATABASE_URL`.

mod common;

use std::sync::Arc;

use common::*;
use karmabot_core::{Persistence, PoolConfig, PoolManager, PooledStore, StoreProvider};
use sqlx::{Connection, PgConnection};

fn unique_db_name() -> String {
    format!("karmabot_test_{}", unique_group_id().unsigned_abs())
}

async fn drop_database(server_url: &str, db_name: &str) {
    let mut conn = PgConnection::connect(server_url)
        .await
        .expect("Failed to connect for cleanup");
    sqlx::query(&format!("DROP DATABASE IF EXISTS \"{}\" WITH (FORCE)", db_name))
        .execute(&mut conn)
        .await
        .expect("Failed to drop test database");
}

#[tokio::test]
async fn test_provisions_database_and_reuses_pool() {
    skip_if_no_db!();
    let server_url = std::env::var("TEST_DATABASE_URL").unwrap();
    let db_name = unique_db_name();

    let manager = PoolManager::new(server_url.clone(), PoolConfig::default());
    assert!(manager.is_empty().await);

    let pool = manager.get_pool(&db_name).await.unwrap();
    let (tables,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM information_schema.tables WHERE table_name IN ('users_ranking', 'group_events', 'bot_errors')",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(tables, 3);

    manager.get_pool(&db_name).await.unwrap();
    assert_eq!(manager.len().await, 1);

    let mut conn = manager.get_connection(&db_name).await.unwrap();
    let (one,): (i32,) = sqlx::query_as("SELECT 1").fetch_one(&mut *conn).await.unwrap();
    assert_eq!(one, 1);
    drop(conn);

    manager.close_all().await;
    assert!(manager.is_empty().await);

    drop_database(&server_url, &db_name).await;
}

#[tokio::test]
async fn test_pooled_store_reports_health() {
    skip_if_no_db!();
    let server_url = std::env::var("TEST_DATABASE_URL").unwrap();
    let db_name = unique_db_name();

    let manager = Arc::new(PoolManager::new(server_url.clone(), PoolConfig::default()));
    let provider = PooledStore::new(manager.clone(), db_name.clone());

    let store = provider.store().await.unwrap();
    store.health_check().await.unwrap();
    assert_eq!(manager.len().await, 1);

    manager.close_all().await;
    drop_database(&server_url, &db_name).await;
}

#[tokio::test]
async fn test_rejects_unsafe_database_name() {
    skip_if_no_db!();
    let server_url = std::env::var("TEST_DATABASE_URL").unwrap();

    let manager = PoolManager::new(server_url, PoolConfig::default());
    let result = manager.get_pool("bad-name\"; --").await;

    assert!(matches!(result, Err(karmabot_core::Error::InvalidDatabaseName(_))));
    assert!(manager.is_empty().await);
}
