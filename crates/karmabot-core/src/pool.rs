// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Connection pool manager.
//!
//! One bounded PostgreSQL pool per logical database name. The first request
//! for a name provisions the database on the server (via the maintenance
//! database), applies migrations and builds the pool. Later requests
//! health-probe the cached pool; a failed probe closes and drops it, and the
//! pool is provisioned again.
//!
//! The poll loop and the scheduler do not talk to the manager directly; they
//! ask a [`StoreProvider`] for a [`Persistence`] handle each cycle.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Connection, PgConnection, PgPool, Postgres};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::migrations;
use crate::persistence::{Persistence, PostgresPersistence};

/// SQLSTATE `duplicate_database`.
const DUPLICATE_DATABASE: &str = "42P04";

/// Source of a ready-to-use store.
#[async_trait]
pub trait StoreProvider: Send + Sync {
    /// Return a healthy store, provisioning it if necessary.
    async fn store(&self) -> Result<Arc<dyn Persistence>>;
}

/// Provider that always hands out the same store (SQLite, tests).
#[derive(Clone)]
pub struct StaticStore {
    store: Arc<dyn Persistence>,
}

impl StaticStore {
    /// Wrap an existing store.
    pub fn new(store: Arc<dyn Persistence>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl StoreProvider for StaticStore {
    async fn store(&self) -> Result<Arc<dyn Persistence>> {
        Ok(self.store.clone())
    }
}

/// Pool sizing and lifetime limits.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Upper bound of open connections per database.
    pub max_connections: u32,
    /// Connections kept open while idle.
    pub min_connections: u32,
    /// How long to wait for a free connection.
    pub acquire_timeout: Duration,
    /// Connections are recycled after this age.
    pub max_lifetime: Duration,
    /// Idle connections above `min_connections` are closed after this long.
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 0,
            acquire_timeout: Duration::from_secs(10),
            max_lifetime: Duration::from_secs(30 * 60),
            idle_timeout: Duration::from_secs(10 * 60),
        }
    }
}

/// Lazily-created, health-checked pools keyed by logical database name.
pub struct PoolManager {
    server_url: String,
    config: PoolConfig,
    pools: Mutex<HashMap<String, PgPool>>,
}

impl PoolManager {
    /// Create a manager for the server reachable at `server_url`.
    ///
    /// `server_url` points at the maintenance database (usually `postgres`);
    /// pools for other databases reuse its host and credentials.
    pub fn new(server_url: impl Into<String>, config: PoolConfig) -> Self {
        Self {
            server_url: server_url.into(),
            config,
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// Pool for `db_name`, provisioned on first use and probed before reuse.
    pub async fn get_pool(&self, db_name: &str) -> Result<PgPool> {
        let mut pools = self.pools.lock().await;

        if let Some(pool) = pools.get(db_name) {
            match sqlx::query("SELECT 1").execute(pool).await {
                Ok(_) => return Ok(pool.clone()),
                Err(e) => {
                    warn!(db_name, error = %e, "Pool health check failed, recreating pool");
                    if let Some(stale) = pools.remove(db_name) {
                        stale.close().await;
                    }
                }
            }
        }

        let pool = self.provision(db_name).await?;
        pools.insert(db_name.to_string(), pool.clone());
        Ok(pool)
    }

    /// Check out one connection. It returns to the pool when dropped.
    pub async fn get_connection(&self, db_name: &str) -> Result<PoolConnection<Postgres>> {
        let pool = self.get_pool(db_name).await?;
        Ok(pool.acquire().await?)
    }

    /// Number of cached pools.
    pub async fn len(&self) -> usize {
        self.pools.lock().await.len()
    }

    /// Whether no pool has been created yet.
    pub async fn is_empty(&self) -> bool {
        self.pools.lock().await.is_empty()
    }

    /// Close every pool.
    pub async fn close_all(&self) {
        let mut pools = self.pools.lock().await;
        for (db_name, pool) in pools.drain() {
            pool.close().await;
            info!(db_name, "Pool closed");
        }
    }

    async fn provision(&self, db_name: &str) -> Result<PgPool> {
        validate_database_name(db_name)?;

        let server_options = PgConnectOptions::from_str(&self.server_url)?;

        let mut conn = PgConnection::connect_with(&server_options).await?;
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pg_database WHERE datname = $1)")
                .bind(db_name)
                .fetch_one(&mut conn)
                .await?;

        if !exists {
            info!(db_name, "Creating database");
            let created = sqlx::query(&format!("CREATE DATABASE \"{}\"", db_name))
                .execute(&mut conn)
                .await;
            match created {
                Ok(_) => {}
                // Another process created it between the check and the create.
                Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some(DUPLICATE_DATABASE) => {}
                Err(e) => return Err(e.into()),
            }
        }
        conn.close().await?;

        let pool = PgPoolOptions::new()
            .max_connections(self.config.max_connections)
            .min_connections(self.config.min_connections)
            .acquire_timeout(self.config.acquire_timeout)
            .max_lifetime(self.config.max_lifetime)
            .idle_timeout(self.config.idle_timeout)
            .connect_with(server_options.database(db_name))
            .await?;

        migrations::run_postgres(&pool).await?;

        info!(
            db_name,
            max_connections = self.config.max_connections,
            "Database pool ready"
        );

        Ok(pool)
    }
}

/// [`StoreProvider`] for one logical database behind a [`PoolManager`].
#[derive(Clone)]
pub struct PooledStore {
    manager: Arc<PoolManager>,
    db_name: String,
}

impl PooledStore {
    /// Provider for `db_name`.
    pub fn new(manager: Arc<PoolManager>, db_name: impl Into<String>) -> Self {
        Self {
            manager,
            db_name: db_name.into(),
        }
    }
}

#[async_trait]
impl StoreProvider for PooledStore {
    async fn store(&self) -> Result<Arc<dyn Persistence>> {
        let pool = self.manager.get_pool(&self.db_name).await?;
        Ok(Arc::new(PostgresPersistence::new(pool)))
    }
}

/// Database names are interpolated into `CREATE DATABASE`, so only plain
/// identifiers are accepted.
pub fn validate_database_name(db_name: &str) -> Result<()> {
    let valid = !db_name.is_empty()
        && db_name.len() <= 63
        && db_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !db_name.starts_with(|c: char| c.is_ascii_digit());

    if valid {
        Ok(())
    } else {
        Err(Error::InvalidDatabaseName(db_name.to_string()))
    }
}
