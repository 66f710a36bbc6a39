// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Karmabot - Telegram karma bot
//!
//! Runs two long-lived tasks until Ctrl-C:
//! - the long-poll loop that processes updates
//! - the birthday scheduler

use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};

use karmabot_core::config::DEFAULT_LOG_FILTER;
use karmabot_core::persistence::SqlitePersistence;
use karmabot_core::{
    BirthdayScheduler, Config, ConversationStore, DatabaseConfig, Dispatcher, PoolConfig,
    PoolManager, PooledStore, Poller, PollerConfig, SchedulerConfig, StaticStore, StoreProvider,
    SystemClock,
};
use karmabot_protocol::{TelegramClient, TelegramClientConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    info!("Starting karmabot");

    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    info!(
        bot_username = %config.bot_username,
        long_poll_secs = config.long_poll_secs,
        scheduler_enabled = config.scheduler_enabled,
        "Configuration loaded"
    );

    let mut client_config = TelegramClientConfig::new(config.token.clone());
    client_config.base_url = config.telegram_base_url.clone();
    let api = Arc::new(TelegramClient::new(client_config)?);

    let mut pool_manager = None;
    let stores: Arc<dyn StoreProvider> = match &config.database {
        DatabaseConfig::Postgres {
            server_url,
            db_name,
        } => {
            let manager = Arc::new(PoolManager::new(
                server_url.clone(),
                PoolConfig {
                    max_connections: config.db_max_connections,
                    ..PoolConfig::default()
                },
            ));
            pool_manager = Some(manager.clone());
            info!(db_name = %db_name, "Using PostgreSQL storage");
            Arc::new(PooledStore::new(manager, db_name.clone()))
        }
        DatabaseConfig::Sqlite { url } => {
            info!(url = %url, "Using SQLite storage");
            let store = SqlitePersistence::connect(url, config.db_max_connections).await?;
            Arc::new(StaticStore::new(Arc::new(store)))
        }
    };

    let clock = Arc::new(SystemClock);
    let conversations = Arc::new(ConversationStore::new(clock.clone()));

    let dispatcher = Dispatcher::new(
        api.clone(),
        conversations.clone(),
        clock.clone(),
        config.bot_username.clone(),
    );
    let poller = Poller::new(
        api.clone(),
        stores.clone(),
        dispatcher,
        PollerConfig::from_config(&config),
    );
    let scheduler = BirthdayScheduler::new(
        api,
        stores,
        conversations,
        clock,
        SchedulerConfig::from_config(&config),
    );

    let poller_shutdown = poller.shutdown_handle();
    let scheduler_shutdown = scheduler.shutdown_handle();

    let poller_handle = tokio::spawn(poller.run(0));
    let scheduler_handle = tokio::spawn(scheduler.run());

    info!("Karmabot running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    poller_shutdown.notify_one();
    scheduler_shutdown.notify_one();

    match poller_handle.await {
        Ok(offset) => info!(offset, "Poller stopped"),
        Err(e) => error!(error = %e, "Poller task failed"),
    }
    if let Err(e) = scheduler_handle.await {
        error!(error = %e, "Scheduler task failed");
    }

    if let Some(manager) = pool_manager {
        manager.close_all().await;
    }

    info!("Shutdown complete");

    Ok(())
}
