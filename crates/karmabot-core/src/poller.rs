// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Long-poll loop.
//!
//! Each cycle asks the [`StoreProvider`] for a store, fetches one batch at
//! the current offset and hands it to the [`Dispatcher`]. The offset only
//! advances after a successful fetch, so a failed fetch is retried from the
//! same position on the next cycle.

use std::sync::Arc;
use std::time::Duration;

use karmabot_protocol::BotApi;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::error::Error;
use crate::error_sink::record_error;
use crate::persistence::ErrorRecord;
use crate::pool::StoreProvider;

/// Poll loop configuration.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Server-side wait hint passed to `getUpdates`.
    pub long_poll_secs: u64,
    /// Pause after a successful cycle.
    pub idle_pause: Duration,
    /// Pause after a non-network failure.
    pub error_pause: Duration,
    /// Pause after a network failure, including a 409 conflict.
    pub network_pause: Duration,
    /// Pause after the store could not be provisioned.
    pub store_failure_pause: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            long_poll_secs: 25,
            idle_pause: Duration::from_secs(1),
            error_pause: Duration::from_secs(1),
            network_pause: Duration::from_secs(10),
            store_failure_pause: Duration::from_secs(30),
        }
    }
}

impl PollerConfig {
    /// Defaults with the long-poll hint taken from `config`.
    pub fn from_config(config: &Config) -> Self {
        Self {
            long_poll_secs: config.long_poll_secs,
            ..Self::default()
        }
    }
}

/// Result of one poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// Offset to use for the next fetch.
    pub next_offset: i64,
    /// How long to wait before the next cycle.
    pub pause: Duration,
}

/// Long-poll worker.
pub struct Poller {
    api: Arc<dyn BotApi>,
    stores: Arc<dyn StoreProvider>,
    dispatcher: Dispatcher,
    config: PollerConfig,
    shutdown: Arc<Notify>,
}

impl Poller {
    /// Create a poller.
    pub fn new(
        api: Arc<dyn BotApi>,
        stores: Arc<dyn StoreProvider>,
        dispatcher: Dispatcher,
        config: PollerConfig,
    ) -> Self {
        Self {
            api,
            stores,
            dispatcher,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Get a handle to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Run one fetch-and-dispatch cycle starting at `offset`.
    pub async fn run_cycle(&self, offset: i64) -> CycleReport {
        let store = match self.stores.store().await {
            Ok(store) => store,
            Err(e) => {
                error!(error = %e, "Failed to get database store");
                return CycleReport {
                    next_offset: offset,
                    pause: self.config.store_failure_pause,
                };
            }
        };

        let updates = match self.api.get_updates(offset, self.config.long_poll_secs).await {
            Ok(updates) => updates,
            Err(e) => {
                let e = Error::from(e);
                if matches!(&e, Error::Api(api) if api.is_conflict()) {
                    error!(offset, "Another instance is polling with this token");
                }

                record_error(
                    store.as_ref(),
                    ErrorRecord {
                        error: format!("failed to get updates: {}", e),
                        ..Default::default()
                    },
                )
                .await;

                let pause = if e.is_network() {
                    warn!(
                        pause_secs = self.config.network_pause.as_secs(),
                        "Network error, backing off"
                    );
                    self.config.network_pause
                } else {
                    self.config.error_pause
                };
                return CycleReport {
                    next_offset: offset,
                    pause,
                };
            }
        };

        if !updates.is_empty() {
            debug!(offset, count = updates.len(), "Fetched updates");
        }

        let next_offset = self
            .dispatcher
            .process_batch(store.as_ref(), &updates, offset)
            .await;

        CycleReport {
            next_offset,
            pause: self.config.idle_pause,
        }
    }

    /// Poll until shutdown is signalled. Returns the last offset.
    pub async fn run(self, initial_offset: i64) -> i64 {
        info!(
            initial_offset,
            long_poll_secs = self.config.long_poll_secs,
            "Poller started"
        );

        let mut offset = initial_offset;
        loop {
            let report = tokio::select! {
                biased;
                _ = self.shutdown.notified() => break,
                report = self.run_cycle(offset) => report,
            };
            offset = report.next_offset;

            tokio::select! {
                biased;
                _ = self.shutdown.notified() => break,
                _ = tokio::time::sleep(report.pause) => {}
            }
        }

        info!(offset, "Poller shutting down");
        offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::conversation::ConversationStore;
    use crate::error::Result;
    use crate::persistence::{Persistence, SqlitePersistence};
    use crate::pool::StaticStore;
    use crate::test_support::{RecordingApi, group_message, memory_store, update, user};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use karmabot_protocol::ApiError;

    struct Fixture {
        api: Arc<RecordingApi>,
        store: Arc<SqlitePersistence>,
        poller: Poller,
    }

    fn dispatcher(api: Arc<RecordingApi>) -> Dispatcher {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 7, 1, 12, 0, 0).unwrap(),
        ));
        let conversations = Arc::new(ConversationStore::new(clock.clone()));
        Dispatcher::new(api, conversations, clock, "KarmaBot")
    }

    async fn fixture() -> Fixture {
        let api = Arc::new(RecordingApi::new());
        let store = Arc::new(memory_store().await);
        let poller = Poller::new(
            api.clone(),
            Arc::new(StaticStore::new(store.clone())),
            dispatcher(api.clone()),
            PollerConfig::default(),
        );
        Fixture { api, store, poller }
    }

    async fn error_messages(store: &SqlitePersistence) -> Vec<String> {
        sqlx::query_scalar("SELECT error FROM bot_errors ORDER BY id")
            .fetch_all(store.pool())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_successful_cycle_advances_offset() {
        let fx = fixture().await;
        let ana = user(1, "Ana");
        fx.api.push_updates(vec![
            update(40, group_message(1, &ana, "hi")),
            update(41, group_message(2, &ana, "/lovedusers")),
        ]);

        let report = fx.poller.run_cycle(40).await;

        assert_eq!(
            report,
            CycleReport {
                next_offset: 42,
                pause: Duration::from_secs(1),
            }
        );
        assert_eq!(fx.api.requested_offsets(), vec![40]);
        assert_eq!(fx.api.texts(), vec!["No users found for this group yet."]);
    }

    #[tokio::test]
    async fn test_network_failure_keeps_offset_and_backs_off() {
        let fx = fixture().await;
        fx.api.push_error(ApiError::Status { status: 502 });

        let report = fx.poller.run_cycle(7).await;

        assert_eq!(report.next_offset, 7);
        assert_eq!(report.pause, Duration::from_secs(10));
        let errors = error_messages(&fx.store).await;
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("failed to get updates: "));
    }

    #[tokio::test]
    async fn test_conflict_is_network_class() {
        let fx = fixture().await;
        fx.api.push_error(ApiError::Conflict);

        let report = fx.poller.run_cycle(3).await;

        assert_eq!(report.next_offset, 3);
        assert_eq!(report.pause, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_decode_failure_uses_short_pause() {
        let fx = fixture().await;
        let decode = serde_json::from_str::<i32>("{").unwrap_err();
        fx.api.push_error(ApiError::Decode(decode));

        let report = fx.poller.run_cycle(3).await;

        assert_eq!(report.next_offset, 3);
        assert_eq!(report.pause, Duration::from_secs(1));
    }

    struct UnavailableStore;

    #[async_trait]
    impl StoreProvider for UnavailableStore {
        async fn store(&self) -> Result<Arc<dyn Persistence>> {
            Err(Error::Other("database unreachable".into()))
        }
    }

    #[tokio::test]
    async fn test_store_failure_skips_fetch() {
        let api = Arc::new(RecordingApi::new());
        let poller = Poller::new(
            api.clone(),
            Arc::new(UnavailableStore),
            dispatcher(api.clone()),
            PollerConfig::default(),
        );

        let report = poller.run_cycle(11).await;

        assert_eq!(report.next_offset, 11);
        assert_eq!(report.pause, Duration::from_secs(30));
        assert!(api.requested_offsets().is_empty());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let api = Arc::new(RecordingApi::new());
        api.push_updates(vec![update(1, group_message(1, &user(1, "Ana"), "hi"))]);
        let config = PollerConfig {
            idle_pause: Duration::from_millis(10),
            ..PollerConfig::default()
        };
        let store = Arc::new(memory_store().await);
        let poller = Poller::new(
            api.clone(),
            Arc::new(StaticStore::new(store)),
            dispatcher(api.clone()),
            config,
        );
        let shutdown = poller.shutdown_handle();

        let handle = tokio::spawn(poller.run(1));
        tokio::time::timeout(Duration::from_secs(5), async {
            while api.requested_offsets().len() < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        shutdown.notify_one();

        let offset = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(offset, 2);
        assert_eq!(&api.requested_offsets()[..3], &[1, 2, 2]);
    }
}
