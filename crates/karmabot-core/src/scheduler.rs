// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Daily birthday announcements.
//!
//! Wakes up once a minute. Each tick sweeps expired conversations and, the
//! first time it runs during the announcement hour of a given local day,
//! posts a greeting in every group for each member whose birthday is today.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, Timelike};
use karmabot_protocol::{BotApi, SendMessageRequest};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::birthday::announcement_message;
use crate::clock::Clock;
use crate::config::Config;
use crate::conversation::ConversationStore;
use crate::error::Result;
use crate::persistence::Persistence;
use crate::pool::StoreProvider;

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Whether the scheduler runs at all.
    pub enabled: bool,
    /// Local hour (0-23) during which birthdays are announced.
    pub announce_hour: u32,
    /// Time between ticks.
    pub poll_interval: Duration,
    /// Delay before the first tick.
    pub startup_delay: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            announce_hour: 9,
            poll_interval: Duration::from_secs(60),
            startup_delay: Duration::from_secs(10),
        }
    }
}

impl SchedulerConfig {
    /// Defaults with the switch and hour taken from `config`.
    pub fn from_config(config: &Config) -> Self {
        Self {
            enabled: config.scheduler_enabled,
            announce_hour: config.birthday_hour,
            ..Self::default()
        }
    }
}

/// Whether a tick at `now` should announce, given the day of the last
/// announcement.
pub fn should_announce(now: NaiveDateTime, announce_hour: u32, last: Option<NaiveDate>) -> bool {
    now.hour() == announce_hour && last != Some(now.date())
}

/// `DD/MM` key of `date`, matching stored birthday anchors.
pub fn day_month(date: NaiveDate) -> String {
    format!("{:02}/{:02}", date.day(), date.month())
}

/// Post an announcement for every birthday on `day_month`. Returns how many
/// were sent; send failures are logged and skipped.
pub async fn announce_birthdays(
    api: &dyn BotApi,
    store: &dyn Persistence,
    day_month: &str,
    rotation: usize,
) -> Result<usize> {
    let birthdays = store.birthdays_on(day_month).await?;
    let mut sent = 0;

    for (i, birthday) in birthdays.iter().enumerate() {
        let text = announcement_message(&birthday.first_name, &birthday.last_name, rotation + i);
        let request = SendMessageRequest::text(birthday.group_id, text).markdown();

        match api.send_message(&request).await {
            Ok(()) => {
                info!(
                    user_id = birthday.user_id,
                    group_id = birthday.group_id,
                    "Sent birthday announcement"
                );
                sent += 1;
            }
            Err(e) => {
                warn!(
                    group_id = birthday.group_id,
                    error = %e,
                    "Failed to send birthday announcement"
                );
            }
        }
    }

    Ok(sent)
}

/// Background task for birthday announcements and conversation cleanup.
pub struct BirthdayScheduler {
    api: Arc<dyn BotApi>,
    stores: Arc<dyn StoreProvider>,
    conversations: Arc<ConversationStore>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    last_announced: Option<NaiveDate>,
    shutdown: Arc<Notify>,
}

impl BirthdayScheduler {
    /// Create a scheduler.
    pub fn new(
        api: Arc<dyn BotApi>,
        stores: Arc<dyn StoreProvider>,
        conversations: Arc<ConversationStore>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            api,
            stores,
            conversations,
            clock,
            config,
            last_announced: None,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Get a handle to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Run one tick at local time `now`. Returns the number of
    /// announcements sent.
    pub async fn tick_at(&mut self, now: NaiveDateTime) -> usize {
        let purged = self.conversations.purge_expired();
        if purged > 0 {
            debug!(purged, "Purged expired conversations");
        }

        if !should_announce(now, self.config.announce_hour, self.last_announced) {
            return 0;
        }
        self.last_announced = Some(now.date());

        let store = match self.stores.store().await {
            Ok(store) => store,
            Err(e) => {
                error!(error = %e, "Scheduler failed to get database store");
                return 0;
            }
        };

        let today = day_month(now.date());
        match announce_birthdays(
            self.api.as_ref(),
            store.as_ref(),
            &today,
            now.second() as usize,
        )
        .await
        {
            Ok(sent) => {
                info!(day_month = %today, sent, "Birthday check complete");
                sent
            }
            Err(e) => {
                error!(error = %e, "Failed to load today's birthdays");
                0
            }
        }
    }

    /// Run until shutdown is signalled.
    pub async fn run(mut self) {
        if !self.config.enabled {
            info!("Birthday scheduler disabled");
            return;
        }

        info!(
            announce_hour = self.config.announce_hour,
            poll_interval_secs = self.config.poll_interval.as_secs(),
            "Birthday scheduler started"
        );

        let shutdown = self.shutdown.clone();
        let mut pause = self.config.startup_delay;
        loop {
            tokio::select! {
                biased;
                _ = shutdown.notified() => {
                    info!("Birthday scheduler shutting down");
                    break;
                }
                _ = tokio::time::sleep(pause) => {
                    let now = self.clock.now().with_timezone(&Local).naive_local();
                    self.tick_at(now).await;
                    pause = self.config.poll_interval;
                }
            }
        }
    }
}
