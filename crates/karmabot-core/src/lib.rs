// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Karmabot Core - Update Ingestion & Processing Engine
//!
//! The engine long-polls the Bot API, routes each update to exactly one
//! handler and keeps per-group karma and event state in a relational store.
//!
//! ```text
//! Poller ──► Dispatcher ──┬──► commands (leaderboards, events, /start)
//!                         ├──► BirthdayFlow ──► ConversationStore
//!                         └──► KarmaPipeline ──► KarmaValidator ──► ledger
//!                                      │
//!                          StoreProvider (PoolManager | StaticStore)
//! ```
//!
//! ## Modules
//!
//! - [`poller`]: long-poll loop with offset tracking and back-off
//! - [`dispatcher`]: update classification and routing
//! - [`karma`]: reaction parsing, eligibility checks, the karma ledger
//! - [`conversation`]: TTL-bound per-user conversation state
//! - [`pool`]: per-database connection pools with health probes
//! - [`persistence`]: storage trait with PostgreSQL and SQLite backends
//! - [`scheduler`]: daily birthday announcements

#![deny(missing_docs)]

/// Birthday registration flow and announcement texts.
pub mod birthday;

/// Injectable time source.
pub mod clock;

/// Slash command recognition.
pub mod commands;

/// Configuration loaded from environment variables.
pub mod config;

/// Per-user conversation state with expiry.
pub mod conversation;

/// Update routing.
pub mod dispatcher;

/// Error types.
pub mod error;

/// Best-effort error recording.
pub mod error_sink;

/// Group event commands.
pub mod events;

/// Karma reactions, validation and ledger.
pub mod karma;

/// Leaderboard commands.
pub mod leaderboard;

/// Embedded schema migrations.
pub mod migrations;

/// Storage trait and backends.
pub mod persistence;

/// Long-poll loop.
pub mod poller;

/// Connection pool manager and store providers.
pub mod pool;

/// Birthday announcement scheduler.
pub mod scheduler;

#[cfg(test)]
mod test_support;

pub use clock::{Clock, SystemClock};
pub use config::{Config, ConfigError, DatabaseConfig};
pub use conversation::ConversationStore;
pub use dispatcher::Dispatcher;
pub use error::{Error, Result};
pub use persistence::Persistence;
pub use poller::{Poller, PollerConfig};
pub use pool::{PoolConfig, PoolManager, PooledStore, StaticStore, StoreProvider};
pub use scheduler::{BirthdayScheduler, SchedulerConfig};
