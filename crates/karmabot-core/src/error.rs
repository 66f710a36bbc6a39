// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for karmabot-core.

use karmabot_protocol::ApiError;
use thiserror::Error;

/// Errors raised while processing updates or managing stores.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failed.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Chat platform request failed.
    #[error("Telegram error: {0}")]
    Api(#[from] ApiError),

    /// A logical database name cannot be used as an identifier.
    #[error("Invalid database name: {0}")]
    InvalidDatabaseName(String),

    /// No event with this id exists in the group.
    #[error("event not found")]
    EventNotFound(i64),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the error comes from the network or the remote endpoint.
    ///
    /// The poll loop waits longer after these.
    pub fn is_network(&self) -> bool {
        match self {
            Self::Api(e) => e.is_network(),
            _ => false,
        }
    }
}

/// Result type using karmabot-core Error.
pub type Result<T> = std::result::Result<T, Error>;
