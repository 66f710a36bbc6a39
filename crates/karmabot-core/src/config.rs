// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::fmt;

/// Log filter used when `RUST_LOG` is unset. Covers both workspace crates
/// so retry and send failures in the protocol layer are visible.
pub const DEFAULT_LOG_FILTER: &str = "karmabot_core=info,karmabot_protocol=info";

/// Where karma, events and errors are stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseConfig {
    /// A PostgreSQL server; the logical database is provisioned on first use.
    Postgres {
        /// Connection URL of the server's maintenance database.
        server_url: String,
        /// Logical database holding the bot's tables.
        db_name: String,
    },
    /// A single SQLite database.
    Sqlite {
        /// `sqlite:` connection URL.
        url: String,
    },
}

/// Karmabot configuration
#[derive(Clone)]
pub struct Config {
    /// Bot API token
    pub token: String,
    /// Storage backend
    pub database: DatabaseConfig,
    /// Bot API base URL, up to and including the `bot` prefix
    pub telegram_base_url: String,
    /// Username commands may be addressed to (`/cmd@username`)
    pub bot_username: String,
    /// Server-side wait hint for `getUpdates`
    pub long_poll_secs: u64,
    /// Maximum pooled connections per database
    pub db_max_connections: u32,
    /// Local hour at which birthdays are announced
    pub birthday_hour: u32,
    /// Whether the birthday scheduler runs
    pub scheduler_enabled: bool,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("token", &"<redacted>")
            .field("database", &self.database)
            .field("telegram_base_url", &self.telegram_base_url)
            .field("bot_username", &self.bot_username)
            .field("long_poll_secs", &self.long_poll_secs)
            .field("db_max_connections", &self.db_max_connections)
            .field("birthday_hour", &self.birthday_hour)
            .field("scheduler_enabled", &self.scheduler_enabled)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `KARMABOT_TOKEN`: Bot API token
    /// - `KARMABOT_DATABASE_URL`: PostgreSQL server URL or `sqlite:` URL
    /// - `KARMABOT_DB_NAME`: logical database name (PostgreSQL only)
    ///
    /// Optional (with defaults):
    /// - `KARMABOT_TELEGRAM_BASE_URL` (default: `https://api.telegram.org/bot`)
    /// - `KARMABOT_BOT_USERNAME` (default: `WillibertoBot`)
    /// - `KARMABOT_LONG_POLL_SECS` (default: 25)
    /// - `KARMABOT_DB_MAX_CONNECTIONS` (default: 10)
    /// - `KARMABOT_BIRTHDAY_HOUR` (default: 9)
    /// - `KARMABOT_SCHEDULER_ENABLED` (default: true)
    pub fn from_env() -> Result<Self, ConfigError> {
        let token = required("KARMABOT_TOKEN")?;

        let database_url = required("KARMABOT_DATABASE_URL")?;
        let database = if database_url.starts_with("sqlite:") {
            DatabaseConfig::Sqlite { url: database_url }
        } else if database_url.starts_with("postgres://")
            || database_url.starts_with("postgresql://")
        {
            DatabaseConfig::Postgres {
                server_url: database_url,
                db_name: required("KARMABOT_DB_NAME")?,
            }
        } else {
            return Err(ConfigError::Invalid(
                "KARMABOT_DATABASE_URL",
                "must start with postgres://, postgresql:// or sqlite:",
            ));
        };

        let telegram_base_url = std::env::var("KARMABOT_TELEGRAM_BASE_URL")
            .unwrap_or_else(|_| "https://api.telegram.org/bot".to_string());

        let bot_username = std::env::var("KARMABOT_BOT_USERNAME")
            .map(|v| v.trim_start_matches('@').to_string())
            .unwrap_or_else(|_| "WillibertoBot".to_string());

        let long_poll_secs: u64 = std::env::var("KARMABOT_LONG_POLL_SECS")
            .unwrap_or_else(|_| "25".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("KARMABOT_LONG_POLL_SECS", "must be a positive integer")
            })?;

        let db_max_connections: u32 = std::env::var("KARMABOT_DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .ok()
            .filter(|n| *n > 0)
            .ok_or(ConfigError::Invalid(
                "KARMABOT_DB_MAX_CONNECTIONS",
                "must be a positive integer",
            ))?;

        let birthday_hour: u32 = std::env::var("KARMABOT_BIRTHDAY_HOUR")
            .unwrap_or_else(|_| "9".to_string())
            .parse()
            .ok()
            .filter(|h| *h < 24)
            .ok_or(ConfigError::Invalid(
                "KARMABOT_BIRTHDAY_HOUR",
                "must be an hour between 0 and 23",
            ))?;

        let scheduler_enabled = std::env::var("KARMABOT_SCHEDULER_ENABLED")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(true);

        Ok(Self {
            token,
            database,
            telegram_base_url,
            bot_username,
            long_poll_secs,
            db_max_connections,
            birthday_hour,
            scheduler_enabled,
        })
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::Missing(key)),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that modify environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const OPTIONAL_VARS: &[&str] = &[
        "KARMABOT_DB_NAME",
        "KARMABOT_TELEGRAM_BASE_URL",
        "KARMABOT_BOT_USERNAME",
        "KARMABOT_LONG_POLL_SECS",
        "KARMABOT_DB_MAX_CONNECTIONS",
        "KARMABOT_BIRTHDAY_HOUR",
        "KARMABOT_SCHEDULER_ENABLED",
    ];

    /// Helper to set env vars for a test and restore them after
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new() -> Self {
            Self { vars: Vec::new() }
        }

        /// Guard with every optional variable cleared.
        fn clean() -> Self {
            let mut guard = Self::new();
            for key in OPTIONAL_VARS {
                guard.remove(key);
            }
            guard
        }

        fn set(&mut self, key: &str, value: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::set_var(key, value) };
        }

        fn remove(&mut self, key: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::remove_var(key) };
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.vars.drain(..).rev() {
                // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
                unsafe {
                    match value {
                        Some(v) => env::set_var(&key, v),
                        None => env::remove_var(&key),
                    }
                }
            }
        }
    }

    #[test]
    fn test_config_sqlite_with_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::clean();

        guard.set("KARMABOT_TOKEN", "123:abc");
        guard.set("KARMABOT_DATABASE_URL", "sqlite:karma.db?mode=rwc");

        let config = Config::from_env().unwrap();

        assert_eq!(config.token, "123:abc");
        assert_eq!(
            config.database,
            DatabaseConfig::Sqlite {
                url: "sqlite:karma.db?mode=rwc".to_string()
            }
        );
        assert_eq!(config.telegram_base_url, "https://api.telegram.org/bot");
        assert_eq!(config.bot_username, "WillibertoBot");
        assert_eq!(config.long_poll_secs, 25);
        assert_eq!(config.db_max_connections, 10);
        assert_eq!(config.birthday_hour, 9);
        assert!(config.scheduler_enabled);
    }

    #[test]
    fn test_config_postgres_requires_db_name() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::clean();

        guard.set("KARMABOT_TOKEN", "123:abc");
        guard.set("KARMABOT_DATABASE_URL", "postgres://bot:pw@db:5432/postgres");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Missing("KARMABOT_DB_NAME")));

        guard.set("KARMABOT_DB_NAME", "karma_prod");
        let config = Config::from_env().unwrap();
        assert_eq!(
            config.database,
            DatabaseConfig::Postgres {
                server_url: "postgres://bot:pw@db:5432/postgres".to_string(),
                db_name: "karma_prod".to_string(),
            }
        );
    }

    #[test]
    fn test_config_all_custom() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::clean();

        guard.set("KARMABOT_TOKEN", "123:abc");
        guard.set("KARMABOT_DATABASE_URL", "postgresql://localhost/postgres");
        guard.set("KARMABOT_DB_NAME", "karma");
        guard.set("KARMABOT_TELEGRAM_BASE_URL", "http://localhost:8081/bot");
        guard.set("KARMABOT_BOT_USERNAME", "@OtherBot");
        guard.set("KARMABOT_LONG_POLL_SECS", "50");
        guard.set("KARMABOT_DB_MAX_CONNECTIONS", "4");
        guard.set("KARMABOT_BIRTHDAY_HOUR", "7");
        guard.set("KARMABOT_SCHEDULER_ENABLED", "false");

        let config = Config::from_env().unwrap();

        assert_eq!(config.telegram_base_url, "http://localhost:8081/bot");
        assert_eq!(config.bot_username, "OtherBot");
        assert_eq!(config.long_poll_secs, 50);
        assert_eq!(config.db_max_connections, 4);
        assert_eq!(config.birthday_hour, 7);
        assert!(!config.scheduler_enabled);
    }

    #[test]
    fn test_config_missing_token() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::clean();

        guard.remove("KARMABOT_TOKEN");
        guard.set("KARMABOT_DATABASE_URL", "sqlite::memory:");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Missing("KARMABOT_TOKEN")));
        assert!(err.to_string().contains("KARMABOT_TOKEN"));
    }

    #[test]
    fn test_config_blank_token_counts_as_missing() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::clean();

        guard.set("KARMABOT_TOKEN", "   ");
        guard.set("KARMABOT_DATABASE_URL", "sqlite::memory:");

        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Missing("KARMABOT_TOKEN"))
        ));
    }

    #[test]
    fn test_config_unknown_database_scheme() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::clean();

        guard.set("KARMABOT_TOKEN", "123:abc");
        guard.set("KARMABOT_DATABASE_URL", "mysql://localhost/karma");

        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Invalid("KARMABOT_DATABASE_URL", _))
        ));
    }

    #[test]
    fn test_config_invalid_numbers() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::clean();

        guard.set("KARMABOT_TOKEN", "123:abc");
        guard.set("KARMABOT_DATABASE_URL", "sqlite::memory:");

        guard.set("KARMABOT_LONG_POLL_SECS", "soon");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Invalid("KARMABOT_LONG_POLL_SECS", _))
        ));
        guard.remove("KARMABOT_LONG_POLL_SECS");

        guard.set("KARMABOT_DB_MAX_CONNECTIONS", "0");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Invalid("KARMABOT_DB_MAX_CONNECTIONS", _))
        ));
        guard.remove("KARMABOT_DB_MAX_CONNECTIONS");

        guard.set("KARMABOT_BIRTHDAY_HOUR", "24");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Invalid("KARMABOT_BIRTHDAY_HOUR", _))
        ));
    }

    #[test]
    fn test_config_debug_redacts_token() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::clean();

        guard.set("KARMABOT_TOKEN", "123:super-secret");
        guard.set("KARMABOT_DATABASE_URL", "sqlite::memory:");

        let config = Config::from_env().unwrap();
        let debug_str = format!("{:?}", config);

        assert!(debug_str.contains("Config"));
        assert!(debug_str.contains("<redacted>"));
        assert!(!debug_str.contains("super-secret"));
    }

    #[test]
    fn test_config_error_display() {
        let missing = ConfigError::Missing("KARMABOT_TOKEN");
        assert_eq!(
            missing.to_string(),
            "missing required environment variable: KARMABOT_TOKEN"
        );

        let invalid = ConfigError::Invalid("KARMABOT_BIRTHDAY_HOUR", "must be an hour between 0 and 23");
        assert_eq!(
            invalid.to_string(),
            "invalid value for KARMABOT_BIRTHDAY_HOUR: must be an hour between 0 and 23"
        );
    }

    #[test]
    fn test_default_log_filter_covers_protocol_crate() {
        let directives: Vec<&str> = DEFAULT_LOG_FILTER.split(',').collect();
        assert!(directives.contains(&"karmabot_core=info"));
        assert!(directives.contains(&"karmabot_protocol=info"));
    }
}
