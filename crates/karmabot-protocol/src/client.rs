// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP client for the Telegram Bot API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, error, instrument};

use crate::retry::{RetryError, RetryPolicy, Sleeper, TokioSleeper};
use crate::types::{SendMessageRequest, Update, UpdatesResponse};

/// Errors that can occur while talking to the Bot API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Network-level failure (DNS, connect, reset, timeout).
    ///
    /// The request URL is stripped since it carries the bot token.
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// Non-2xx HTTP status.
    #[error("telegram API returned status {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// Another poller owns the offset (HTTP 409).
    #[error("telegram getUpdates conflict (409): another bot instance is running")]
    Conflict,

    /// The response body could not be decoded.
    #[error("failed to parse response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The API answered `ok: false`.
    #[error("telegram API error: {description}")]
    Api {
        /// Error description from the API.
        description: String,
    },

    /// Every retry attempt failed.
    #[error("telegram API request failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Final attempt error.
        last: Box<ApiError>,
    },

    /// The HTTP client could not be built.
    #[error("client configuration error: {0}")]
    Config(String),
}

impl ApiError {
    /// Whether the fetch should be attempted again.
    ///
    /// Transport failures and non-2xx statuses are retryable; a conflict
    /// means a duplicate deployment and is surfaced immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Status { .. })
    }

    /// Whether the error originates in the network or the remote endpoint,
    /// as opposed to the data the endpoint returned.
    pub fn is_network(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Status { .. } | Self::Conflict => true,
            Self::RetriesExhausted { last, .. } => last.is_network(),
            Self::Decode(_) | Self::Api { .. } | Self::Config(_) => false,
        }
    }

    /// Whether another instance is polling with the same token.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.without_url())
    }
}

impl From<RetryError<ApiError>> for ApiError {
    fn from(err: RetryError<ApiError>) -> Self {
        match err {
            RetryError::Exhausted { attempts, last } => Self::RetriesExhausted {
                attempts,
                last: Box::new(last),
            },
            RetryError::Aborted(e) => e,
        }
    }
}

/// Operations karmabot consumes from the chat platform.
#[async_trait]
pub trait BotApi: Send + Sync {
    /// Long-poll for updates with `update_id >= offset`, waiting up to
    /// `timeout_secs` server-side.
    async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>, ApiError>;

    /// Send a message.
    async fn send_message(&self, request: &SendMessageRequest) -> Result<(), ApiError>;
}

/// Configuration for [`TelegramClient`].
#[derive(Debug, Clone)]
pub struct TelegramClientConfig {
    /// API base URL up to and including the `bot` prefix.
    pub base_url: String,
    /// Bot token.
    pub token: String,
    /// Retry policy for `getUpdates`.
    pub retry: RetryPolicy,
    /// Per-request timeout. Must exceed the long-poll wait.
    pub request_timeout: Duration,
}

impl TelegramClientConfig {
    /// Configuration for the public Bot API endpoint.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            base_url: "https://api.telegram.org/bot".to_string(),
            token: token.into(),
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(35),
        }
    }
}

/// reqwest-backed [`BotApi`].
pub struct TelegramClient {
    http: reqwest::Client,
    config: TelegramClientConfig,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramClient")
            .field("base_url", &self.config.base_url)
            .field("retry", &self.config.retry)
            .finish()
    }
}

impl TelegramClient {
    /// Create a client that sleeps with tokio between retries.
    pub fn new(config: TelegramClientConfig) -> Result<Self, ApiError> {
        Self::with_sleeper(config, Arc::new(TokioSleeper))
    }

    /// Create a client with a custom [`Sleeper`].
    pub fn with_sleeper(
        config: TelegramClientConfig,
        sleeper: Arc<dyn Sleeper>,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("karmabot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::Config(e.to_string()))?;

        Ok(Self {
            http,
            config,
            sleeper,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}{}/{}", self.config.base_url, self.config.token, method)
    }

    /// One `getUpdates` round trip without retries.
    async fn fetch_updates_once(
        &self,
        offset: i64,
        timeout_secs: u64,
    ) -> Result<reqwest::Response, ApiError> {
        let response = self
            .http
            .get(self.method_url("getUpdates"))
            .query(&[("offset", offset.to_string()), ("timeout", timeout_secs.to_string())])
            .send()
            .await?;

        check_status(response)
    }
}

fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status == StatusCode::CONFLICT {
        return Err(ApiError::Conflict);
    }
    if !status.is_success() {
        return Err(ApiError::Status {
            status: status.as_u16(),
        });
    }
    Ok(response)
}

async fn decode_envelope<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
    let body = response.bytes().await?;
    let envelope: UpdatesResponse<T> = serde_json::from_slice(&body)?;

    match (envelope.ok, envelope.result) {
        (true, Some(result)) => Ok(result),
        _ => Err(ApiError::Api {
            description: envelope
                .description
                .unwrap_or_else(|| "response without result".to_string()),
        }),
    }
}

#[async_trait]
impl BotApi for TelegramClient {
    #[instrument(skip(self))]
    async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>, ApiError> {
        let response = self
            .config
            .retry
            .run(self.sleeper.as_ref(), ApiError::is_retryable, |_| {
                self.fetch_updates_once(offset, timeout_secs)
            })
            .await
            .map_err(ApiError::from)?;

        let updates: Vec<Update> = decode_envelope(response).await?;
        debug!(count = updates.len(), "Fetched updates");
        Ok(updates)
    }

    #[instrument(skip(self, request), fields(chat_id = request.chat_id))]
    async fn send_message(&self, request: &SendMessageRequest) -> Result<(), ApiError> {
        let response = self
            .http
            .post(self.method_url("sendMessage"))
            .json(request)
            .send()
            .await?;

        match check_status(response) {
            Ok(_) => Ok(()),
            Err(e) => {
                error!(error = %e, "sendMessage failed");
                Err(e)
            }
        }
    }
}
