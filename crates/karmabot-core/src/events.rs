// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Group event commands: `/createevent`, `/events` and `/deleteevent`.
//!
//! Event dates are written as `DD/MM/YYYY HH:MM` and interpreted as UTC.
//! Recurring events use a `weekly`, `monthly` or `annually` keyword followed
//! by a free-form anchor such as `MON 09:00`.

use std::fmt::Write as _;

use chrono::{DateTime, NaiveDateTime, Utc};
use karmabot_protocol::{BotApi, SendMessageRequest};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::error::{Error, Result};
use crate::persistence::{GroupEventRecord, NewGroupEvent, Persistence};

const DATE_FORMAT: &str = "%d/%m/%Y %H:%M";

const RECURRENCE_TYPES: &[&str] = &["weekly", "monthly", "annually"];

const USAGE_EXAMPLES: &str = "Ejemplos:\n\
    • `/createevent Reunión | Discutir proyecto | 15/01/2025 14:00`\n\
    • `/createevent Sync | Semanal | weekly MON 09:00`";

/// Why `/createevent` arguments were refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EventParseError {
    /// Fewer than three `|`-separated parts.
    #[error("formato: /createevent título | descripción | fecha")]
    Format,
    /// The date part is neither a recurrence nor `DD/MM/YYYY HH:MM`.
    #[error("formato de fecha inválido, use DD/MM/YYYY HH:MM")]
    Date,
}

/// When an event happens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventSchedule {
    /// A single point in time.
    Once(DateTime<Utc>),
    /// A repeating event.
    Recurring {
        /// `weekly`, `monthly` or `annually`.
        kind: String,
        /// Free-form anchor, e.g. `MON 09:00`.
        anchor: String,
    },
}

impl EventSchedule {
    fn describe(&self) -> String {
        match self {
            Self::Once(at) => at.format(DATE_FORMAT).to_string(),
            Self::Recurring { kind, anchor } => format!("{} {}", kind, anchor),
        }
    }
}

/// Parsed `/createevent` arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDraft {
    /// Title.
    pub title: String,
    /// Description, possibly empty.
    pub description: String,
    /// When it happens.
    pub schedule: EventSchedule,
}

impl EventDraft {
    /// Row to insert for this event.
    pub fn into_new_event(self, group_id: i64, user_id: i64) -> NewGroupEvent {
        let (event_date, recurrence_type, recurrence_day) = match self.schedule {
            EventSchedule::Once(at) => (Some(at), None, None),
            EventSchedule::Recurring { kind, anchor } => (None, Some(kind), Some(anchor)),
        };
        NewGroupEvent {
            group_id,
            user_id,
            title: self.title,
            description: self.description,
            event_date,
            recurrence_type,
            recurrence_day,
        }
    }
}

/// Parse `title | description | when`.
///
/// Parts beyond the third are ignored.
pub fn parse_event_command(args: &str) -> std::result::Result<EventDraft, EventParseError> {
    let mut parts = args.split('|').map(str::trim);
    let (Some(title), Some(description), Some(when)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(EventParseError::Format);
    };

    let mut tokens = when.split_whitespace();
    let schedule = match tokens.next().map(str::to_lowercase) {
        Some(kind) if RECURRENCE_TYPES.contains(&kind.as_str()) => EventSchedule::Recurring {
            kind,
            anchor: tokens.collect::<Vec<_>>().join(" "),
        },
        _ => {
            let at = NaiveDateTime::parse_from_str(when, DATE_FORMAT)
                .map_err(|_| EventParseError::Date)?;
            EventSchedule::Once(at.and_utc())
        }
    };

    Ok(EventDraft {
        title: title.to_string(),
        description: description.to_string(),
        schedule,
    })
}

/// Handle `/createevent`.
///
/// Bad arguments are answered with usage help. A store failure is answered
/// in chat and returned.
#[instrument(skip(api, store, args))]
pub async fn create_event(
    api: &dyn BotApi,
    store: &dyn Persistence,
    chat_id: i64,
    user_id: i64,
    args: &str,
) -> Result<()> {
    let draft = match parse_event_command(args) {
        Ok(draft) => draft,
        Err(e) => {
            let help = format!("❌ {}\n\n{}", e, USAGE_EXAMPLES);
            return send(api, chat_id, help).await;
        }
    };

    let title = draft.title.clone();
    let description = draft.description.clone();
    let when = draft.schedule.describe();

    let id = match store
        .create_event(&draft.into_new_event(chat_id, user_id))
        .await
    {
        Ok(id) => id,
        Err(e) => {
            notify_failure(api, chat_id, format!("❌ Error al crear evento: {}", e)).await;
            return Err(e);
        }
    };
    info!(event_id = id, "Event created");

    let text = format!(
        "✅ *Evento creado* (ID: {})\n\n📌 *{}*\n📝 {}\n📅 {}",
        id, title, description, when
    );
    send(api, chat_id, text).await
}

/// Handle `/events`.
#[instrument(skip(api, store))]
pub async fn list_events(api: &dyn BotApi, store: &dyn Persistence, chat_id: i64) -> Result<()> {
    let events = match store.list_group_events(chat_id).await {
        Ok(events) => events,
        Err(e) => {
            notify_failure(api, chat_id, format!("❌ Error al obtener eventos: {}", e)).await;
            return Err(e);
        }
    };

    if events.is_empty() {
        return send(api, chat_id, "📅 No hay eventos registrados en este grupo.").await;
    }

    send(api, chat_id, render_events(&events)).await
}

/// Render the `/events` listing.
pub fn render_events(events: &[GroupEventRecord]) -> String {
    let mut out = String::from("📅 *Eventos del grupo:*\n\n");

    for event in events {
        let emoji = if event.is_birthday() { "🎂" } else { "📌" };
        let when = if event.is_recurring {
            format!(
                "{} {}",
                event.recurrence_type.as_deref().unwrap_or(""),
                event.recurrence_day.as_deref().unwrap_or("")
            )
        } else {
            event
                .event_date
                .map(|at| at.format(DATE_FORMAT).to_string())
                .unwrap_or_default()
        };
        let owner = if event.first_name.is_empty() {
            format!("User {}", event.user_id)
        } else {
            event.first_name.clone()
        };

        let _ = writeln!(out, "{} *{}* (ID: {})", emoji, event.title, event.id);
        if let Some(description) = event.description.as_deref().filter(|d| !d.is_empty()) {
            let _ = writeln!(out, "   📝 {}", description);
        }
        let _ = write!(out, "   📅 {} | 👤 {}\n\n", when, owner);
    }

    out
}

/// Handle `/deleteevent <id>`. Only events of this chat can be deleted.
#[instrument(skip(api, store, args))]
pub async fn delete_event(
    api: &dyn BotApi,
    store: &dyn Persistence,
    chat_id: i64,
    args: &str,
) -> Result<()> {
    let Some(raw_id) = args.split_whitespace().next() else {
        return send(api, chat_id, "❌ Uso: /deleteevent <id>").await;
    };
    let Ok(event_id) = raw_id.parse::<i64>() else {
        return send(api, chat_id, "❌ ID de evento inválido").await;
    };

    let deleted = match store.delete_event(event_id, chat_id).await {
        Ok(deleted) => deleted,
        Err(e) => {
            notify_failure(api, chat_id, format!("❌ Error al eliminar evento: {}", e)).await;
            return Err(e);
        }
    };

    if !deleted {
        let text = format!("❌ Error al eliminar evento: {}", Error::EventNotFound(event_id));
        return send(api, chat_id, text).await;
    }

    info!(event_id, "Event deleted");
    send(api, chat_id, format!("✅ Evento {} eliminado", event_id)).await
}

async fn send(api: &dyn BotApi, chat_id: i64, text: impl Into<String>) -> Result<()> {
    api.send_message(&SendMessageRequest::text(chat_id, text).markdown())
        .await?;
    Ok(())
}

async fn notify_failure(api: &dyn BotApi, chat_id: i64, text: String) {
    if let Err(e) = send(api, chat_id, text).await {
        warn!(chat_id, error = %e, "Failed to send event error notice");
    }
}
