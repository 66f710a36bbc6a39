// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Guided birthday registration.
//!
//! A group member presses the deep-link button sent by `/add` or
//! `/birthday`, which opens a private chat with `/start birthday_<group_id>`.
//! From there the flow walks the [`ConversationStore`] through
//! `AwaitingDate -> AwaitingConfirm -> done`.

use std::sync::Arc;

use karmabot_protocol::{BotApi, InlineKeyboardMarkup, SendMessageRequest, User};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::conversation::{ConversationStep, ConversationStore};
use crate::error::{Error, Result};
use crate::persistence::{MemberProfile, Persistence};

const START_PARAM_PREFIX: &str = "birthday_";

const ASK_DATE: &str = "📅 *¿Cuál es tu fecha de cumpleaños?*\n\n\
    Escribe la fecha en formato DD/MM (ejemplo: `25/12`)";

const INVALID_DATE: &str = "❌ Formato inválido. Por favor escribe tu fecha de cumpleaños en formato DD/MM\n\n\
    Ejemplo: `25/12` para el 25 de diciembre";

const CONFIRM_HINT: &str = "Por favor escribe *sí* para confirmar o *no* para corregir la fecha.";

const BUTTON_TEXT: &str = "🎂 Registrar mi cumpleaños";

const BUTTON_MESSAGE: &str = "🎉 *¡Hola!* Presiona el botón para registrar tu cumpleaños y recibir una felicitación especial cuando llegue tu día.";

const AFFIRMATIVE: &[&str] = &["sí", "si", "s", "yes", "y", "confirmar"];
const NEGATIVE: &[&str] = &["no", "n", "corregir"];

const MONTHS: [&str; 12] = [
    "enero",
    "febrero",
    "marzo",
    "abril",
    "mayo",
    "junio",
    "julio",
    "agosto",
    "septiembre",
    "octubre",
    "noviembre",
    "diciembre",
];

/// Why a `DD/MM` string was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BirthdayDateError {
    /// Not two `/`-separated parts.
    #[error("invalid date format, use DD/MM")]
    Format,
    /// Day is not a number in 1-31.
    #[error("invalid day")]
    Day,
    /// Month is not a number in 1-12.
    #[error("invalid month")]
    Month,
}

/// A day of the year without a year.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BirthdayDate {
    /// 1-31.
    pub day: u32,
    /// 1-12.
    pub month: u32,
}

impl BirthdayDate {
    /// Recurrence anchor stored in `group_events`, e.g. `05/03`.
    pub fn day_month(&self) -> String {
        format!("{:02}/{:02}", self.day, self.month)
    }

    /// Spanish rendering, e.g. `25 de diciembre`.
    pub fn spoken(&self) -> String {
        format!("{} de {}", self.day, month_name(self.month))
    }
}

/// Parse `DD/MM`. Day 1-31 and month 1-12; day/month combinations are not
/// cross-checked.
pub fn parse_birthday_date(text: &str) -> std::result::Result<BirthdayDate, BirthdayDateError> {
    let (day, month) = text
        .trim()
        .split_once('/')
        .ok_or(BirthdayDateError::Format)?;
    if month.contains('/') {
        return Err(BirthdayDateError::Format);
    }

    let day: u32 = day
        .parse()
        .ok()
        .filter(|d| (1..=31).contains(d))
        .ok_or(BirthdayDateError::Day)?;
    let month: u32 = month
        .parse()
        .ok()
        .filter(|m| (1..=12).contains(m))
        .ok_or(BirthdayDateError::Month)?;

    Ok(BirthdayDate { day, month })
}

/// Spanish month name for `1..=12`, empty otherwise.
pub fn month_name(month: u32) -> &'static str {
    month
        .checked_sub(1)
        .and_then(|i| MONTHS.get(i as usize))
        .copied()
        .unwrap_or("")
}

/// Group id carried by a `birthday_<group_id>` start parameter.
pub fn parse_start_parameter(param: &str) -> Option<i64> {
    if param.len() < START_PARAM_PREFIX.len() + 1 {
        return None;
    }
    param.strip_prefix(START_PARAM_PREFIX)?.parse().ok()
}

/// Link that opens a private chat with the bot and sends
/// `/start birthday_<group_id>`.
pub fn birthday_deep_link(bot_username: &str, group_id: i64) -> String {
    format!("https://t.me/{}?start={}{}", bot_username, START_PARAM_PREFIX, group_id)
}

/// Group announcement for a member's birthday.
///
/// `rotation` picks one of the three templates (taken modulo 3).
pub fn announcement_message(first_name: &str, last_name: &str, rotation: usize) -> String {
    let full_name = format!("{} {}", first_name, last_name);
    let full_name = match full_name.trim() {
        "" => "Alguien especial",
        name => name,
    };

    match rotation % 3 {
        0 => format!(
            "🎉🎂 *¡Feliz cumpleaños, {}!* 🎂🎉\n\n¡Que este día esté lleno de alegría y momentos especiales! 🥳",
            full_name
        ),
        1 => format!(
            "🌟 *¡El día ha llegado!* 🎈\n\n*{}* está celebrando su cumpleaños hoy. ¡Muchas felicidades! 🎁",
            full_name
        ),
        _ => format!(
            "🎊 *¡Hoy es el día especial de {}!* 🎂\n\n¡Que todos tus deseos se hagan realidad! ✨",
            full_name
        ),
    }
}

/// Drives the birthday registration conversation.
pub struct BirthdayFlow {
    api: Arc<dyn BotApi>,
    conversations: Arc<ConversationStore>,
    bot_username: String,
}

impl BirthdayFlow {
    /// Create a flow that links buttons to `bot_username`.
    pub fn new(
        api: Arc<dyn BotApi>,
        conversations: Arc<ConversationStore>,
        bot_username: impl Into<String>,
    ) -> Self {
        Self {
            api,
            conversations,
            bot_username: bot_username.into(),
        }
    }

    /// Post the registration button in a group.
    pub async fn send_button(&self, chat_id: i64) -> Result<()> {
        let link = birthday_deep_link(&self.bot_username, chat_id);
        let request = SendMessageRequest::text(chat_id, BUTTON_MESSAGE)
            .markdown()
            .keyboard(InlineKeyboardMarkup::single_url(BUTTON_TEXT, link));
        self.api.send_message(&request).await?;
        Ok(())
    }

    /// Handle `/start <param>` in a private chat.
    ///
    /// Returns false when the parameter is not a birthday deep link.
    #[instrument(skip_all, fields(user_id = user.id))]
    pub async fn start(&self, chat_id: i64, user: &User, args: &str) -> Result<bool> {
        let Some(group_id) = args.split_whitespace().next().and_then(parse_start_parameter) else {
            return Ok(false);
        };

        self.conversations
            .start(user.id, group_id, ConversationStep::AwaitingDate);
        info!(group_id, "Birthday registration started");

        let prompt = format!("🎂 *¡Hola!* Vamos a registrar tu cumpleaños.\n\n{}", ASK_DATE);
        self.reply(chat_id, prompt).await?;
        Ok(true)
    }

    /// Feed a private message into the user's active conversation.
    ///
    /// Returns false when the user has no active conversation.
    #[instrument(skip_all, fields(user_id = user.id))]
    pub async fn handle_message(
        &self,
        store: &dyn Persistence,
        chat_id: i64,
        user: &User,
        text: &str,
    ) -> Result<bool> {
        let Some(conversation) = self.conversations.get(user.id) else {
            return Ok(false);
        };

        match conversation.step {
            ConversationStep::AwaitingDate => {
                let date = match parse_birthday_date(text) {
                    Ok(date) => date,
                    Err(_) => {
                        self.conversations.touch(user.id);
                        self.reply(chat_id, INVALID_DATE).await?;
                        return Ok(true);
                    }
                };

                let stored = self.conversations.transition(
                    user.id,
                    ConversationStep::AwaitingConfirm,
                    [("day", date.day.to_string()), ("month", date.month.to_string())],
                );
                if !stored {
                    debug!("Conversation expired before the date was stored");
                    return Ok(false);
                }

                let prompt = format!(
                    "📆 Tu cumpleaños es el *{}*\n\n¿Es correcto?\n\n\
                     Escribe *sí* para confirmar o *no* para corregir",
                    date.spoken()
                );
                self.reply(chat_id, prompt).await?;
            }
            ConversationStep::AwaitingConfirm => {
                let answer = text.trim().to_lowercase();

                if NEGATIVE.contains(&answer.as_str()) {
                    if !self
                        .conversations
                        .set_step(user.id, ConversationStep::AwaitingDate)
                    {
                        return Ok(false);
                    }
                    self.reply(chat_id, ASK_DATE).await?;
                } else if AFFIRMATIVE.contains(&answer.as_str()) {
                    let date = stored_date(&conversation)?;
                    self.save(store, chat_id, user, conversation.group_id, date)
                        .await?;
                } else {
                    self.conversations.touch(user.id);
                    self.reply(chat_id, CONFIRM_HINT).await?;
                }
            }
        }

        Ok(true)
    }

    async fn save(
        &self,
        store: &dyn Persistence,
        chat_id: i64,
        user: &User,
        group_id: i64,
        date: BirthdayDate,
    ) -> Result<()> {
        if let Err(e) = store
            .ensure_member(&MemberProfile::from(user), group_id)
            .await
        {
            warn!(group_id, error = %e, "Failed to ensure member ranking row");
        }

        let saved = store
            .upsert_birthday(user.id, group_id, &date.day_month())
            .await;
        self.conversations.end(user.id);

        if let Err(e) = saved {
            let notice = format!("❌ Error al registrar cumpleaños: {}", e);
            if let Err(send_err) = self.reply(chat_id, notice).await {
                warn!(error = %send_err, "Failed to send birthday error notice");
            }
            return Err(e);
        }

        info!(group_id, day_month = %date.day_month(), "Birthday registered");

        let text = format!(
            "🎉 *¡Listo!* Tu cumpleaños ha sido registrado.\n\n\
             📅 El *{}* recibirás una felicitación especial en el grupo.\n\n\
             ¡Nos vemos! 👋",
            date.spoken()
        );
        self.reply(chat_id, text).await
    }

    async fn reply(&self, chat_id: i64, text: impl Into<String>) -> Result<()> {
        self.api
            .send_message(&SendMessageRequest::text(chat_id, text).markdown())
            .await?;
        Ok(())
    }
}

fn stored_date(conversation: &crate::conversation::Conversation) -> Result<BirthdayDate> {
    let field = |key: &str| -> Option<u32> { conversation.get(key)?.parse().ok() };
    match (field("day"), field("month")) {
        (Some(day), Some(month)) => Ok(BirthdayDate { day, month }),
        _ => Err(Error::Other(
            "birthday conversation is missing its date".to_string(),
        )),
    }
}
