// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Slash command recognition.

/// Commands the bot answers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `/start <param>`: deep-link entry point in private chats.
    Start,
    /// `/lovedusers`: top positive karma.
    LovedUsers,
    /// `/hatedusers`: top negative karma.
    HatedUsers,
    /// `/add`: post the birthday button.
    Add,
    /// `/birthday`: alias of `/add`.
    Birthday,
    /// `/createevent title | description | when`.
    CreateEvent,
    /// `/events`: list group events.
    Events,
    /// `/deleteevent <id>`.
    DeleteEvent,
}

impl Command {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "start" => Some(Self::Start),
            "lovedusers" => Some(Self::LovedUsers),
            "hatedusers" => Some(Self::HatedUsers),
            "add" => Some(Self::Add),
            "birthday" => Some(Self::Birthday),
            "createevent" => Some(Self::CreateEvent),
            "events" => Some(Self::Events),
            "deleteevent" => Some(Self::DeleteEvent),
            _ => None,
        }
    }

    /// Whether the command only makes sense inside a group.
    pub fn group_only(self) -> bool {
        matches!(
            self,
            Self::Add | Self::Birthday | Self::CreateEvent | Self::Events | Self::DeleteEvent
        )
    }
}

/// A recognized command and the text following it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedCommand<'a> {
    /// Which command.
    pub command: Command,
    /// Everything after the command token, trimmed.
    pub args: &'a str,
}

/// Recognize a command at the start of `text`.
///
/// The command name must match exactly (case-sensitive). An `@name` suffix
/// is accepted only when it names this bot; commands addressed to other bots
/// are not ours.
pub fn parse_command<'a>(text: &'a str, bot_username: &str) -> Option<ParsedCommand<'a>> {
    let text = text.trim_start();
    let rest = text.strip_prefix('/')?;

    let (token, args) = match rest.find(char::is_whitespace) {
        Some(at) => (&rest[..at], rest[at..].trim()),
        None => (rest, ""),
    };

    let name = match token.split_once('@') {
        Some((name, mention)) if mention.eq_ignore_ascii_case(bot_username) => name,
        Some(_) => return None,
        None => token,
    };

    Some(ParsedCommand {
        command: Command::from_name(name)?,
        args,
    })
}
