// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! `/lovedusers` and `/hatedusers`.

use std::fmt::Write as _;

use karmabot_protocol::{BotApi, SendMessageRequest};

use crate::error::Result;
use crate::persistence::{LeaderboardEntry, Persistence};

/// Rows shown per leaderboard.
pub const LEADERBOARD_SIZE: i64 = 10;

const EMPTY: &str = "No users found for this group yet.";

/// Which end of the ranking to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Board {
    /// Positive karma, highest first.
    Loved,
    /// Negative karma, lowest first.
    Hated,
}

impl Board {
    fn header(self) -> &'static str {
        match self {
            Self::Loved => "Most loved users (top 10):",
            Self::Hated => "Most hated folks here (top 10):",
        }
    }
}

/// Render a leaderboard message.
pub fn render(board: Board, entries: &[LeaderboardEntry]) -> String {
    if entries.is_empty() {
        return EMPTY.to_string();
    }

    let mut out = format!("{}\n\n", board.header());
    for (i, entry) in entries.iter().enumerate() {
        let name = match entry.full_name.trim() {
            "" => "Unknown",
            name => name,
        };
        let _ = writeln!(out, "{}) {} — {}", i + 1, name, entry.karma);
    }
    out
}

/// Look up the group's leaderboard and post it.
pub async fn send_leaderboard(
    api: &dyn BotApi,
    store: &dyn Persistence,
    chat_id: i64,
    board: Board,
) -> Result<()> {
    let entries = match board {
        Board::Loved => store.most_loved(chat_id, LEADERBOARD_SIZE).await?,
        Board::Hated => store.most_hated(chat_id, LEADERBOARD_SIZE).await?,
    };

    api.send_message(&SendMessageRequest::text(chat_id, render(board, &entries)))
        .await?;
    Ok(())
}
