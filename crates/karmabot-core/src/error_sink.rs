// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Best-effort persistence of processing failures to `bot_errors`.

use tracing::{error, warn};

use crate::persistence::{ErrorRecord, Persistence};

/// Log `record` and write it to the store. A failed write is logged and
/// swallowed.
pub async fn record_error(store: &dyn Persistence, record: ErrorRecord) {
    error!(
        group_id = ?record.group_id,
        sender_id = ?record.sender_id,
        receiver_id = ?record.receiver_id,
        error = %record.error,
        "Update processing failed"
    );

    if let Err(e) = store.insert_error_record(&record).await {
        warn!(error = %e, "Failed to write error record");
    }
}
