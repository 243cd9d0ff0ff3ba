// SPDX-FileCopyrightText: 2026 Lorekeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! L1: append-only session transcript.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::LorekeepError;
use crate::types::{SearchOpts, TranscriptEntry};

/// Time-ordered transcript store with recency windows and full-text search.
///
/// Entries are immutable once written; there is no update or delete.
#[async_trait]
pub trait SessionLog: Send + Sync + 'static {
    /// Appends an entry to the session. No deduplication.
    async fn write_entry(&self, session_id: &str, entry: &TranscriptEntry) -> Result<(), LorekeepError>;

    /// Entries with `timestamp >= now - window`, oldest first.
    async fn get_recent(&self, session_id: &str, window: Duration) -> Result<Vec<TranscriptEntry>, LorekeepError>;

    /// Case-insensitive, stemmed keyword search over entry text, in
    /// chronological order.
    async fn search(&self, query: &str, opts: &SearchOpts) -> Result<Vec<TranscriptEntry>, LorekeepError>;

    /// Number of entries recorded for the session.
    async fn count(&self, session_id: &str) -> Result<u64, LorekeepError>;
}
