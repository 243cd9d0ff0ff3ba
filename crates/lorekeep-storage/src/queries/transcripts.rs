// SPDX-FileCopyrightText: 2026 Lorekeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transcript (L1) rows: append, recency scans and full-text search.

use std::time::Duration;

use chrono::{DateTime, Utc};
use lorekeep_core::types::TranscriptEntry;
use lorekeep_core::{Layer, LorekeepError};
use rusqlite::params;

use crate::codec::{encode_ts, ts_column};
use crate::database::Database;

const ENTRY_COLUMNS: &str =
    "t.speaker_id, t.speaker_name, t.text, t.raw_text, t.npc_id, t.timestamp, t.duration_us";

/// A resolved full-text search over the transcript.
#[derive(Debug, Clone, Default)]
pub struct TranscriptSearch {
    /// FTS5 `MATCH` expression (see [`crate::fts`]).
    pub match_expr: String,
    pub session_id: Option<String>,
    pub speaker_id: Option<String>,
    pub after: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
    pub limit: usize,
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<TranscriptEntry> {
    let duration_us: i64 = row.get(6)?;
    Ok(TranscriptEntry {
        speaker_id: row.get(0)?,
        speaker_name: row.get(1)?,
        text: row.get(2)?,
        raw_text: row.get(3)?,
        npc_id: row.get(4)?,
        timestamp: ts_column(row, 5)?,
        duration: Duration::from_micros(u64::try_from(duration_us).unwrap_or(0)),
    })
}

/// Append one entry to a session's transcript.
pub async fn insert_entry(
    db: &Database,
    session_id: &str,
    entry: &TranscriptEntry,
) -> Result<(), LorekeepError> {
    let session = session_id.to_string();
    let entry = entry.clone();
    let duration_us = i64::try_from(entry.duration.as_micros()).unwrap_or(i64::MAX);
    db.call(Layer::SessionLog, "write_entry", session_id, move |conn| {
        conn.execute(
            "INSERT INTO transcript_entries
                 (session_id, speaker_id, speaker_name, text, raw_text, npc_id, timestamp, duration_us)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                session,
                entry.speaker_id,
                entry.speaker_name,
                entry.text,
                entry.raw_text,
                entry.npc_id,
                encode_ts(&entry.timestamp),
                duration_us,
            ],
        )?;
        Ok(())
    })
    .await
}

/// Entries of a session stamped at or after `since`, oldest first.
pub async fn entries_since(
    db: &Database,
    session_id: &str,
    since: DateTime<Utc>,
) -> Result<Vec<TranscriptEntry>, LorekeepError> {
    let session = session_id.to_string();
    let since = encode_ts(&since);
    db.call(Layer::SessionLog, "get_recent", session_id, move |conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM transcript_entries t
             WHERE t.session_id = ?1 AND t.timestamp >= ?2
             ORDER BY t.timestamp, t.id"
        ))?;
        let entries = stmt
            .query_map(params![session, since], row_to_entry)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    })
    .await
}

/// Full-text search, narrowed by the optional filters.
///
/// Keeps the `limit` most recent matches and returns them oldest first.
pub async fn search_entries(
    db: &Database,
    search: &TranscriptSearch,
) -> Result<Vec<TranscriptEntry>, LorekeepError> {
    let s = search.clone();
    let key = search.match_expr.clone();
    db.call(Layer::SessionLog, "search", &key, move |conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM transcript_fts f
             JOIN transcript_entries t ON t.id = f.rowid
             WHERE transcript_fts MATCH ?1
               AND (?2 IS NULL OR t.session_id = ?2)
               AND (?3 IS NULL OR t.speaker_id = ?3)
               AND (?4 IS NULL OR t.timestamp >= ?4)
               AND (?5 IS NULL OR t.timestamp < ?5)
             ORDER BY t.timestamp DESC, t.id DESC
             LIMIT ?6"
        ))?;
        let mut entries = stmt
            .query_map(
                params![
                    s.match_expr,
                    s.session_id,
                    s.speaker_id,
                    s.after.as_ref().map(encode_ts),
                    s.before.as_ref().map(encode_ts),
                    i64::try_from(s.limit).unwrap_or(i64::MAX),
                ],
                row_to_entry,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        entries.reverse();
        Ok(entries)
    })
    .await
}

/// Number of entries written for a session.
pub async fn count_entries(db: &Database, session_id: &str) -> Result<u64, LorekeepError> {
    let session = session_id.to_string();
    db.call(Layer::SessionLog, "count", session_id, move |conn| {
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM transcript_entries WHERE session_id = ?1",
            params![session],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(n).unwrap_or(0))
    })
    .await
}
