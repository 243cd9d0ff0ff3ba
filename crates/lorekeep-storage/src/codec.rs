// SPDX-FileCopyrightText: 2026 Lorekeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Column codecs shared by the query modules.
//!
//! Timestamps persist as fixed-width RFC 3339 text (microseconds, `Z`
//! suffix) so that lexical comparison in SQL agrees with time order.
//! Embeddings persist as little-endian `f32` BLOBs; attribute maps as JSON.

use chrono::{DateTime, SecondsFormat, Utc};
use lorekeep_core::types::Attributes;
use rusqlite::types::Type;

/// Encodes a timestamp for storage and range comparison.
pub fn encode_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Decodes a stored timestamp; `idx` names the column for error reporting.
pub fn decode_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Reads and decodes a timestamp column.
pub fn ts_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    decode_ts(idx, &raw)
}

/// Serialize an f32 vector to a little-endian byte BLOB.
pub fn vec_to_blob(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Deserialize a little-endian byte BLOB to an f32 vector.
///
/// Trailing bytes that do not form a whole `f32` are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

pub fn encode_attrs(attrs: &Attributes) -> rusqlite::Result<String> {
    serde_json::to_string(attrs).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

/// Reads and decodes a JSON attribute column.
pub fn attrs_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Attributes> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Numbered placeholders `?{start}, ?{start+1}, ...` for an `IN (...)` list.
pub fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}
