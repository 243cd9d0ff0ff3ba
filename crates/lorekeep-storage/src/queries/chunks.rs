// SPDX-FileCopyrightText: 2026 Lorekeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chunk (L2) rows and the provisioned embedding dimension.

use lorekeep_core::types::{Chunk, ChunkFilter};
use lorekeep_core::{Layer, LorekeepError};
use rusqlite::{params, OptionalExtension};

use crate::codec::{blob_to_vec, encode_ts, placeholders, ts_column, vec_to_blob};
use crate::database::Database;
use crate::queries::MAX_IN_PARAMS;

const CHUNK_COLUMNS: &str =
    "c.id, c.session_id, c.content, c.embedding, c.speaker_id, c.entity_id, c.topic, c.timestamp";

const DIMENSIONS_KEY: &str = "dimensions";

pub(crate) fn row_to_chunk(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chunk> {
    let blob: Vec<u8> = row.get(3)?;
    Ok(Chunk {
        id: row.get(0)?,
        session_id: row.get(1)?,
        content: row.get(2)?,
        embedding: blob_to_vec(&blob),
        speaker_id: row.get(4)?,
        entity_id: row.get(5)?,
        topic: row.get(6)?,
        timestamp: ts_column(row, 7)?,
    })
}

/// Records `configured` as the index dimension on first use; afterwards
/// returns the recorded value.
///
/// A mismatch between the two is a configuration error.
pub async fn provision_dimensions(db: &Database, configured: usize) -> Result<usize, LorekeepError> {
    let recorded = db
        .call(Layer::VectorIndex, "provision", DIMENSIONS_KEY, move |conn| {
            let tx = conn.transaction()?;
            let existing: Option<String> = tx
                .query_row(
                    "SELECT value FROM vector_meta WHERE key = ?1",
                    params![DIMENSIONS_KEY],
                    |row| row.get(0),
                )
                .optional()?;
            let value = match existing {
                Some(value) => value,
                None => {
                    let value = configured.to_string();
                    tx.execute(
                        "INSERT INTO vector_meta (key, value) VALUES (?1, ?2)",
                        params![DIMENSIONS_KEY, value],
                    )?;
                    value
                }
            };
            tx.commit()?;
            Ok(value)
        })
        .await?;

    let recorded: usize = recorded.parse().map_err(|_| {
        LorekeepError::Config(format!("vector index records a malformed dimension: {recorded:?}"))
    })?;
    if recorded != configured {
        return Err(LorekeepError::Config(format!(
            "vector index was provisioned with {recorded} dimensions but vector.dimensions is {configured}"
        )));
    }
    Ok(recorded)
}

/// Insert or fully replace a chunk.
pub async fn upsert_chunk(db: &Database, chunk: &Chunk) -> Result<(), LorekeepError> {
    let c = chunk.clone();
    let blob = vec_to_blob(&chunk.embedding);
    db.call(Layer::VectorIndex, "index_chunk", &chunk.id, move |conn| {
        conn.execute(
            "INSERT INTO chunks (id, session_id, content, embedding, speaker_id, entity_id, topic, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                 session_id = excluded.session_id,
                 content = excluded.content,
                 embedding = excluded.embedding,
                 speaker_id = excluded.speaker_id,
                 entity_id = excluded.entity_id,
                 topic = excluded.topic,
                 timestamp = excluded.timestamp",
            params![
                c.id,
                c.session_id,
                c.content,
                blob,
                c.speaker_id,
                c.entity_id,
                c.topic,
                encode_ts(&c.timestamp),
            ],
        )?;
        Ok(())
    })
    .await
}

/// Get a chunk by ID.
pub async fn get_chunk(db: &Database, id: &str) -> Result<Option<Chunk>, LorekeepError> {
    let id_owned = id.to_string();
    db.call(Layer::VectorIndex, "get_chunk", id, move |conn| {
        conn.query_row(
            &format!("SELECT {CHUNK_COLUMNS} FROM chunks c WHERE c.id = ?1"),
            params![id_owned],
            row_to_chunk,
        )
        .optional()
    })
    .await
}

/// Delete a chunk. Deleting a missing chunk is a no-op.
pub async fn delete_chunk(db: &Database, id: &str) -> Result<(), LorekeepError> {
    let id_owned = id.to_string();
    db.call(Layer::VectorIndex, "delete_chunk", id, move |conn| {
        conn.execute("DELETE FROM chunks WHERE id = ?1", params![id_owned])?;
        Ok(())
    })
    .await
}

/// `(id, embedding)` pairs of every chunk passing `filter`, for ranking.
pub async fn scan_embeddings(
    db: &Database,
    filter: &ChunkFilter,
) -> Result<Vec<(String, Vec<f32>)>, LorekeepError> {
    let f = filter.clone();
    db.call(Layer::VectorIndex, "search", "embeddings", move |conn| {
        let mut stmt = conn.prepare(
            "SELECT id, embedding FROM chunks
             WHERE (?1 IS NULL OR session_id = ?1)
               AND (?2 IS NULL OR speaker_id = ?2)
               AND (?3 IS NULL OR entity_id = ?3)
               AND (?4 IS NULL OR timestamp >= ?4)
               AND (?5 IS NULL OR timestamp < ?5)",
        )?;
        let rows = stmt
            .query_map(
                params![
                    f.session_id,
                    f.speaker_id,
                    f.entity_id,
                    f.after.as_ref().map(encode_ts),
                    f.before.as_ref().map(encode_ts),
                ],
                |row| {
                    let id: String = row.get(0)?;
                    let blob: Vec<u8> = row.get(1)?;
                    Ok((id, blob_to_vec(&blob)))
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
    .await
}

/// Chunks by ID (batch retrieval after ranking). Order is unspecified.
pub async fn get_chunks_by_ids(db: &Database, ids: &[String]) -> Result<Vec<Chunk>, LorekeepError> {
    if ids.is_empty() {
        return Ok(vec![]);
    }
    let ids = ids.to_vec();
    db.call(Layer::VectorIndex, "search", "chunks", move |conn| {
        let mut chunks = Vec::with_capacity(ids.len());
        for batch in ids.chunks(MAX_IN_PARAMS) {
            let sql = format!(
                "SELECT {CHUNK_COLUMNS} FROM chunks c WHERE c.id IN ({})",
                placeholders(1, batch.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(batch.iter()), row_to_chunk)?;
            for row in rows {
                chunks.push(row?);
            }
        }
        Ok(chunks)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn chunk(id: &str, session: &str, entity: &str, minute: u32, embedding: Vec<f32>) -> Chunk {
        Chunk {
            id: id.into(),
            session_id: session.into(),
            content: format!("content of {id}"),
            embedding,
            speaker_id: "dm".into(),
            entity_id: entity.into(),
            topic: "lore".into(),
            timestamp: Utc.with_ymd_and_hms(2026, 5, 2, 21, minute, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn provisioning_records_once_and_rejects_mismatch() {
        let db = Database::open_in_memory().await.unwrap();
        assert_eq!(provision_dimensions(&db, 4).await.unwrap(), 4);
        assert_eq!(provision_dimensions(&db, 4).await.unwrap(), 4);

        let err = provision_dimensions(&db, 8).await.unwrap_err();
        assert!(matches!(err, LorekeepError::Config(_)), "{err}");
        assert!(err.to_string().contains("provisioned with 4"));
    }

    #[tokio::test]
    async fn upsert_replaces_whole_record() {
        let db = Database::open_in_memory().await.unwrap();
        upsert_chunk(&db, &chunk("c1", "s1", "grimjaw", 0, vec![1.0, 0.0])).await.unwrap();

        let mut replacement = chunk("c1", "s2", "", 3, vec![0.0, 1.0]);
        replacement.content = "rewritten".into();
        upsert_chunk(&db, &replacement).await.unwrap();

        assert_eq!(get_chunk(&db, "c1").await.unwrap(), Some(replacement));
    }

    #[tokio::test]
    async fn missing_chunk_is_none_and_delete_is_idempotent() {
        let db = Database::open_in_memory().await.unwrap();
        assert_eq!(get_chunk(&db, "ghost").await.unwrap(), None);
        delete_chunk(&db, "ghost").await.unwrap();

        upsert_chunk(&db, &chunk("c1", "s1", "", 0, vec![1.0])).await.unwrap();
        delete_chunk(&db, "c1").await.unwrap();
        delete_chunk(&db, "c1").await.unwrap();
        assert_eq!(get_chunk(&db, "c1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn scan_applies_every_filter() {
        let db = Database::open_in_memory().await.unwrap();
        upsert_chunk(&db, &chunk("a", "s1", "grimjaw", 0, vec![1.0])).await.unwrap();
        upsert_chunk(&db, &chunk("b", "s1", "forge", 1, vec![2.0])).await.unwrap();
        upsert_chunk(&db, &chunk("c", "s2", "grimjaw", 2, vec![3.0])).await.unwrap();

        let ids = |rows: Vec<(String, Vec<f32>)>| {
            let mut ids: Vec<_> = rows.into_iter().map(|(id, _)| id).collect();
            ids.sort();
            ids
        };

        let all = scan_embeddings(&db, &ChunkFilter::default()).await.unwrap();
        assert_eq!(ids(all), vec!["a", "b", "c"]);

        let filter = ChunkFilter {
            session_id: Some("s1".into()),
            entity_id: Some("grimjaw".into()),
            ..ChunkFilter::default()
        };
        assert_eq!(ids(scan_embeddings(&db, &filter).await.unwrap()), vec!["a"]);

        let window = ChunkFilter {
            after: Some(Utc.with_ymd_and_hms(2026, 5, 2, 21, 1, 0).unwrap()),
            before: Some(Utc.with_ymd_and_hms(2026, 5, 2, 21, 2, 0).unwrap()),
            ..ChunkFilter::default()
        };
        assert_eq!(ids(scan_embeddings(&db, &window).await.unwrap()), vec!["b"]);
    }

    #[tokio::test]
    async fn batch_fetch_skips_unknown_ids() {
        let db = Database::open_in_memory().await.unwrap();
        upsert_chunk(&db, &chunk("a", "s1", "", 0, vec![1.0])).await.unwrap();
        let got = get_chunks_by_ids(&db, &["a".to_string(), "zzz".to_string()]).await.unwrap();
        assert_eq!(got.len(), 1);
        assert!(get_chunks_by_ids(&db, &[]).await.unwrap().is_empty());
    }
}
