// SPDX-FileCopyrightText: 2026 Lorekeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Entity-anchored chunk passages for hybrid retrieval.
//!
//! A passage is a chunk whose `entity_id` resolves to an existing entity.
//! Unanchored chunks and chunks whose anchor was deleted never appear.

use lorekeep_core::types::Entity;
use lorekeep_core::{Layer, LorekeepError};
use rusqlite::types::ToSql;

use crate::codec::{blob_to_vec, placeholders};
use crate::database::Database;
use crate::queries::entities::{entity_at, ENTITY_COLUMNS};
use crate::queries::MAX_IN_PARAMS;

/// A chunk passage joined to its anchor entity.
#[derive(Debug, Clone, PartialEq)]
pub struct AnchoredPassage {
    pub chunk_id: String,
    pub content: String,
    pub entity: Entity,
    /// FTS5 `bm25()` value for text matches (negative, lower is better);
    /// `0.0` when the passage was fetched by ID.
    pub bm25: f64,
}

fn row_to_passage(row: &rusqlite::Row<'_>) -> rusqlite::Result<AnchoredPassage> {
    Ok(AnchoredPassage {
        chunk_id: row.get(0)?,
        content: row.get(1)?,
        bm25: row.get(2)?,
        entity: entity_at(row, 3)?,
    })
}

/// `AND e.id IN (...)` for a non-empty scope, numbered from `start`.
fn scope_clause(start: usize, scope: &[String]) -> String {
    if scope.is_empty() {
        String::new()
    } else {
        format!(" AND e.id IN ({})", placeholders(start, scope.len()))
    }
}

/// BM25-ranked passages matching `match_expr`, best first, at most `limit`.
///
/// An empty `scope` means unrestricted.
pub async fn search_passages(
    db: &Database,
    match_expr: &str,
    scope: &[String],
    limit: usize,
) -> Result<Vec<AnchoredPassage>, LorekeepError> {
    let expr = match_expr.to_string();
    let scope = scope.to_vec();
    db.call(Layer::GraphRag, "query_with_context", match_expr, move |conn| {
        let sql = format!(
            "SELECT c.id, c.content, bm25(chunks_fts), {ENTITY_COLUMNS}
             FROM chunks_fts
             JOIN chunks c ON c.seq = chunks_fts.rowid
             JOIN entities e ON e.id = c.entity_id
             WHERE chunks_fts MATCH ?1{}
             ORDER BY bm25(chunks_fts), c.id
             LIMIT {limit}",
            scope_clause(2, &scope)
        );
        let bound: Vec<&dyn ToSql> = std::iter::once(&expr)
            .chain(scope.iter())
            .map(|v| v as &dyn ToSql)
            .collect();
        let mut stmt = conn.prepare(&sql)?;
        let passages = stmt
            .query_map(bound.as_slice(), row_to_passage)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(passages)
    })
    .await
}

/// `(chunk_id, embedding)` of every anchored chunk in scope, for ranking.
pub async fn scan_anchored_embeddings(
    db: &Database,
    scope: &[String],
) -> Result<Vec<(String, Vec<f32>)>, LorekeepError> {
    let scope = scope.to_vec();
    db.call(Layer::GraphRag, "query_with_embedding", "embeddings", move |conn| {
        let sql = format!(
            "SELECT c.id, c.embedding FROM chunks c
             JOIN entities e ON e.id = c.entity_id
             WHERE 1 = 1{}",
            scope_clause(1, &scope)
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(scope.iter()), |row| {
                let id: String = row.get(0)?;
                let blob: Vec<u8> = row.get(1)?;
                Ok((id, blob_to_vec(&blob)))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
    .await
}

/// Anchored passages by chunk ID. Order is unspecified.
pub async fn passages_by_ids(
    db: &Database,
    ids: &[String],
) -> Result<Vec<AnchoredPassage>, LorekeepError> {
    if ids.is_empty() {
        return Ok(vec![]);
    }
    let ids = ids.to_vec();
    db.call(Layer::GraphRag, "query_with_embedding", "passages", move |conn| {
        let mut passages = Vec::with_capacity(ids.len());
        for batch in ids.chunks(MAX_IN_PARAMS) {
            let sql = format!(
                "SELECT c.id, c.content, 0.0, {ENTITY_COLUMNS}
                 FROM chunks c
                 JOIN entities e ON e.id = c.entity_id
                 WHERE c.id IN ({})",
                placeholders(1, batch.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(batch.iter()), row_to_passage)?;
            for row in rows {
                passages.push(row?);
            }
        }
        Ok(passages)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fts::{match_expression, Combine};
    use crate::queries::chunks::{delete_chunk, upsert_chunk};
    use crate::queries::entities::{delete_entity, upsert_entity};
    use chrono::Utc;
    use lorekeep_core::types::Chunk;

    async fn seeded() -> Database {
        let db = Database::open_in_memory().await.unwrap();
        for (id, ty) in [("grimjaw", "npc"), ("forge", "location")] {
            upsert_entity(&db, &Entity::new(id, ty, id), Utc::now()).await.unwrap();
        }
        let chunks = [
            ("c1", "grimjaw", "Grimjaw hammers red iron at the forge", [1.0, 0.0]),
            ("c2", "forge", "The forge fire never goes out", [0.0, 1.0]),
            ("c3", "", "Unanchored rumour about the forge", [1.0, 1.0]),
            ("c4", "deleted", "Anchor is gone, forge mentioned", [1.0, 0.0]),
        ];
        for (id, anchor, content, emb) in chunks {
            let chunk = Chunk {
                id: id.into(),
                session_id: "s1".into(),
                content: content.into(),
                embedding: emb.to_vec(),
                speaker_id: String::new(),
                entity_id: anchor.into(),
                topic: String::new(),
                timestamp: Utc::now(),
            };
            upsert_chunk(&db, &chunk).await.unwrap();
        }
        db
    }

    #[tokio::test]
    async fn text_search_returns_only_anchored_passages() {
        let db = seeded().await;
        let expr = match_expression("forge", Combine::Any).unwrap();
        let got = search_passages(&db, &expr, &[], 10).await.unwrap();
        let mut ids: Vec<_> = got.iter().map(|p| p.chunk_id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, ["c1", "c2"]);
        assert!(got.iter().all(|p| p.bm25 < 0.0));
        assert!(got.windows(2).all(|w| w[0].bm25 <= w[1].bm25));
    }

    #[tokio::test]
    async fn scope_restricts_anchor() {
        let db = seeded().await;
        let expr = match_expression("forge iron", Combine::Any).unwrap();
        let scope = vec!["forge".to_string()];
        let got = search_passages(&db, &expr, &scope, 10).await.unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].entity.id, "forge");

        let embeddings = scan_anchored_embeddings(&db, &scope).await.unwrap();
        assert_eq!(embeddings, vec![("c2".to_string(), vec![0.0, 1.0])]);
    }

    #[tokio::test]
    async fn deleting_the_anchor_hides_its_passages() {
        let db = seeded().await;
        delete_entity(&db, "grimjaw").await.unwrap();
        let ids = vec!["c1".to_string(), "c2".to_string()];
        let got = passages_by_ids(&db, &ids).await.unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].chunk_id, "c2");
        assert_eq!(got[0].entity.entity_type, "location");
    }

    #[tokio::test]
    async fn text_index_survives_vacuum_after_deletes() {
        let db = seeded().await;
        delete_chunk(&db, "c1").await.unwrap();
        db.call(Layer::Storage, "vacuum", "chunks", |conn| conn.execute_batch("VACUUM"))
            .await
            .unwrap();

        let expr = match_expression("fire", Combine::Any).unwrap();
        let got = search_passages(&db, &expr, &[], 10).await.unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].chunk_id, "c2");
        assert_eq!(got[0].content, "The forge fire never goes out");

        let expr = match_expression("hammers", Combine::Any).unwrap();
        assert!(search_passages(&db, &expr, &[], 10).await.unwrap().is_empty());
    }
}
