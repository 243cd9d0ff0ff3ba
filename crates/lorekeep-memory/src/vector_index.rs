// SPDX-FileCopyrightText: 2026 Lorekeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! L2 vector index: chunk embeddings ranked by exact cosine distance.

use std::collections::HashMap;

use async_trait::async_trait;
use lorekeep_config::model::VectorConfig;
use lorekeep_core::types::{check_time_window, Chunk, ChunkFilter, ScoredChunk};
use lorekeep_core::{Layer, LorekeepError, VectorIndex};
use lorekeep_storage::queries::chunks;
use lorekeep_storage::Database;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::recording::observed;
use crate::similarity::{check_embedding, rank_by_distance};

const LAYER: Layer = Layer::VectorIndex;

/// [`VectorIndex`] over the `chunks` table.
///
/// Embeddings are scanned and ranked in process; the dimension is fixed
/// the first time an index is opened against a database.
#[derive(Debug, Clone)]
pub struct SqliteVectorIndex {
    db: Database,
    dimensions: usize,
    default_top_k: usize,
}

impl SqliteVectorIndex {
    /// Opens the index, provisioning `config.dimensions` on first use.
    ///
    /// Fails with [`LorekeepError::Config`] when the database was provisioned
    /// with a different dimension.
    pub async fn open(db: Database, config: &VectorConfig) -> Result<Self, LorekeepError> {
        let dimensions = chunks::provision_dimensions(&db, config.dimensions).await?;
        info!(dimensions, "vector index ready");
        Ok(Self {
            db,
            dimensions,
            default_top_k: config.default_top_k,
        })
    }

    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        Self {
            db: self.db.with_cancellation(token),
            ..self.clone()
        }
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn index_chunk(&self, chunk: &Chunk) -> Result<(), LorekeepError> {
        observed(LAYER, "index_chunk", async {
            if chunk.id.is_empty() {
                return Err(LorekeepError::validation(LAYER, "index_chunk", "chunk id is empty"));
            }
            check_embedding(LAYER, "index_chunk", &chunk.embedding, Some(self.dimensions))?;
            debug!(chunk_id = %chunk.id, session_id = %chunk.session_id, entity_id = %chunk.entity_id, "indexing chunk");
            chunks::upsert_chunk(&self.db, chunk).await
        })
        .await
    }

    async fn search(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: &ChunkFilter,
    ) -> Result<Vec<ScoredChunk>, LorekeepError> {
        observed(LAYER, "search", async {
            check_embedding(LAYER, "search", embedding, Some(self.dimensions))?;
            check_time_window(filter.after, filter.before)
                .map_err(|message| LorekeepError::validation(LAYER, "search", message))?;
            let top_k = if top_k == 0 { self.default_top_k } else { top_k };

            let candidates = chunks::scan_embeddings(&self.db, filter).await?;
            let scanned = candidates.len();
            let ranked = rank_by_distance(embedding, candidates, top_k);
            let ids: Vec<String> = ranked.iter().map(|(id, _)| id.clone()).collect();

            let mut by_id: HashMap<String, Chunk> = chunks::get_chunks_by_ids(&self.db, &ids)
                .await?
                .into_iter()
                .map(|c| (c.id.clone(), c))
                .collect();
            // A chunk deleted between scan and fetch is dropped.
            let results: Vec<ScoredChunk> = ranked
                .into_iter()
                .filter_map(|(id, distance)| by_id.remove(&id).map(|chunk| ScoredChunk { chunk, distance }))
                .collect();

            debug!(top_k, scanned, returned = results.len(), "vector search");
            Ok(results)
        })
        .await
    }

    async fn get_chunk(&self, id: &str) -> Result<Option<Chunk>, LorekeepError> {
        observed(LAYER, "get_chunk", chunks::get_chunk(&self.db, id)).await
    }

    async fn delete_chunk(&self, id: &str) -> Result<(), LorekeepError> {
        observed(LAYER, "delete_chunk", async {
            debug!(chunk_id = id, "deleting chunk");
            chunks::delete_chunk(&self.db, id).await
        })
        .await
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn config(dimensions: usize) -> VectorConfig {
        VectorConfig {
            dimensions,
            default_top_k: 2,
        }
    }

    fn chunk(id: &str, embedding: Vec<f32>) -> Chunk {
        Chunk {
            id: id.into(),
            session_id: "s1".into(),
            content: format!("passage {id}"),
            embedding,
            speaker_id: "dm".into(),
            entity_id: String::new(),
            topic: String::new(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn rejects_bad_chunks() {
        let db = Database::open_in_memory().await.unwrap();
        let index = SqliteVectorIndex::open(db, &config(3)).await.unwrap();
        assert_eq!(index.dimensions(), 3);

        for bad in [
            chunk("", vec![1.0, 0.0, 0.0]),
            chunk("c1", vec![1.0, 0.0]),
            chunk("c1", vec![1.0, f32::INFINITY, 0.0]),
        ] {
            let err = index.index_chunk(&bad).await.unwrap_err();
            assert!(matches!(err, LorekeepError::Validation { .. }), "{err}");
        }
        assert_eq!(index.get_chunk("c1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn search_ranks_and_defaults_top_k() {
        let db = Database::open_in_memory().await.unwrap();
        let index = SqliteVectorIndex::open(db, &config(2)).await.unwrap();
        index.index_chunk(&chunk("far", vec![-1.0, 0.0])).await.unwrap();
        index.index_chunk(&chunk("near", vec![1.0, 0.1])).await.unwrap();
        index.index_chunk(&chunk("mid", vec![0.0, 1.0])).await.unwrap();

        let got = index.search(&[1.0, 0.0], 0, &ChunkFilter::default()).await.unwrap();
        let ids: Vec<_> = got.iter().map(|s| s.chunk.id.as_str()).collect();
        assert_eq!(ids, ["near", "mid"]);
        assert!(got[0].distance < got[1].distance);

        let all = index.search(&[1.0, 0.0], 10, &ChunkFilter::default()).await.unwrap();
        assert_eq!(all.last().unwrap().chunk.id, "far");
    }

    #[tokio::test]
    async fn search_rejects_wrong_query_dimension() {
        let db = Database::open_in_memory().await.unwrap();
        let index = SqliteVectorIndex::open(db, &config(2)).await.unwrap();
        let err = index.search(&[1.0, 0.0, 0.0], 1, &ChunkFilter::default()).await.unwrap_err();
        assert!(err.to_string().contains("index expects 2"), "{err}");
    }

    #[tokio::test]
    async fn reopening_with_other_dimension_fails() {
        let db = Database::open_in_memory().await.unwrap();
        SqliteVectorIndex::open(db.clone(), &config(4)).await.unwrap();
        let err = SqliteVectorIndex::open(db, &config(8)).await.unwrap_err();
        assert!(matches!(err, LorekeepError::Config(_)), "{err}");
    }

    #[tokio::test]
    async fn cancelled_handle_stops_searching() {
        let db = Database::open_in_memory().await.unwrap();
        let index = SqliteVectorIndex::open(db, &config(2)).await.unwrap();
        let token = CancellationToken::new();
        let scoped = index.with_cancellation(token.clone());
        token.cancel();
        let err = scoped.search(&[1.0, 0.0], 1, &ChunkFilter::default()).await.unwrap_err();
        assert!(err.is_cancelled(), "{err}");
        assert!(index.search(&[1.0, 0.0], 1, &ChunkFilter::default()).await.is_ok());
    }
}
