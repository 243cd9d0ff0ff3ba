// SPDX-FileCopyrightText: 2026 Lorekeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Entity-anchored passage retrieval: BM25, cosine, or both fused with RRF.

use std::collections::HashMap;

use async_trait::async_trait;
use lorekeep_core::types::ContextResult;
use lorekeep_core::{GraphRagQuerier, Layer, LorekeepError};
use lorekeep_storage::fts::{match_expression, Combine};
use lorekeep_storage::queries::passages::{self, AnchoredPassage};
use tracing::debug;

use crate::graph::SqliteKnowledgeGraph;
use crate::recording::observed;
use crate::similarity::{check_embedding, rank_by_distance};

const LAYER: Layer = Layer::GraphRag;

/// RRF constant.
const RRF_K: f64 = 60.0;

/// Reciprocal Rank Fusion: merge ranked id lists into a single ranking.
///
/// Score of a document is `sum(1 / (k + rank))` over every list containing
/// it, with 1-based ranks. Descending by score, ties broken by id.
pub fn reciprocal_rank_fusion(lists: &[&[String]]) -> Vec<(String, f64)> {
    let mut scores: HashMap<&str, f64> = HashMap::new();
    for list in lists {
        for (rank, id) in list.iter().enumerate() {
            *scores.entry(id.as_str()).or_insert(0.0) += 1.0 / (RRF_K + rank as f64 + 1.0);
        }
    }
    let mut fused: Vec<(String, f64)> = scores
        .into_iter()
        .map(|(id, score)| (id.to_string(), score))
        .collect();
    fused.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    fused
}

/// Squashes an FTS5 `bm25()` value (negative, lower is better) into `[0, 1)`.
pub(crate) fn bm25_score(bm25: f64) -> f64 {
    let p = (-bm25).max(0.0);
    p / (1.0 + p)
}

fn context(passage: AnchoredPassage, score: f64) -> ContextResult {
    ContextResult {
        entity: passage.entity,
        chunk_id: passage.chunk_id,
        content: passage.content,
        score,
    }
}

impl SqliteKnowledgeGraph {
    fn resolve_top_k(&self, top_k: usize) -> usize {
        match top_k {
            0 => self.rag.max_results,
            n => n,
        }
    }

    /// Anchored chunk ids in scope, nearest to `embedding` first.
    async fn ranked_by_embedding(
        &self,
        embedding: &[f32],
        limit: usize,
        graph_scope: &[String],
    ) -> Result<Vec<(String, f32)>, LorekeepError> {
        let candidates = passages::scan_anchored_embeddings(&self.db, graph_scope).await?;
        Ok(rank_by_distance(embedding, candidates, limit))
    }

    /// Passages for `ids`, keyed by chunk id.
    async fn passages_by_id(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, AnchoredPassage>, LorekeepError> {
        Ok(passages::passages_by_ids(&self.db, ids)
            .await?
            .into_iter()
            .map(|p| (p.chunk_id.clone(), p))
            .collect())
    }
}

#[async_trait]
impl GraphRagQuerier for SqliteKnowledgeGraph {
    async fn query_with_context(
        &self,
        query_text: &str,
        graph_scope: &[String],
    ) -> Result<Vec<ContextResult>, LorekeepError> {
        observed(LAYER, "query_with_context", async {
            let Some(expr) = match_expression(query_text, Combine::Any) else {
                debug!(query_text, "query has no searchable terms");
                return Ok(Vec::new());
            };
            let found =
                passages::search_passages(&self.db, &expr, graph_scope, self.rag.max_results).await?;
            debug!(query_text, scope = graph_scope.len(), returned = found.len(), "context query");
            Ok(found
                .into_iter()
                .map(|p| {
                    let score = bm25_score(p.bm25);
                    context(p, score)
                })
                .collect())
        })
        .await
    }

    async fn query_with_embedding(
        &self,
        embedding: &[f32],
        top_k: usize,
        graph_scope: &[String],
    ) -> Result<Vec<ContextResult>, LorekeepError> {
        observed(LAYER, "query_with_embedding", async {
            check_embedding(LAYER, "query_with_embedding", embedding, self.embedding_dimensions)?;
            let top_k = self.resolve_top_k(top_k);
            let ranked = self.ranked_by_embedding(embedding, top_k, graph_scope).await?;
            let ids: Vec<String> = ranked.iter().map(|(id, _)| id.clone()).collect();
            let mut by_id = self.passages_by_id(&ids).await?;

            let results: Vec<ContextResult> = ranked
                .into_iter()
                .filter_map(|(id, distance)| {
                    by_id.remove(&id).map(|p| context(p, 1.0 - f64::from(distance)))
                })
                .collect();
            debug!(top_k, scope = graph_scope.len(), returned = results.len(), "embedding query");
            Ok(results)
        })
        .await
    }

    async fn query_hybrid(
        &self,
        query_text: &str,
        embedding: &[f32],
        top_k: usize,
        graph_scope: &[String],
    ) -> Result<Vec<ContextResult>, LorekeepError> {
        const OP: &str = "query_hybrid";
        observed(LAYER, OP, async {
            check_embedding(LAYER, OP, embedding, self.embedding_dimensions)?;
            let top_k = self.resolve_top_k(top_k);
            // Each ranking contributes a deeper pool than the final cut.
            let pool = top_k.saturating_mul(2).max(self.rag.max_results);

            // Without searchable terms only the vector ranking contributes.
            let text_hits = match match_expression(query_text, Combine::Any) {
                Some(expr) => passages::search_passages(&self.db, &expr, graph_scope, pool)
                    .await
                    .map_err(|e| e.within(LAYER, OP))?,
                None => Vec::new(),
            };
            let text_ids: Vec<String> = text_hits.iter().map(|p| p.chunk_id.clone()).collect();
            let vector_ids: Vec<String> = self
                .ranked_by_embedding(embedding, pool, graph_scope)
                .await
                .map_err(|e| e.within(LAYER, OP))?
                .into_iter()
                .map(|(id, _)| id)
                .collect();

            let mut fused = reciprocal_rank_fusion(&[text_ids.as_slice(), vector_ids.as_slice()]);
            fused.truncate(top_k);

            let mut by_id: HashMap<String, AnchoredPassage> = text_hits
                .into_iter()
                .map(|p| (p.chunk_id.clone(), p))
                .collect();
            let missing: Vec<String> = fused
                .iter()
                .filter(|(id, _)| !by_id.contains_key(id))
                .map(|(id, _)| id.clone())
                .collect();
            by_id.extend(self.passages_by_id(&missing).await.map_err(|e| e.within(LAYER, OP))?);

            let results: Vec<ContextResult> = fused
                .into_iter()
                .filter_map(|(id, score)| by_id.remove(&id).map(|p| context(p, score)))
                .collect();
            debug!(
                query_text,
                top_k,
                text = text_ids.len(),
                vector = vector_ids.len(),
                returned = results.len(),
                "hybrid query"
            );
            Ok(results)
        })
        .await
    }
}
