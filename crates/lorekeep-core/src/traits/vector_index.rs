// SPDX-FileCopyrightText: 2026 Lorekeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! L2: embedding store with nearest-neighbor search.

use async_trait::async_trait;

use crate::error::LorekeepError;
use crate::types::{Chunk, ChunkFilter, ScoredChunk};

/// Fixed-dimension embedding index keyed by chunk id.
#[async_trait]
pub trait VectorIndex: Send + Sync + 'static {
    /// Inserts or fully replaces the chunk with the same id.
    async fn index_chunk(&self, chunk: &Chunk) -> Result<(), LorekeepError>;

    /// The `top_k` chunks closest to `embedding`, ascending by distance.
    async fn search(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: &ChunkFilter,
    ) -> Result<Vec<ScoredChunk>, LorekeepError>;

    /// Fetches one chunk; `None` when absent.
    async fn get_chunk(&self, id: &str) -> Result<Option<Chunk>, LorekeepError>;

    /// Removes a chunk. Removing an absent chunk is a no-op.
    async fn delete_chunk(&self, id: &str) -> Result<(), LorekeepError>;

    /// The embedding dimension fixed when the index was provisioned.
    fn dimensions(&self) -> usize;
}
