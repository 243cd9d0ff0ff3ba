// SPDX-FileCopyrightText: 2026 Lorekeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Caller-side resilience wrapper.
//!
//! [`MemoryGuard`] implements the same traits as the component it wraps.
//! A read that fails with a transient store error (`Storage`, `Timeout`)
//! returns an empty result instead, logs a warning and marks the guard
//! degraded; the next successful call clears the mark. Writes and every
//! other error kind pass through unchanged.
//!
//! Guards built with [`MemoryGuard::share`] use one degraded mark, so a
//! guard around a [`PluginAdapter`] reports `Degraded` health whenever any
//! layer guarded alongside it fell back.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lorekeep_core::types::{
    Attributes, Chunk, ChunkFilter, ContextResult, Entity, EntityFilter, GraphStats, NeighborOpts,
    NpcIdentity, RelQueryOpts, Relationship, ScoredChunk, SearchOpts, Subgraph, TranscriptEntry,
};
use lorekeep_core::{
    GraphRagQuerier, HealthStatus, KnowledgeGraph, LorekeepError, PluginAdapter, SessionLog,
    VectorIndex,
};
use tracing::{info, warn};

use crate::recording::record_degraded;

/// Wraps a memory component and degrades failed reads to empty results.
#[derive(Debug, Clone)]
pub struct MemoryGuard<T> {
    inner: T,
    degraded: Arc<AtomicBool>,
}

impl<T> MemoryGuard<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            degraded: Arc::new(AtomicBool::new(false)),
        }
    }

    /// True while the most recent call through this guard was degraded.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    /// Guards `inner` with the same degraded mark as this guard.
    pub fn share<U>(&self, inner: U) -> MemoryGuard<U> {
        MemoryGuard {
            inner,
            degraded: Arc::clone(&self.degraded),
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    fn succeeded(&self) {
        if self.degraded.swap(false, Ordering::AcqRel) {
            info!("memory reads recovered");
        }
    }

    /// Passes the result through, clearing the degraded mark on success.
    fn passthrough<R>(&self, result: Result<R, LorekeepError>) -> Result<R, LorekeepError> {
        if result.is_ok() {
            self.succeeded();
        }
        result
    }

    /// Replaces a transient read failure with `fallback()`.
    fn read<R>(
        &self,
        op: &'static str,
        result: Result<R, LorekeepError>,
        fallback: impl FnOnce() -> R,
    ) -> Result<R, LorekeepError> {
        match result {
            Ok(value) => {
                self.succeeded();
                Ok(value)
            }
            Err(e) if e.is_transient() => {
                self.degraded.store(true, Ordering::Release);
                let layer = e.layer();
                warn!(op, layer = ?layer, error = %e, "memory read degraded to an empty result");
                record_degraded(layer, op);
                Ok(fallback())
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl<T: SessionLog> SessionLog for MemoryGuard<T> {
    async fn write_entry(&self, session_id: &str, entry: &TranscriptEntry) -> Result<(), LorekeepError> {
        self.passthrough(self.inner.write_entry(session_id, entry).await)
    }

    async fn get_recent(
        &self,
        session_id: &str,
        window: Duration,
    ) -> Result<Vec<TranscriptEntry>, LorekeepError> {
        self.read("get_recent", self.inner.get_recent(session_id, window).await, Vec::new)
    }

    async fn search(&self, query: &str, opts: &SearchOpts) -> Result<Vec<TranscriptEntry>, LorekeepError> {
        self.read("search", self.inner.search(query, opts).await, Vec::new)
    }

    async fn count(&self, session_id: &str) -> Result<u64, LorekeepError> {
        self.read("count", self.inner.count(session_id).await, || 0)
    }
}

#[async_trait]
impl<T: VectorIndex> VectorIndex for MemoryGuard<T> {
    async fn index_chunk(&self, chunk: &Chunk) -> Result<(), LorekeepError> {
        self.passthrough(self.inner.index_chunk(chunk).await)
    }

    async fn search(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: &ChunkFilter,
    ) -> Result<Vec<ScoredChunk>, LorekeepError> {
        self.read("search", self.inner.search(embedding, top_k, filter).await, Vec::new)
    }

    async fn get_chunk(&self, id: &str) -> Result<Option<Chunk>, LorekeepError> {
        self.read("get_chunk", self.inner.get_chunk(id).await, || None)
    }

    async fn delete_chunk(&self, id: &str) -> Result<(), LorekeepError> {
        self.passthrough(self.inner.delete_chunk(id).await)
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }
}

#[async_trait]
impl<T: KnowledgeGraph> KnowledgeGraph for MemoryGuard<T> {
    async fn add_entity(&self, entity: &Entity) -> Result<(), LorekeepError> {
        self.passthrough(self.inner.add_entity(entity).await)
    }

    async fn get_entity(&self, id: &str) -> Result<Option<Entity>, LorekeepError> {
        self.read("get_entity", self.inner.get_entity(id).await, || None)
    }

    async fn update_entity(&self, id: &str, attrs: &Attributes) -> Result<(), LorekeepError> {
        self.passthrough(self.inner.update_entity(id, attrs).await)
    }

    async fn delete_entity(&self, id: &str) -> Result<(), LorekeepError> {
        self.passthrough(self.inner.delete_entity(id).await)
    }

    async fn find_entities(&self, filter: &EntityFilter) -> Result<Vec<Entity>, LorekeepError> {
        self.read("find_entities", self.inner.find_entities(filter).await, Vec::new)
    }

    async fn add_relationship(&self, rel: &Relationship) -> Result<(), LorekeepError> {
        self.passthrough(self.inner.add_relationship(rel).await)
    }

    async fn get_relationships(
        &self,
        entity_id: &str,
        opts: &RelQueryOpts,
    ) -> Result<Vec<Relationship>, LorekeepError> {
        self.read(
            "get_relationships",
            self.inner.get_relationships(entity_id, opts).await,
            Vec::new,
        )
    }

    async fn delete_relationship(
        &self,
        source_id: &str,
        target_id: &str,
        rel_type: &str,
    ) -> Result<(), LorekeepError> {
        self.passthrough(self.inner.delete_relationship(source_id, target_id, rel_type).await)
    }

    async fn neighbors(
        &self,
        entity_id: &str,
        depth: usize,
        opts: &NeighborOpts,
    ) -> Result<Vec<Entity>, LorekeepError> {
        self.read("neighbors", self.inner.neighbors(entity_id, depth, opts).await, Vec::new)
    }

    async fn find_path(
        &self,
        from_id: &str,
        to_id: &str,
        max_depth: usize,
    ) -> Result<Vec<Entity>, LorekeepError> {
        self.read("find_path", self.inner.find_path(from_id, to_id, max_depth).await, Vec::new)
    }

    async fn visible_subgraph(&self, entity_id: &str) -> Result<Subgraph, LorekeepError> {
        self.read(
            "visible_subgraph",
            self.inner.visible_subgraph(entity_id).await,
            Subgraph::default,
        )
    }

    /// Failures always propagate.
    async fn identity_snapshot(&self, entity_id: &str) -> Result<NpcIdentity, LorekeepError> {
        self.passthrough(self.inner.identity_snapshot(entity_id).await)
    }

    async fn stats(&self) -> Result<GraphStats, LorekeepError> {
        self.read("stats", self.inner.stats().await, GraphStats::default)
    }
}

#[async_trait]
impl<T: GraphRagQuerier> GraphRagQuerier for MemoryGuard<T> {
    async fn query_with_context(
        &self,
        query_text: &str,
        graph_scope: &[String],
    ) -> Result<Vec<ContextResult>, LorekeepError> {
        self.read(
            "query_with_context",
            self.inner.query_with_context(query_text, graph_scope).await,
            Vec::new,
        )
    }

    async fn query_with_embedding(
        &self,
        embedding: &[f32],
        top_k: usize,
        graph_scope: &[String],
    ) -> Result<Vec<ContextResult>, LorekeepError> {
        self.read(
            "query_with_embedding",
            self.inner.query_with_embedding(embedding, top_k, graph_scope).await,
            Vec::new,
        )
    }

    async fn query_hybrid(
        &self,
        query_text: &str,
        embedding: &[f32],
        top_k: usize,
        graph_scope: &[String],
    ) -> Result<Vec<ContextResult>, LorekeepError> {
        self.read(
            "query_hybrid",
            self.inner.query_hybrid(query_text, embedding, top_k, graph_scope).await,
            Vec::new,
        )
    }
}

#[async_trait]
impl<T: PluginAdapter> PluginAdapter for MemoryGuard<T> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn version(&self) -> semver::Version {
        self.inner.version()
    }

    /// The inner health, downgraded to `Degraded` while reads are falling back.
    async fn health_check(&self) -> Result<HealthStatus, LorekeepError> {
        match self.inner.health_check().await? {
            HealthStatus::Healthy if self.is_degraded() => Ok(HealthStatus::Degraded(
                "reads are falling back to empty results".into(),
            )),
            status => Ok(status),
        }
    }

    async fn shutdown(&self) -> Result<(), LorekeepError> {
        self.inner.shutdown().await
    }
}
