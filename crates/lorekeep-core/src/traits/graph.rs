// SPDX-FileCopyrightText: 2026 Lorekeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! L3: typed knowledge graph, plus the hybrid retrieval extension.

use async_trait::async_trait;

use crate::error::LorekeepError;
use crate::types::{
    Attributes, ContextResult, Entity, EntityFilter, GraphStats, NeighborOpts, NpcIdentity,
    RelQueryOpts, Relationship, Subgraph,
};

/// Entities, directed typed relationships, and traversal over them.
#[async_trait]
pub trait KnowledgeGraph: Send + Sync + 'static {
    /// Inserts the entity or fully replaces the one with the same id.
    async fn add_entity(&self, entity: &Entity) -> Result<(), LorekeepError>;

    /// `None` when absent.
    async fn get_entity(&self, id: &str) -> Result<Option<Entity>, LorekeepError>;

    /// Merges `attrs` into the entity's attributes. Fails with not-found
    /// when the entity does not exist.
    async fn update_entity(&self, id: &str, attrs: &Attributes) -> Result<(), LorekeepError>;

    /// Deletes the entity and every relationship touching it. Idempotent.
    async fn delete_entity(&self, id: &str) -> Result<(), LorekeepError>;

    async fn find_entities(&self, filter: &EntityFilter) -> Result<Vec<Entity>, LorekeepError>;

    /// Inserts the relationship or replaces attributes and provenance of the
    /// one with the same `(source_id, target_id, rel_type)`.
    async fn add_relationship(&self, rel: &Relationship) -> Result<(), LorekeepError>;

    /// Relationships touching `entity_id`; outgoing only unless `opts` says otherwise.
    async fn get_relationships(
        &self,
        entity_id: &str,
        opts: &RelQueryOpts,
    ) -> Result<Vec<Relationship>, LorekeepError>;

    /// Idempotent.
    async fn delete_relationship(
        &self,
        source_id: &str,
        target_id: &str,
        rel_type: &str,
    ) -> Result<(), LorekeepError>;

    /// Entities reachable within `depth` hops, excluding the start node.
    async fn neighbors(
        &self,
        entity_id: &str,
        depth: usize,
        opts: &NeighborOpts,
    ) -> Result<Vec<Entity>, LorekeepError>;

    /// Shortest directed path from `from_id` to `to_id`, both endpoints
    /// included; empty when none exists within `max_depth` hops.
    async fn find_path(
        &self,
        from_id: &str,
        to_id: &str,
        max_depth: usize,
    ) -> Result<Vec<Entity>, LorekeepError>;

    /// The entity, its direct peers in both directions, and those edges.
    async fn visible_subgraph(&self, entity_id: &str) -> Result<Subgraph, LorekeepError>;

    /// Entity, relationships in both directions, and resolved peers. Fails
    /// with not-found when the entity does not exist.
    async fn identity_snapshot(&self, entity_id: &str) -> Result<NpcIdentity, LorekeepError>;

    async fn stats(&self) -> Result<GraphStats, LorekeepError>;
}

/// Retrieval of entity-anchored passages scoped by graph membership.
///
/// An empty `graph_scope` means unrestricted.
#[async_trait]
pub trait GraphRagQuerier: KnowledgeGraph {
    /// Full-text relevance ranking; use when no query embedding is available.
    async fn query_with_context(
        &self,
        query_text: &str,
        graph_scope: &[String],
    ) -> Result<Vec<ContextResult>, LorekeepError>;

    /// Vector-similarity ranking, at most `top_k` results.
    async fn query_with_embedding(
        &self,
        embedding: &[f32],
        top_k: usize,
        graph_scope: &[String],
    ) -> Result<Vec<ContextResult>, LorekeepError>;

    /// Both rankings fused with reciprocal rank fusion.
    async fn query_hybrid(
        &self,
        query_text: &str,
        embedding: &[f32],
        top_k: usize,
        graph_scope: &[String],
    ) -> Result<Vec<ContextResult>, LorekeepError>;
}
