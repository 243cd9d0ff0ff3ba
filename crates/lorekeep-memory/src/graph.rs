// SPDX-FileCopyrightText: 2026 Lorekeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! L3 knowledge graph: typed entities and provenance-tagged relationships.
//!
//! CRUD lives here; traversal is in [`crate::traversal`] and hybrid
//! retrieval in [`crate::graph_rag`].

use async_trait::async_trait;
use chrono::Utc;
use lorekeep_config::model::{GraphConfig, GraphRagConfig};
use lorekeep_core::types::{
    non_finite_key, Attributes, Entity, EntityFilter, GraphStats, NeighborOpts, NpcIdentity,
    RelQueryOpts, Relationship, Subgraph,
};
use lorekeep_core::{KnowledgeGraph, Layer, LorekeepError};
use lorekeep_storage::queries::{entities, relationships};
use lorekeep_storage::Database;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::recording::observed;
use crate::traversal;

const LAYER: Layer = Layer::KnowledgeGraph;

/// [`KnowledgeGraph`] and [`GraphRagQuerier`](lorekeep_core::GraphRagQuerier)
/// over the `entities`, `relationships` and `chunks` tables.
#[derive(Debug, Clone)]
pub struct SqliteKnowledgeGraph {
    pub(crate) db: Database,
    pub(crate) graph: GraphConfig,
    pub(crate) rag: GraphRagConfig,
    /// Dimension enforced on query embeddings, when known.
    pub(crate) embedding_dimensions: Option<usize>,
}

impl SqliteKnowledgeGraph {
    pub fn new(db: Database, graph: GraphConfig, rag: GraphRagConfig) -> Self {
        Self {
            db,
            graph,
            rag,
            embedding_dimensions: None,
        }
    }

    /// Rejects query embeddings of any other length.
    pub fn with_embedding_dimensions(mut self, dimensions: usize) -> Self {
        self.embedding_dimensions = Some(dimensions);
        self
    }

    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        Self {
            db: self.db.with_cancellation(token),
            ..self.clone()
        }
    }
}

pub(crate) fn require_id(op: &'static str, what: &str, id: &str) -> Result<(), LorekeepError> {
    if id.is_empty() {
        return Err(LorekeepError::validation(LAYER, op, format!("{what} is empty")));
    }
    Ok(())
}

/// Rejects attribute maps holding NaN or infinite floats, which JSON cannot carry.
fn require_finite(op: &'static str, attrs: &Attributes) -> Result<(), LorekeepError> {
    match non_finite_key(attrs) {
        Some(key) => Err(LorekeepError::validation(
            LAYER,
            op,
            format!("attribute {key} holds a non-finite number"),
        )),
        None => Ok(()),
    }
}

fn validate_entity(entity: &Entity) -> Result<(), LorekeepError> {
    require_id("add_entity", "entity id", &entity.id)?;
    require_id("add_entity", "entity type", &entity.entity_type)?;
    require_finite("add_entity", &entity.attributes)
}

fn validate_relationship(rel: &Relationship) -> Result<(), LorekeepError> {
    const OP: &str = "add_relationship";
    require_id(OP, "source_id", &rel.source_id)?;
    require_id(OP, "target_id", &rel.target_id)?;
    require_id(OP, "rel_type", &rel.rel_type)?;
    require_finite(OP, &rel.attributes)?;
    let confidence = rel.provenance.confidence;
    if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
        return Err(LorekeepError::validation(
            LAYER,
            OP,
            format!("confidence {confidence} is outside [0, 1]"),
        ));
    }
    Ok(())
}

#[async_trait]
impl KnowledgeGraph for SqliteKnowledgeGraph {
    async fn add_entity(&self, entity: &Entity) -> Result<(), LorekeepError> {
        observed(LAYER, "add_entity", async {
            validate_entity(entity)?;
            debug!(entity_id = %entity.id, entity_type = %entity.entity_type, "upserting entity");
            entities::upsert_entity(&self.db, entity, Utc::now()).await
        })
        .await
    }

    async fn get_entity(&self, id: &str) -> Result<Option<Entity>, LorekeepError> {
        observed(LAYER, "get_entity", entities::get_entity(&self.db, id)).await
    }

    async fn update_entity(&self, id: &str, attrs: &Attributes) -> Result<(), LorekeepError> {
        observed(LAYER, "update_entity", async {
            require_id("update_entity", "entity id", id)?;
            require_finite("update_entity", attrs)?;
            let found = entities::merge_attributes(&self.db, id, attrs, Utc::now()).await?;
            if !found {
                return Err(LorekeepError::not_found(LAYER, "update_entity", id));
            }
            debug!(entity_id = id, keys = attrs.len(), "merged entity attributes");
            Ok(())
        })
        .await
    }

    async fn delete_entity(&self, id: &str) -> Result<(), LorekeepError> {
        observed(LAYER, "delete_entity", async {
            debug!(entity_id = id, "deleting entity");
            entities::delete_entity(&self.db, id).await
        })
        .await
    }

    async fn find_entities(&self, filter: &EntityFilter) -> Result<Vec<Entity>, LorekeepError> {
        observed(LAYER, "find_entities", async {
            let rows = entities::list_entities(&self.db, filter.entity_type.as_deref()).await?;
            let limit = if filter.limit == 0 { usize::MAX } else { filter.limit };
            let found: Vec<Entity> = rows
                .into_iter()
                .filter(|e| filter.matches(e))
                .take(limit)
                .collect();
            debug!(returned = found.len(), "find_entities");
            Ok(found)
        })
        .await
    }

    async fn add_relationship(&self, rel: &Relationship) -> Result<(), LorekeepError> {
        observed(LAYER, "add_relationship", async {
            validate_relationship(rel)?;
            debug!(
                source_id = %rel.source_id,
                target_id = %rel.target_id,
                rel_type = %rel.rel_type,
                confidence = rel.provenance.confidence,
                "upserting relationship"
            );
            relationships::upsert_relationship(&self.db, rel).await
        })
        .await
    }

    async fn get_relationships(
        &self,
        entity_id: &str,
        opts: &RelQueryOpts,
    ) -> Result<Vec<Relationship>, LorekeepError> {
        observed(
            LAYER,
            "get_relationships",
            relationships::relationships_for(&self.db, "get_relationships", entity_id, opts),
        )
        .await
    }

    async fn delete_relationship(
        &self,
        source_id: &str,
        target_id: &str,
        rel_type: &str,
    ) -> Result<(), LorekeepError> {
        observed(
            LAYER,
            "delete_relationship",
            relationships::delete_relationship(&self.db, source_id, target_id, rel_type),
        )
        .await
    }

    async fn neighbors(
        &self,
        entity_id: &str,
        depth: usize,
        opts: &NeighborOpts,
    ) -> Result<Vec<Entity>, LorekeepError> {
        observed(
            LAYER,
            "neighbors",
            traversal::neighbors(&self.db, &self.graph, entity_id, depth, opts),
        )
        .await
    }

    async fn find_path(
        &self,
        from_id: &str,
        to_id: &str,
        max_depth: usize,
    ) -> Result<Vec<Entity>, LorekeepError> {
        observed(
            LAYER,
            "find_path",
            traversal::find_path(&self.db, &self.graph, from_id, to_id, max_depth),
        )
        .await
    }

    async fn visible_subgraph(&self, entity_id: &str) -> Result<Subgraph, LorekeepError> {
        observed(LAYER, "visible_subgraph", async {
            let Some(ego) = traversal::ego_network(&self.db, "visible_subgraph", entity_id).await?
            else {
                return Ok(Subgraph::default());
            };
            let mut entities = Vec::with_capacity(ego.peers.len() + 1);
            entities.push(ego.subject);
            entities.extend(ego.peers);
            Ok(Subgraph {
                entities,
                relationships: ego.relationships,
            })
        })
        .await
    }

    async fn identity_snapshot(&self, entity_id: &str) -> Result<NpcIdentity, LorekeepError> {
        observed(LAYER, "identity_snapshot", async {
            let ego = traversal::ego_network(&self.db, "identity_snapshot", entity_id)
                .await?
                .ok_or_else(|| LorekeepError::not_found(LAYER, "identity_snapshot", entity_id))?;
            debug!(
                entity_id,
                relationships = ego.relationships.len(),
                peers = ego.peers.len(),
                "identity snapshot"
            );
            Ok(NpcIdentity {
                entity: ego.subject,
                relationships: ego.relationships,
                related_entities: ego.peers,
            })
        })
        .await
    }

    async fn stats(&self) -> Result<GraphStats, LorekeepError> {
        observed(LAYER, "stats", async {
            Ok(GraphStats {
                entities: entities::count_entities(&self.db).await?,
                relationships: relationships::count_relationships(&self.db).await?,
            })
        })
        .await
    }
}
