// SPDX-FileCopyrightText: 2026 Lorekeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Breadth-first traversal over the relationship table.
//!
//! Each hop is one batched adjacency query for the whole frontier. A
//! per-call visited set bounds the walk on cyclic graphs, and cancellation
//! is checked between hops.

use std::collections::{HashMap, HashSet};

use lorekeep_config::model::GraphConfig;
use lorekeep_core::types::{Direction, Entity, NeighborOpts, RelQueryOpts, Relationship};
use lorekeep_core::{Layer, LorekeepError};
use lorekeep_storage::queries::entities;
use lorekeep_storage::queries::relationships::{self, Hop};
use lorekeep_storage::Database;
use tracing::{debug, warn};

use crate::graph::require_id;

const LAYER: Layer = Layer::KnowledgeGraph;

/// Orders hops by the position of their `from` node in the frontier, then
/// by `(to, rel_type)`.
fn in_frontier_order(frontier: &[String], mut hops: Vec<Hop>) -> Vec<Hop> {
    let position: HashMap<&str, usize> = frontier
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();
    // adjacency() already sorts by (from, to, rel_type); the sort is stable.
    hops.sort_by_key(|h| position.get(h.from.as_str()).copied().unwrap_or(usize::MAX));
    hops
}

/// Fetches `ids` and returns them in the same order, skipping unknown ones.
async fn resolve_in_order(
    db: &Database,
    op: &'static str,
    ids: &[String],
) -> Result<Vec<Entity>, LorekeepError> {
    let mut by_id: HashMap<String, Entity> = entities::get_entities(db, op, ids)
        .await?
        .into_iter()
        .map(|e| (e.id.clone(), e))
        .collect();
    Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
}

/// Entities reachable from `start` within `depth` hops, nearest first.
pub(crate) async fn neighbors(
    db: &Database,
    config: &GraphConfig,
    start: &str,
    depth: usize,
    opts: &NeighborOpts,
) -> Result<Vec<Entity>, LorekeepError> {
    const OP: &str = "neighbors";
    require_id(OP, "entity id", start)?;
    let depth = depth.min(config.max_traversal_depth);
    let max_nodes = match opts.max_nodes {
        0 => config.default_max_nodes,
        n => n,
    };
    if depth == 0 || max_nodes == 0 {
        return Ok(vec![]);
    }

    let mut visited: HashSet<String> = HashSet::from([start.to_string()]);
    let mut frontier = vec![start.to_string()];
    let mut found: Vec<Entity> = Vec::new();

    for hop in 1..=depth {
        db.ensure_active(LAYER, OP)?;
        let hops = relationships::adjacency(db, OP, &frontier, opts.direction, &opts.rel_types).await?;

        let mut next = Vec::new();
        let mut saturated = false;
        for h in in_frontier_order(&frontier, hops) {
            if visited.contains(&h.to) {
                continue;
            }
            if visited.len() >= config.max_visited_nodes {
                saturated = true;
                break;
            }
            visited.insert(h.to.clone());
            next.push(h.to);
        }

        for entity in resolve_in_order(db, OP, &next).await? {
            if opts.node_types.is_empty() || opts.node_types.contains(&entity.entity_type) {
                found.push(entity);
            }
        }

        if found.len() >= max_nodes {
            found.truncate(max_nodes);
            break;
        }
        if saturated {
            warn!(
                entity_id = start,
                hop,
                visited = visited.len(),
                limit = config.max_visited_nodes,
                "traversal stopped at the visited-node limit"
            );
            break;
        }
        if next.is_empty() {
            break;
        }
        frontier = next;
    }

    debug!(entity_id = start, depth, returned = found.len(), "neighbors");
    Ok(found)
}

/// Shortest directed path by hop count, endpoints included.
///
/// `max_depth == 0` always yields an empty path. `from == to` yields the
/// single entity when it exists. Ties between equally short paths resolve
/// by exploring `(target_id, rel_type)` in ascending order.
pub(crate) async fn find_path(
    db: &Database,
    config: &GraphConfig,
    from: &str,
    to: &str,
    max_depth: usize,
) -> Result<Vec<Entity>, LorekeepError> {
    const OP: &str = "find_path";
    require_id(OP, "from_id", from)?;
    require_id(OP, "to_id", to)?;
    let max_depth = max_depth.min(config.max_traversal_depth);
    if max_depth == 0 {
        return Ok(vec![]);
    }
    if from == to {
        let ids = [from.to_string()];
        return resolve_in_order(db, OP, &ids).await;
    }

    let mut parent: HashMap<String, String> = HashMap::new();
    let mut visited: HashSet<String> = HashSet::from([from.to_string()]);
    let mut frontier = vec![from.to_string()];
    let mut reached = false;

    'search: for _ in 0..max_depth {
        db.ensure_active(LAYER, OP)?;
        let hops = relationships::adjacency(db, OP, &frontier, Direction::Outgoing, &[]).await?;
        let mut next = Vec::new();
        for h in in_frontier_order(&frontier, hops) {
            if visited.contains(&h.to) {
                continue;
            }
            if visited.len() >= config.max_visited_nodes {
                warn!(from, to, limit = config.max_visited_nodes, "path search stopped at the visited-node limit");
                break 'search;
            }
            visited.insert(h.to.clone());
            parent.insert(h.to.clone(), h.from);
            if h.to == to {
                reached = true;
                break 'search;
            }
            next.push(h.to);
        }
        if next.is_empty() {
            break;
        }
        frontier = next;
    }

    if !reached {
        debug!(from, to, max_depth, "no path");
        return Ok(vec![]);
    }

    let mut ids = vec![to.to_string()];
    let mut cursor = to;
    while let Some(prev) = parent.get(cursor) {
        ids.push(prev.clone());
        cursor = prev.as_str();
    }
    ids.reverse();

    let path = resolve_in_order(db, OP, &ids).await?;
    // An entity deleted mid-search breaks the chain.
    if path.len() != ids.len() {
        return Ok(vec![]);
    }
    debug!(from, to, hops = path.len() - 1, "path found");
    Ok(path)
}

/// An entity with its one-hop neighbourhood in both directions.
pub(crate) struct Ego {
    pub subject: Entity,
    pub relationships: Vec<Relationship>,
    /// Distinct peers in order of first appearance; never the subject.
    pub peers: Vec<Entity>,
}

/// `None` when the subject does not exist.
pub(crate) async fn ego_network(
    db: &Database,
    op: &'static str,
    entity_id: &str,
) -> Result<Option<Ego>, LorekeepError> {
    let Some(subject) = entities::get_entity(db, entity_id)
        .await
        .map_err(|e| e.within(LAYER, op))?
    else {
        return Ok(None);
    };

    let relationships =
        relationships::relationships_for(db, op, entity_id, &RelQueryOpts::both()).await?;

    let mut seen = HashSet::new();
    let peer_ids: Vec<String> = relationships
        .iter()
        .filter_map(|r| r.peer_of(entity_id))
        .filter(|peer| *peer != entity_id && seen.insert(peer.to_string()))
        .map(str::to_string)
        .collect();
    let peers = resolve_in_order(db, op, &peer_ids).await?;

    Ok(Some(Ego {
        subject,
        relationships,
        peers,
    }))
}
