// SPDX-FileCopyrightText: 2026 Lorekeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Entity (L3) CRUD operations.

use chrono::{DateTime, Utc};
use lorekeep_core::types::{Attributes, Entity};
use lorekeep_core::{Layer, LorekeepError};
use rusqlite::{params, OptionalExtension};

use crate::codec::{attrs_column, encode_attrs, encode_ts, placeholders, ts_column};
use crate::database::Database;

pub(crate) const ENTITY_COLUMNS: &str =
    "e.id, e.type, e.name, e.attributes, e.created_at, e.updated_at";

/// Decodes the six [`ENTITY_COLUMNS`] starting at column `base`.
pub(crate) fn entity_at(row: &rusqlite::Row<'_>, base: usize) -> rusqlite::Result<Entity> {
    Ok(Entity {
        id: row.get(base)?,
        entity_type: row.get(base + 1)?,
        name: row.get(base + 2)?,
        attributes: attrs_column(row, base + 3)?,
        created_at: ts_column(row, base + 4)?,
        updated_at: ts_column(row, base + 5)?,
    })
}

fn row_to_entity(row: &rusqlite::Row<'_>) -> rusqlite::Result<Entity> {
    entity_at(row, 0)
}

/// Insert an entity, or replace type, name and attributes of an existing one.
///
/// `created_at` of an existing row is preserved; `updated_at` is set to `now`.
pub async fn upsert_entity(
    db: &Database,
    entity: &Entity,
    now: DateTime<Utc>,
) -> Result<(), LorekeepError> {
    let e = entity.clone();
    let attrs = encode_attrs(&entity.attributes).map_err(|err| LorekeepError::Validation {
        layer: Layer::KnowledgeGraph,
        op: "add_entity",
        message: format!("attributes are not serializable: {err}"),
    })?;
    db.call(Layer::KnowledgeGraph, "add_entity", &entity.id, move |conn| {
        conn.execute(
            "INSERT INTO entities (id, type, name, attributes, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                 type = excluded.type,
                 name = excluded.name,
                 attributes = excluded.attributes,
                 updated_at = excluded.updated_at",
            params![
                e.id,
                e.entity_type,
                e.name,
                attrs,
                encode_ts(&e.created_at),
                encode_ts(&now),
            ],
        )?;
        Ok(())
    })
    .await
}

/// Get an entity by ID.
pub async fn get_entity(db: &Database, id: &str) -> Result<Option<Entity>, LorekeepError> {
    let id_owned = id.to_string();
    db.call(Layer::KnowledgeGraph, "get_entity", id, move |conn| {
        conn.query_row(
            &format!("SELECT {ENTITY_COLUMNS} FROM entities e WHERE e.id = ?1"),
            params![id_owned],
            row_to_entity,
        )
        .optional()
    })
    .await
}

/// Entities by ID (batch retrieval during traversal). Unknown IDs are skipped;
/// order is unspecified.
pub async fn get_entities(
    db: &Database,
    op: &'static str,
    ids: &[String],
) -> Result<Vec<Entity>, LorekeepError> {
    if ids.is_empty() {
        return Ok(vec![]);
    }
    let ids = ids.to_vec();
    let key = ids.len().to_string();
    db.call(Layer::KnowledgeGraph, op, &key, move |conn| {
        let mut entities = Vec::with_capacity(ids.len());
        for batch in ids.chunks(crate::queries::MAX_IN_PARAMS) {
            let sql = format!(
                "SELECT {ENTITY_COLUMNS} FROM entities e WHERE e.id IN ({})",
                placeholders(1, batch.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(batch.iter()), row_to_entity)?;
            for row in rows {
                entities.push(row?);
            }
        }
        Ok(entities)
    })
    .await
}

/// Merge `attrs` into an entity's attributes in one transaction.
///
/// Returns `false` when the entity does not exist.
pub async fn merge_attributes(
    db: &Database,
    id: &str,
    attrs: &Attributes,
    now: DateTime<Utc>,
) -> Result<bool, LorekeepError> {
    let id_owned = id.to_string();
    let patch = attrs.clone();
    db.call(Layer::KnowledgeGraph, "update_entity", id, move |conn| {
        let tx = conn.transaction()?;
        let current = tx
            .query_row(
                "SELECT attributes FROM entities WHERE id = ?1",
                params![id_owned],
                |row| attrs_column(row, 0),
            )
            .optional()?;
        let Some(mut merged) = current else {
            return Ok(false);
        };
        merged.extend(patch);
        tx.execute(
            "UPDATE entities SET attributes = ?1, updated_at = ?2 WHERE id = ?3",
            params![encode_attrs(&merged)?, encode_ts(&now), id_owned],
        )?;
        tx.commit()?;
        Ok(true)
    })
    .await
}

/// Delete an entity; its relationships go with it (FK cascade).
pub async fn delete_entity(db: &Database, id: &str) -> Result<(), LorekeepError> {
    let id_owned = id.to_string();
    db.call(Layer::KnowledgeGraph, "delete_entity", id, move |conn| {
        conn.execute("DELETE FROM entities WHERE id = ?1", params![id_owned])?;
        Ok(())
    })
    .await
}

/// Entities of the given type (or all), ordered by name then id.
///
/// Name and attribute predicates need Unicode case folding and JSON
/// equality, so callers apply them to the rows returned here.
pub async fn list_entities(
    db: &Database,
    entity_type: Option<&str>,
) -> Result<Vec<Entity>, LorekeepError> {
    let ty = entity_type.map(str::to_string);
    let key = entity_type.unwrap_or("*").to_string();
    db.call(Layer::KnowledgeGraph, "find_entities", &key, move |conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENTITY_COLUMNS} FROM entities e
             WHERE (?1 IS NULL OR e.type = ?1)
             ORDER BY e.name, e.id"
        ))?;
        let entities = stmt
            .query_map(params![ty], row_to_entity)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entities)
    })
    .await
}

pub async fn count_entities(db: &Database) -> Result<u64, LorekeepError> {
    db.call(Layer::KnowledgeGraph, "stats", "entities", |conn| {
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM entities", [], |row| row.get(0))?;
        Ok(u64::try_from(n).unwrap_or(0))
    })
    .await
}
