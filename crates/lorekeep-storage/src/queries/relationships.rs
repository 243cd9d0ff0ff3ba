// SPDX-FileCopyrightText: 2026 Lorekeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Relationship (L3) CRUD and the batched adjacency scan used by traversal.

use lorekeep_core::types::{Direction, Provenance, ProvenanceSource, RelQueryOpts, Relationship};
use lorekeep_core::{Layer, LorekeepError};
use rusqlite::params;
use rusqlite::types::ToSql;

use crate::codec::{attrs_column, encode_attrs, encode_ts, placeholders, ts_column};
use crate::database::Database;
use crate::queries::MAX_IN_PARAMS;

const REL_COLUMNS: &str = "source_id, target_id, rel_type, attributes, prov_session_id, \
     prov_timestamp, prov_confidence, prov_source, prov_dm_confirmed, created_at";

fn row_to_relationship(row: &rusqlite::Row<'_>) -> rusqlite::Result<Relationship> {
    let source: String = row.get(7)?;
    Ok(Relationship {
        source_id: row.get(0)?,
        target_id: row.get(1)?,
        rel_type: row.get(2)?,
        attributes: attrs_column(row, 3)?,
        provenance: Provenance {
            session_id: row.get(4)?,
            timestamp: ts_column(row, 5)?,
            confidence: row.get(6)?,
            source: ProvenanceSource::from_str_value(&source),
            dm_confirmed: row.get(8)?,
        },
        created_at: ts_column(row, 9)?,
    })
}

fn rel_key(source_id: &str, target_id: &str, rel_type: &str) -> String {
    format!("{source_id}-[{rel_type}]->{target_id}")
}

/// One edge seen from the frontier side during traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hop {
    /// The frontier entity the edge was reached from.
    pub from: String,
    /// The entity on the other end.
    pub to: String,
    pub rel_type: String,
}

/// Insert a relationship, or replace attributes and provenance of the one
/// with the same triple. `created_at` of an existing row is preserved.
///
/// Both endpoints must exist; otherwise the store reports a constraint error.
pub async fn upsert_relationship(db: &Database, rel: &Relationship) -> Result<(), LorekeepError> {
    let r = rel.clone();
    let key = rel_key(&rel.source_id, &rel.target_id, &rel.rel_type);
    db.call(Layer::KnowledgeGraph, "add_relationship", &key, move |conn| {
        conn.execute(
            "INSERT INTO relationships (source_id, target_id, rel_type, attributes, prov_session_id,
                 prov_timestamp, prov_confidence, prov_source, prov_dm_confirmed, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(source_id, target_id, rel_type) DO UPDATE SET
                 attributes = excluded.attributes,
                 prov_session_id = excluded.prov_session_id,
                 prov_timestamp = excluded.prov_timestamp,
                 prov_confidence = excluded.prov_confidence,
                 prov_source = excluded.prov_source,
                 prov_dm_confirmed = excluded.prov_dm_confirmed",
            params![
                r.source_id,
                r.target_id,
                r.rel_type,
                encode_attrs(&r.attributes)?,
                r.provenance.session_id,
                encode_ts(&r.provenance.timestamp),
                r.provenance.confidence,
                r.provenance.source.as_str(),
                r.provenance.dm_confirmed,
                encode_ts(&r.created_at),
            ],
        )?;
        Ok(())
    })
    .await
}

/// Relationships touching `entity_id` in the requested direction, ordered
/// by `created_at` then triple.
pub async fn relationships_for(
    db: &Database,
    op: &'static str,
    entity_id: &str,
    opts: &RelQueryOpts,
) -> Result<Vec<Relationship>, LorekeepError> {
    let id = entity_id.to_string();
    let opts = opts.clone();
    db.call(Layer::KnowledgeGraph, op, entity_id, move |conn| {
        let endpoint = match opts.direction {
            Direction::Outgoing => "source_id = ?1",
            Direction::Incoming => "target_id = ?1",
            Direction::Both => "(source_id = ?1 OR target_id = ?1)",
        };
        let mut sql = format!("SELECT {REL_COLUMNS} FROM relationships WHERE {endpoint}");
        if !opts.rel_types.is_empty() {
            sql.push_str(&format!(
                " AND rel_type IN ({})",
                placeholders(2, opts.rel_types.len())
            ));
        }
        sql.push_str(" ORDER BY created_at, source_id, target_id, rel_type");
        if opts.limit > 0 {
            sql.push_str(&format!(" LIMIT {}", opts.limit));
        }

        let mut bound: Vec<&dyn ToSql> = vec![&id as &dyn ToSql];
        bound.extend(opts.rel_types.iter().map(|t| t as &dyn ToSql));

        let mut stmt = conn.prepare(&sql)?;
        let rels = stmt
            .query_map(bound.as_slice(), row_to_relationship)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rels)
    })
    .await
}

/// Delete one relationship. Deleting a missing relationship is a no-op.
pub async fn delete_relationship(
    db: &Database,
    source_id: &str,
    target_id: &str,
    rel_type: &str,
) -> Result<(), LorekeepError> {
    let (s, t, ty) = (source_id.to_string(), target_id.to_string(), rel_type.to_string());
    let key = rel_key(source_id, target_id, rel_type);
    db.call(Layer::KnowledgeGraph, "delete_relationship", &key, move |conn| {
        conn.execute(
            "DELETE FROM relationships WHERE source_id = ?1 AND target_id = ?2 AND rel_type = ?3",
            params![s, t, ty],
        )?;
        Ok(())
    })
    .await
}

/// Every edge leaving the frontier in `direction`, optionally restricted to
/// `rel_types`, in one round trip.
///
/// Hops are sorted by `(from, to, rel_type)`. With [`Direction::Both`] an
/// edge between two frontier nodes is reported from each side.
pub async fn adjacency(
    db: &Database,
    op: &'static str,
    frontier: &[String],
    direction: Direction,
    rel_types: &[String],
) -> Result<Vec<Hop>, LorekeepError> {
    if frontier.is_empty() {
        return Ok(vec![]);
    }
    let frontier = frontier.to_vec();
    let rel_types = rel_types.to_vec();
    let key = format!("frontier of {}", frontier.len());
    db.call(Layer::KnowledgeGraph, op, &key, move |conn| {
        let mut hops = Vec::new();
        let sides: &[(&str, &str)] = match direction {
            Direction::Outgoing => &[("source_id", "target_id")],
            Direction::Incoming => &[("target_id", "source_id")],
            Direction::Both => &[("source_id", "target_id"), ("target_id", "source_id")],
        };
        let batch_size = MAX_IN_PARAMS.saturating_sub(rel_types.len()).max(1);
        for batch in frontier.chunks(batch_size) {
            for (near, far) in sides {
                let mut sql = format!(
                    "SELECT {near}, {far}, rel_type FROM relationships WHERE {near} IN ({})",
                    placeholders(1, batch.len())
                );
                if !rel_types.is_empty() {
                    sql.push_str(&format!(
                        " AND rel_type IN ({})",
                        placeholders(batch.len() + 1, rel_types.len())
                    ));
                }
                let bound: Vec<&dyn ToSql> = batch
                    .iter()
                    .chain(rel_types.iter())
                    .map(|v| v as &dyn ToSql)
                    .collect();
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(bound.as_slice(), |row| {
                    Ok(Hop {
                        from: row.get(0)?,
                        to: row.get(1)?,
                        rel_type: row.get(2)?,
                    })
                })?;
                for row in rows {
                    hops.push(row?);
                }
            }
        }
        hops.sort_by(|a, b| {
            (&a.from, &a.to, &a.rel_type).cmp(&(&b.from, &b.to, &b.rel_type))
        });
        hops.dedup();
        Ok(hops)
    })
    .await
}

pub async fn count_relationships(db: &Database) -> Result<u64, LorekeepError> {
    db.call(Layer::KnowledgeGraph, "stats", "relationships", |conn| {
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM relationships", [], |row| row.get(0))?;
        Ok(u64::try_from(n).unwrap_or(0))
    })
    .await
}
