// SPDX-FileCopyrightText: 2026 Lorekeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Data model shared by every memory layer.
//!
//! - **L1** [`TranscriptEntry`]: immutable transcript lines.
//! - **L2** [`Chunk`]: pre-embedded text segments.
//! - **L3** [`Entity`] / [`Relationship`] / [`Provenance`]: the typed graph.
//! - Read-only projections: [`NpcIdentity`], [`Subgraph`], [`ContextResult`].

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health status reported by component health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Component is fully operational.
    Healthy,
    /// Component is operational but experiencing issues.
    Degraded(String),
    /// Component is not operational.
    Unhealthy(String),
}

// --- Open attribute maps ---

/// A schemaless attribute value.
///
/// Serialized untagged so the JSON form is the natural one
/// (`{"since": "1042", "strength": 0.8, "hostile": false}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<AttrValue>),
    Map(BTreeMap<String, AttrValue>),
}

/// Open key/value metadata carried by entities and relationships.
pub type Attributes = BTreeMap<String, AttrValue>;

impl AttrValue {
    /// Returns the string payload, if this is a text value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// False when this value, or any value nested in it, is a NaN or infinite float.
    ///
    /// JSON has no spelling for those, so they cannot be persisted faithfully.
    pub fn is_finite(&self) -> bool {
        match self {
            AttrValue::Float(f) => f.is_finite(),
            AttrValue::List(items) => items.iter().all(AttrValue::is_finite),
            AttrValue::Map(map) => map.values().all(AttrValue::is_finite),
            _ => true,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Text(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::Text(v)
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Bool(v)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}

impl From<i32> for AttrValue {
    fn from(v: i32) -> Self {
        AttrValue::Int(i64::from(v))
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Float(v)
    }
}

impl<T: Into<AttrValue>> From<Vec<T>> for AttrValue {
    fn from(v: Vec<T>) -> Self {
        AttrValue::List(v.into_iter().map(Into::into).collect())
    }
}

/// The first key whose value holds a non-finite float, if any.
pub fn non_finite_key(attrs: &Attributes) -> Option<&str> {
    attrs
        .iter()
        .find(|(_, value)| !value.is_finite())
        .map(|(key, _)| key.as_str())
}

/// True when every key/value pair of `query` is present and equal in `attrs`.
///
/// An empty query matches everything.
pub fn attributes_match(attrs: &Attributes, query: &Attributes) -> bool {
    query
        .iter()
        .all(|(key, want)| attrs.get(key).is_some_and(|have| have == want))
}

// --- L3: knowledge graph ---

/// A typed, named node in the knowledge graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Stable, caller-assigned unique identifier.
    pub id: String,
    /// Open type tag (npc, location, item, faction, quest, ...).
    #[serde(rename = "type")]
    pub entity_type: String,
    /// Display name.
    pub name: String,
    /// Domain-specific metadata.
    #[serde(default)]
    pub attributes: Attributes,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity {
    /// Creates an entity stamped with the current time.
    pub fn new(id: impl Into<String>, entity_type: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            entity_type: entity_type.into(),
            name: name.into(),
            attributes: Attributes::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Adds or replaces one attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// How a relationship fact was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProvenanceSource {
    /// Directly spoken in the session.
    Stated,
    /// Derived by the extraction pipeline.
    Inferred,
}

impl ProvenanceSource {
    /// Convert to string for SQLite storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProvenanceSource::Stated => "stated",
            ProvenanceSource::Inferred => "inferred",
        }
    }

    /// Parse from SQLite string.
    pub fn from_str_value(s: &str) -> Self {
        match s {
            "stated" => ProvenanceSource::Stated,
            _ => ProvenanceSource::Inferred,
        }
    }
}

/// Where, when and how confidently a relationship was established.
///
/// Stored and returned verbatim; the engine never interprets it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// Session that established the fact.
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    /// Confidence in `0.0..=1.0`.
    pub confidence: f64,
    pub source: ProvenanceSource,
    /// Validated by the human game master.
    pub dm_confirmed: bool,
}

impl Default for Provenance {
    fn default() -> Self {
        Self {
            session_id: String::new(),
            timestamp: Utc::now(),
            confidence: 1.0,
            source: ProvenanceSource::Stated,
            dm_confirmed: false,
        }
    }
}

/// A directed, typed edge keyed by `(source_id, target_id, rel_type)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub source_id: String,
    pub target_id: String,
    pub rel_type: String,
    #[serde(default)]
    pub attributes: Attributes,
    pub provenance: Provenance,
    pub created_at: DateTime<Utc>,
}

impl Relationship {
    /// Creates a relationship with default provenance, stamped with the current time.
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        rel_type: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            rel_type: rel_type.into(),
            attributes: Attributes::new(),
            provenance: Provenance::default(),
            created_at: Utc::now(),
        }
    }

    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// The endpoint on the other side of `entity_id`, or `None` if the edge
    /// does not touch it.
    pub fn peer_of(&self, entity_id: &str) -> Option<&str> {
        if self.source_id == entity_id {
            Some(&self.target_id)
        } else if self.target_id == entity_id {
            Some(&self.source_id)
        } else {
            None
        }
    }
}

/// One-hop identity projection of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NpcIdentity {
    pub entity: Entity,
    /// Direct relationships in both directions.
    pub relationships: Vec<Relationship>,
    /// Every distinct peer referenced by `relationships`.
    pub related_entities: Vec<Entity>,
}

/// A 1-hop ego network: the subject, its peers and the edges between them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subgraph {
    /// The subject first, then peers.
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
}

/// Row counts for the knowledge graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub entities: u64,
    pub relationships: u64,
}

/// Edge direction relative to the entity being queried.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Edges whose source is the entity.
    #[default]
    Outgoing,
    /// Edges whose target is the entity.
    Incoming,
    Both,
}

/// Filter for `find_entities`. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityFilter {
    /// Exact type match.
    pub entity_type: Option<String>,
    /// Case-insensitive substring of the name.
    pub name: Option<String>,
    /// Every pair must be present and equal in the entity's attributes.
    #[serde(default)]
    pub attribute_query: Attributes,
    /// Maximum results; `0` means unlimited.
    #[serde(default)]
    pub limit: usize,
}

impl EntityFilter {
    pub fn by_type(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: Some(entity_type.into()),
            ..Self::default()
        }
    }

    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Name and attribute predicates; the type predicate is pushed into SQL.
    pub fn matches(&self, entity: &Entity) -> bool {
        if let Some(ty) = &self.entity_type {
            if &entity.entity_type != ty {
                return false;
            }
        }
        if let Some(needle) = &self.name {
            if !entity.name.to_lowercase().contains(&needle.to_lowercase()) {
                return false;
            }
        }
        attributes_match(&entity.attributes, &self.attribute_query)
    }
}

/// Options for `get_relationships`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelQueryOpts {
    pub direction: Direction,
    /// Restrict to these relationship types; empty means all.
    #[serde(default)]
    pub rel_types: Vec<String>,
    /// Maximum results; `0` means unlimited.
    #[serde(default)]
    pub limit: usize,
}

impl RelQueryOpts {
    pub fn incoming() -> Self {
        Self {
            direction: Direction::Incoming,
            ..Self::default()
        }
    }

    pub fn both() -> Self {
        Self {
            direction: Direction::Both,
            ..Self::default()
        }
    }
}

/// Options for `neighbors`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighborOpts {
    pub direction: Direction,
    /// Only follow these relationship types; empty means all.
    #[serde(default)]
    pub rel_types: Vec<String>,
    /// Only return entities of these types; empty means all. Traversal
    /// still passes through entities of other types.
    #[serde(default)]
    pub node_types: Vec<String>,
    /// Maximum results; `0` means the configured default.
    #[serde(default)]
    pub max_nodes: usize,
}

// --- L1: session log ---

/// One immutable line of the session transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub speaker_id: String,
    pub speaker_name: String,
    /// Corrected text; this is what search matches against.
    pub text: String,
    /// Original recognizer output.
    pub raw_text: String,
    /// Non-empty iff the line was produced by an NPC agent.
    #[serde(default)]
    pub npc_id: String,
    pub timestamp: DateTime<Utc>,
    /// Utterance length, persisted at microsecond precision.
    pub duration: Duration,
}

impl TranscriptEntry {
    /// Creates a player line with `raw_text == text`, stamped now.
    pub fn new(speaker_id: impl Into<String>, speaker_name: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            speaker_id: speaker_id.into(),
            speaker_name: speaker_name.into(),
            raw_text: text.clone(),
            text,
            npc_id: String::new(),
            timestamp: Utc::now(),
            duration: Duration::ZERO,
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn from_npc(mut self, npc_id: impl Into<String>) -> Self {
        self.npc_id = npc_id.into();
        self
    }

    pub fn is_npc(&self) -> bool {
        !self.npc_id.is_empty()
    }
}

/// Options for session-log full-text search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchOpts {
    pub session_id: Option<String>,
    pub speaker_id: Option<String>,
    /// Inclusive lower bound.
    pub after: Option<DateTime<Utc>>,
    /// Exclusive upper bound.
    pub before: Option<DateTime<Utc>>,
    /// Maximum results; `0` means the configured default.
    #[serde(default)]
    pub limit: usize,
}

// --- L2: vector index ---

/// A pre-embedded text segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub session_id: String,
    pub content: String,
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub speaker_id: String,
    /// Anchor entity for hybrid retrieval; empty when unanchored.
    #[serde(default)]
    pub entity_id: String,
    #[serde(default)]
    pub topic: String,
    pub timestamp: DateTime<Utc>,
}

/// A chunk with its distance to the query embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Cosine distance in `[0, 2]`; lower is closer.
    pub distance: f32,
}

/// Filter for vector search. All supplied fields AND together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkFilter {
    pub session_id: Option<String>,
    pub speaker_id: Option<String>,
    pub entity_id: Option<String>,
    /// Inclusive lower bound.
    pub after: Option<DateTime<Utc>>,
    /// Exclusive upper bound.
    pub before: Option<DateTime<Utc>>,
}

/// Checks a `[after, before)` window; an inverted window is malformed.
pub fn check_time_window(
    after: Option<DateTime<Utc>>,
    before: Option<DateTime<Utc>>,
) -> Result<(), String> {
    match (after, before) {
        (Some(a), Some(b)) if a > b => Err(format!(
            "time window is inverted: after {a} is later than before {b}"
        )),
        _ => Ok(()),
    }
}

// --- Hybrid retrieval ---

/// A passage anchored to a graph entity, with a comparable relevance score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextResult {
    pub entity: Entity,
    pub chunk_id: String,
    pub content: String,
    /// Higher is better.
    pub score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn attr_value_json_is_natural() {
        let mut attrs = Attributes::new();
        attrs.insert("since".into(), "the war".into());
        attrs.insert("strength".into(), 0.8.into());
        attrs.insert("hostile".into(), false.into());
        attrs.insert("gold".into(), 120.into());
        attrs.insert("aliases".into(), vec!["the smith", "old jaw"].into());

        let json = serde_json::to_string(&attrs).unwrap();
        assert_eq!(
            json,
            r#"{"aliases":["the smith","old jaw"],"gold":120,"hostile":false,"since":"the war","strength":0.8}"#
        );
        let back: Attributes = serde_json::from_str(&json).unwrap();
        assert_eq!(back, attrs);
    }

    #[test]
    fn attr_value_nested_map_survives() {
        let json = r#"{"stats":{"notes":null,"str":18,"tags":["a",1,true]}}"#;
        let attrs: Attributes = serde_json::from_str(json).unwrap();
        let AttrValue::Map(stats) = &attrs["stats"] else {
            panic!("expected nested map");
        };
        assert_eq!(stats["str"], AttrValue::Int(18));
        assert_eq!(stats["notes"], AttrValue::Null);
        assert_eq!(serde_json::to_string(&attrs).unwrap(), json);
    }

    #[test]
    fn keys_serialize_sorted() {
        let json = r#"{"zeta":1,"alpha":{"b":2,"a":1}}"#;
        let attrs: Attributes = serde_json::from_str(json).unwrap();
        assert_eq!(serde_json::to_string(&attrs).unwrap(), r#"{"alpha":{"a":1,"b":2},"zeta":1}"#);
    }

    #[test]
    fn non_finite_floats_are_found_when_nested() {
        let mut attrs = Attributes::new();
        attrs.insert("gold".into(), 12.5.into());
        assert_eq!(non_finite_key(&attrs), None);

        let mut stats = BTreeMap::new();
        stats.insert("luck".to_string(), AttrValue::List(vec![AttrValue::Float(f64::INFINITY)]));
        attrs.insert("stats".into(), AttrValue::Map(stats));
        attrs.insert("weight".into(), f64::NAN.into());
        assert_eq!(non_finite_key(&attrs), Some("stats"));
        assert!(!AttrValue::Float(f64::NAN).is_finite());
        assert!(AttrValue::Null.is_finite());
    }

    #[test]
    fn entity_serializes_type_field() {
        let entity = Entity::new("grimjaw", "npc", "Grimjaw");
        let json = serde_json::to_value(&entity).unwrap();
        assert_eq!(json["type"], "npc");
        assert!(json.get("entity_type").is_none());
    }

    #[test]
    fn attribute_query_requires_every_pair() {
        let entity = Entity::new("e1", "npc", "Grimjaw")
            .with_attribute("race", "dwarf")
            .with_attribute("level", 5);

        let mut query = Attributes::new();
        assert!(attributes_match(&entity.attributes, &query));

        query.insert("race".into(), "dwarf".into());
        assert!(attributes_match(&entity.attributes, &query));

        query.insert("level".into(), AttrValue::Int(6));
        assert!(!attributes_match(&entity.attributes, &query));

        query.insert("level".into(), AttrValue::Int(5));
        query.insert("missing".into(), AttrValue::Null);
        assert!(!attributes_match(&entity.attributes, &query));
    }

    #[test]
    fn entity_filter_name_is_case_insensitive_substring() {
        let entity = Entity::new("e1", "npc", "Grimjaw the Smith");
        assert!(EntityFilter::by_name("SMITH").matches(&entity));
        assert!(EntityFilter::by_name("jaw t").matches(&entity));
        assert!(!EntityFilter::by_name("forge").matches(&entity));
        assert!(!EntityFilter::by_type("location").matches(&entity));
    }

    #[test]
    fn provenance_source_storage_strings() {
        assert_eq!(ProvenanceSource::Stated.as_str(), "stated");
        assert_eq!(ProvenanceSource::Inferred.as_str(), "inferred");
        assert_eq!(ProvenanceSource::from_str_value("stated"), ProvenanceSource::Stated);
        assert_eq!(ProvenanceSource::from_str_value("inferred"), ProvenanceSource::Inferred);
    }

    #[test]
    fn npc_flag_derives_from_npc_id() {
        let line = TranscriptEntry::new("p1", "Alice", "hello");
        assert!(!line.is_npc());
        assert!(line.clone().from_npc("grimjaw").is_npc());
    }

    #[test]
    fn peer_of_handles_both_ends() {
        let rel = Relationship::new("a", "b", "KNOWS");
        assert_eq!(rel.peer_of("a"), Some("b"));
        assert_eq!(rel.peer_of("b"), Some("a"));
        assert_eq!(rel.peer_of("c"), None);
    }

    #[test]
    fn inverted_window_is_rejected() {
        let now = Utc::now();
        let earlier = now - chrono::Duration::seconds(5);
        assert!(check_time_window(Some(now), Some(earlier)).is_err());
        assert!(check_time_window(Some(earlier), Some(now)).is_ok());
        assert!(check_time_window(Some(now), Some(now)).is_ok());
        assert!(check_time_window(None, Some(now)).is_ok());
    }

    proptest! {
        #[test]
        fn a_map_always_matches_itself(pairs in proptest::collection::btree_map("[a-z]{1,6}", any::<i64>(), 0..8)) {
            let attrs: Attributes = pairs.into_iter().map(|(k, v)| (k, AttrValue::Int(v))).collect();
            prop_assert!(attributes_match(&attrs, &attrs));
            prop_assert!(attributes_match(&attrs, &Attributes::new()));
        }
    }
}
