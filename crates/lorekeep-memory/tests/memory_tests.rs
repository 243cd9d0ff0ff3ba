// SPDX-FileCopyrightText: 2026 Lorekeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests for the memory engine across all three layers.

use std::time::Duration;

use chrono::{DateTime, Utc};
use lorekeep_config::LorekeepConfig;
use lorekeep_core::types::{
    AttrValue, Attributes, Chunk, ChunkFilter, Entity, EntityFilter, NeighborOpts, RelQueryOpts,
    Relationship, SearchOpts, Subgraph, TranscriptEntry,
};
use lorekeep_core::{
    GraphRagQuerier, KnowledgeGraph, LorekeepError, PluginAdapter, SessionLog, VectorIndex,
};
use lorekeep_memory::MemoryEngine;

fn config() -> LorekeepConfig {
    let mut config = LorekeepConfig::default();
    config.vector.dimensions = 4;
    config
}

async fn engine() -> MemoryEngine {
    MemoryEngine::open_in_memory(&config()).await.unwrap()
}

async fn link(graph: &impl KnowledgeGraph, edges: &[(&str, &str)]) {
    for (source, target) in edges {
        for id in [source, target] {
            if graph.get_entity(id).await.unwrap().is_none() {
                graph.add_entity(&Entity::new(*id, "npc", *id)).await.unwrap();
            }
        }
        graph.add_relationship(&Relationship::new(*source, *target, "knows")).await.unwrap();
    }
}

fn ids(entities: &[Entity]) -> Vec<&str> {
    entities.iter().map(|e| e.id.as_str()).collect()
}

fn chunk(id: &str, anchor: &str, content: &str, embedding: [f32; 4]) -> Chunk {
    Chunk {
        id: id.into(),
        session_id: "s1".into(),
        content: content.into(),
        embedding: embedding.to_vec(),
        speaker_id: "dm".into(),
        entity_id: anchor.into(),
        topic: String::new(),
        timestamp: Utc::now(),
    }
}

/// Re-adding an entity only moves `updated_at`.
#[tokio::test]
async fn entity_upsert_is_idempotent() {
    let engine = engine().await;
    let graph = engine.graph();
    let e = Entity::new("grimjaw", "npc", "Grimjaw").with_attribute("trade", "smith");
    graph.add_entity(&e).await.unwrap();
    let first = graph.get_entity("grimjaw").await.unwrap().unwrap();
    graph.add_entity(&e).await.unwrap();
    let second = graph.get_entity("grimjaw").await.unwrap().unwrap();

    assert_eq!(first.name, second.name);
    assert_eq!(first.entity_type, second.entity_type);
    assert_eq!(first.attributes, second.attributes);
    assert_eq!(first.created_at, second.created_at);
    assert!(second.updated_at >= first.updated_at);
}

/// Deleting an entity removes its edges in both directions.
#[tokio::test]
async fn delete_cascades_to_relationships() {
    let engine = engine().await;
    let graph = engine.graph();
    link(graph, &[("a", "b")]).await;

    graph.delete_entity("a").await.unwrap();
    graph.delete_entity("a").await.unwrap();

    assert!(graph.get_relationships("a", &RelQueryOpts::default()).await.unwrap().is_empty());
    assert!(graph.get_relationships("b", &RelQueryOpts::incoming()).await.unwrap().is_empty());
    assert_eq!(graph.stats().await.unwrap().relationships, 0);
}

/// A shorter recency window yields a suffix of a longer one.
#[tokio::test]
async fn recency_windows_are_nested_suffixes() {
    let engine = engine().await;
    let log = engine.session_log();
    let now = Utc::now();
    for minutes_ago in [50i64, 20, 9, 4, 1] {
        let at: DateTime<Utc> = now - chrono::Duration::minutes(minutes_ago);
        let entry = TranscriptEntry::new("p1", "Mara", format!("{minutes_ago} minutes ago")).at(at);
        log.write_entry("s1", &entry).await.unwrap();
    }

    let mut previous: Vec<TranscriptEntry> = Vec::new();
    for minutes in [2u64, 5, 10, 30, 120] {
        let window = log.get_recent("s1", Duration::from_secs(minutes * 60)).await.unwrap();
        assert!(window.len() >= previous.len());
        assert_eq!(&window[window.len() - previous.len()..], previous.as_slice());
        previous = window;
    }
    assert_eq!(previous.len(), 5);
    assert_eq!(previous[0].text, "50 minutes ago");
}

/// L1 search is stemmed, case-insensitive and requires every term.
#[tokio::test]
async fn transcript_search_is_stemmed() {
    let engine = engine().await;
    let log = engine.session_log();
    let lines = [
        ("p1", "The smith was FORGING a blade"),
        ("npc", "I forged that blade myself"),
        ("p2", "Is the forge still hot?"),
    ];
    for (speaker, text) in lines {
        log.write_entry("s1", &TranscriptEntry::new(speaker, speaker, text)).await.unwrap();
    }

    let hits = log.search("forge blade", &SearchOpts::default()).await.unwrap();
    assert_eq!(hits.len(), 2);

    let by_speaker = SearchOpts {
        speaker_id: Some("p2".into()),
        ..SearchOpts::default()
    };
    assert_eq!(log.search("forges", &by_speaker).await.unwrap().len(), 1);
}

/// A cycle A -> B -> A yields B exactly once.
#[tokio::test]
async fn traversal_terminates_on_cycles() {
    let engine = engine().await;
    let graph = engine.graph();
    link(graph, &[("a", "b"), ("b", "a")]).await;

    let got = graph.neighbors("a", 5, &NeighborOpts::default()).await.unwrap();
    assert_eq!(ids(&got), ["b"]);
}

/// Result size never shrinks with depth and stops growing at the eccentricity.
#[tokio::test]
async fn traversal_saturates_monotonically() {
    let engine = engine().await;
    let graph = engine.graph();
    link(graph, &[("a", "b"), ("b", "c"), ("c", "d"), ("d", "a"), ("b", "e")]).await;

    let mut sizes = Vec::new();
    for depth in 0..8 {
        sizes.push(graph.neighbors("a", depth, &NeighborOpts::default()).await.unwrap().len());
    }
    assert_eq!(sizes, [0, 1, 3, 4, 4, 4, 4, 4]);
}

/// The direct edge wins over the longer route.
#[tokio::test]
async fn find_path_returns_shortest() {
    let engine = engine().await;
    let graph = engine.graph();
    link(graph, &[("a", "b"), ("b", "c"), ("c", "d"), ("a", "d")]).await;

    let path = graph.find_path("a", "d", 5).await.unwrap();
    assert_eq!(ids(&path), ["a", "d"]);

    assert!(graph.find_path("d", "a", 5).await.unwrap().is_empty());
    assert!(graph.find_path("a", "d", 0).await.unwrap().is_empty());
    assert_eq!(ids(&graph.find_path("a", "a", 1).await.unwrap()), ["a"]);
}

/// The first of three orthogonal chunks is closest to its own direction.
#[tokio::test]
async fn vector_search_ranks_by_cosine() {
    let engine = engine().await;
    let index = engine.vector_index();
    index.index_chunk(&chunk("c1", "", "first", [1.0, 0.0, 0.0, 0.0])).await.unwrap();
    index.index_chunk(&chunk("c2", "", "second", [0.0, 1.0, 0.0, 0.0])).await.unwrap();
    index.index_chunk(&chunk("c3", "", "third", [0.0, 0.0, 1.0, 0.0])).await.unwrap();

    let got = index.search(&[1.0, 0.0, 0.0, 0.0], 3, &ChunkFilter::default()).await.unwrap();
    assert_eq!(got[0].chunk.id, "c1");
    assert!(got[0].distance.abs() < 1e-6);
    // Orthogonal ties break by id.
    assert_eq!(got[1].chunk.id, "c2");
    assert_eq!(got[2].chunk.id, "c3");
}

/// Scoped retrieval never leaves the scope, in any mode.
#[tokio::test]
async fn hybrid_retrieval_respects_scope() {
    let engine = engine().await;
    let graph = engine.graph();
    let index = engine.vector_index();
    graph.add_entity(&Entity::new("grimjaw", "npc", "Grimjaw")).await.unwrap();
    graph.add_entity(&Entity::new("forge", "location", "The Forge")).await.unwrap();
    index
        .index_chunk(&chunk("k1", "grimjaw", "Grimjaw tends the forge fire", [1.0, 0.0, 0.0, 0.0]))
        .await
        .unwrap();
    index
        .index_chunk(&chunk("k2", "forge", "The forge glows red at night", [0.9, 0.1, 0.0, 0.0]))
        .await
        .unwrap();
    index
        .index_chunk(&chunk("k3", "", "Someone mentioned a forge", [1.0, 0.0, 0.0, 0.0]))
        .await
        .unwrap();

    let scope = vec!["forge".to_string()];
    let text = graph.query_with_context("forge fire", &scope).await.unwrap();
    assert_eq!(text.len(), 1);
    assert!(text.iter().all(|r| r.entity.id == "forge"));
    assert!((0.0..1.0).contains(&text[0].score));

    let vector = graph.query_with_embedding(&[1.0, 0.0, 0.0, 0.0], 5, &scope).await.unwrap();
    assert!(vector.iter().all(|r| r.entity.id == "forge"));

    let hybrid = graph.query_hybrid("forge", &[1.0, 0.0, 0.0, 0.0], 5, &scope).await.unwrap();
    assert!(hybrid.iter().all(|r| r.entity.id == "forge"));

    let unscoped = graph.query_with_embedding(&[1.0, 0.0, 0.0, 0.0], 5, &[]).await.unwrap();
    let chunk_ids: Vec<_> = unscoped.iter().map(|r| r.chunk_id.as_str()).collect();
    assert_eq!(chunk_ids, ["k1", "k2"]);
    assert!((unscoped[0].score - 1.0).abs() < 1e-6);
}

/// Zero matches come back as empty collections, not errors.
#[tokio::test]
async fn empty_results_are_empty_collections() {
    let engine = engine().await;
    let graph = engine.graph();
    let probe = [0.5f32, 0.5, 0.0, 0.0];

    assert!(engine.session_log().get_recent("s1", Duration::from_secs(60)).await.unwrap().is_empty());
    assert!(engine.session_log().search("dragon", &SearchOpts::default()).await.unwrap().is_empty());
    assert!(engine.vector_index().search(&probe, 5, &ChunkFilter::default()).await.unwrap().is_empty());
    assert!(graph.find_entities(&EntityFilter::default()).await.unwrap().is_empty());
    assert!(graph.get_relationships("x", &RelQueryOpts::both()).await.unwrap().is_empty());
    assert!(graph.neighbors("x", 3, &NeighborOpts::default()).await.unwrap().is_empty());
    assert!(graph.find_path("x", "y", 3).await.unwrap().is_empty());
    assert_eq!(graph.visible_subgraph("x").await.unwrap(), Subgraph::default());
    assert!(graph.query_with_context("dragon", &[]).await.unwrap().is_empty());
    assert!(graph.query_with_embedding(&probe, 5, &[]).await.unwrap().is_empty());
    assert!(graph.query_hybrid("dragon", &probe, 5, &[]).await.unwrap().is_empty());
}

/// The blacksmith at the forge, end to end.
#[tokio::test]
async fn grimjaw_identity_snapshot() {
    let engine = engine().await;
    let graph = engine.graph();
    graph.add_entity(&Entity::new("grimjaw", "npc", "grimjaw")).await.unwrap();
    graph.add_entity(&Entity::new("forge", "location", "forge")).await.unwrap();
    graph
        .add_relationship(&Relationship::new("grimjaw", "forge", "LOCATED_AT"))
        .await
        .unwrap();

    let identity = graph.identity_snapshot("grimjaw").await.unwrap();
    assert_eq!(identity.entity.name, "grimjaw");
    assert_eq!(identity.relationships.len(), 1);
    assert_eq!(identity.relationships[0].rel_type, "LOCATED_AT");
    assert_eq!(ids(&identity.related_entities), ["forge"]);

    let subgraph = graph.visible_subgraph("forge").await.unwrap();
    assert_eq!(ids(&subgraph.entities), ["forge", "grimjaw"]);
    assert_eq!(subgraph.relationships.len(), 1);

    let err = graph.identity_snapshot("ghost").await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.to_string(), "L3 knowledge graph: identity_snapshot(ghost): not found");
}

/// Attribute merge keeps untouched keys and feeds attribute queries.
#[tokio::test]
async fn attribute_merge_and_query() {
    let engine = engine().await;
    let graph = engine.graph();
    graph
        .add_entity(&Entity::new("grimjaw", "npc", "Grimjaw").with_attribute("trade", "smith"))
        .await
        .unwrap();
    graph.add_entity(&Entity::new("mara", "npc", "Mara")).await.unwrap();

    let mut patch = Attributes::new();
    patch.insert("hostile".into(), AttrValue::Bool(false));
    graph.update_entity("grimjaw", &patch).await.unwrap();

    let mut query = Attributes::new();
    query.insert("trade".into(), AttrValue::from("smith"));
    query.insert("hostile".into(), AttrValue::Bool(false));
    let filter = EntityFilter {
        attribute_query: query,
        ..EntityFilter::default()
    };
    assert_eq!(ids(&graph.find_entities(&filter).await.unwrap()), ["grimjaw"]);
}

/// A file-backed index keeps its dimension across restarts.
#[tokio::test]
async fn reopening_with_other_dimension_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config();
    config.storage.database_path = dir.path().join("lore.db").to_string_lossy().into_owned();

    let engine = MemoryEngine::open(&config).await.unwrap();
    engine.graph().add_entity(&Entity::new("grimjaw", "npc", "Grimjaw")).await.unwrap();
    engine.shutdown().await.unwrap();

    let reopened = MemoryEngine::open(&config).await.unwrap();
    assert!(reopened.graph().get_entity("grimjaw").await.unwrap().is_some());
    reopened.shutdown().await.unwrap();

    config.vector.dimensions = 8;
    let err = MemoryEngine::open(&config).await.unwrap_err();
    assert!(matches!(err, LorekeepError::Config(_)), "{err}");
}

/// Concurrent writes to distinct keys all land.
#[tokio::test]
async fn concurrent_writes_to_distinct_keys() {
    let engine = engine().await;
    let graph = engine.graph().clone();
    let writes = (0..32).map(|i| {
        let graph = graph.clone();
        async move { graph.add_entity(&Entity::new(format!("npc-{i}"), "npc", format!("NPC {i}"))).await }
    });
    for result in futures::future::join_all(writes).await {
        result.unwrap();
    }
    assert_eq!(graph.stats().await.unwrap().entities, 32);
}

/// After shutdown every component reports cancellation.
#[tokio::test]
async fn shutdown_cancels_every_layer() {
    let engine = engine().await;
    let log = engine.session_log().clone();
    let index = engine.vector_index().clone();
    engine.shutdown().await.unwrap();

    assert!(log.count("s1").await.unwrap_err().is_cancelled());
    let err = index.get_chunk("c1").await.unwrap_err();
    assert!(err.is_cancelled());
    assert!(engine.graph().stats().await.unwrap_err().is_cancelled());
}

/// Text with no searchable terms matches nothing; hybrid falls back to the vector ranking.
#[tokio::test]
async fn termless_queries_match_nothing() {
    let engine = engine().await;
    let graph = engine.graph();
    graph.add_entity(&Entity::new("forge", "location", "The Forge")).await.unwrap();
    engine
        .vector_index()
        .index_chunk(&chunk("k1", "forge", "The forge glows?!", [1.0, 0.0, 0.0, 0.0]))
        .await
        .unwrap();
    engine
        .session_log()
        .write_entry("s1", &TranscriptEntry::new("p1", "Mara", "hello?!"))
        .await
        .unwrap();

    assert!(engine.session_log().search("?!", &SearchOpts::default()).await.unwrap().is_empty());
    assert!(graph.query_with_context("...", &[]).await.unwrap().is_empty());

    let hybrid = graph.query_hybrid("?!", &[1.0, 0.0, 0.0, 0.0], 5, &[]).await.unwrap();
    assert_eq!(hybrid.len(), 1);
    assert_eq!(hybrid[0].chunk_id, "k1");
    assert!((hybrid[0].score - 1.0 / 61.0).abs() < 1e-12);
}
