// SPDX-FileCopyrightText: 2026 Lorekeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered memory for tabletop game agents.
//!
//! ## Architecture
//!
//! - **SqliteSessionLog** (L1): verbatim transcript with stemmed full-text search
//! - **SqliteVectorIndex** (L2): chunk embeddings ranked by exact cosine distance
//! - **SqliteKnowledgeGraph** (L3): entities, provenance-tagged relationships,
//!   BFS traversal, and GraphRAG retrieval over entity-anchored chunks
//! - **MemoryGuard**: degrades transient read failures to empty results
//! - **MemoryEngine**: opens the database and assembles the three layers

pub mod engine;
pub mod graph;
pub mod graph_rag;
pub mod guard;
pub mod recording;
pub mod session_log;
pub mod similarity;
mod traversal;
pub mod vector_index;

pub use engine::MemoryEngine;
pub use graph::SqliteKnowledgeGraph;
pub use graph_rag::reciprocal_rank_fusion;
pub use guard::MemoryGuard;
pub use recording::register_metrics;
pub use session_log::SqliteSessionLog;
pub use vector_index::SqliteVectorIndex;
