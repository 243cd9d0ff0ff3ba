// SPDX-FileCopyrightText: 2026 Lorekeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Lorekeep memory engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Lorekeep configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LorekeepConfig {
    /// SQLite backing store settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// L1 session log settings.
    #[serde(default)]
    pub session_log: SessionLogConfig,

    /// L2 vector index settings.
    #[serde(default)]
    pub vector: VectorConfig,

    /// L3 knowledge graph traversal bounds.
    #[serde(default)]
    pub graph: GraphConfig,

    /// Hybrid retrieval settings.
    #[serde(default)]
    pub graph_rag: GraphRagConfig,
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,

    /// How long SQLite waits on a locked database before failing.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Deadline applied to every store call. Exceeding it yields a timeout error.
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
            busy_timeout_ms: default_busy_timeout_ms(),
            query_timeout_ms: default_query_timeout_ms(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("lorekeep").join("lorekeep.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("lorekeep.db"))
        .display()
        .to_string()
}

fn default_wal_mode() -> bool {
    true
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_query_timeout_ms() -> u64 {
    2_000
}

/// Session log (L1) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionLogConfig {
    /// Result cap used when a search passes `limit = 0`.
    #[serde(default = "default_search_limit")]
    pub default_search_limit: usize,

    /// Hard cap on search results; larger limits are clamped.
    #[serde(default = "default_max_search_limit")]
    pub max_search_limit: usize,
}

impl Default for SessionLogConfig {
    fn default() -> Self {
        Self {
            default_search_limit: default_search_limit(),
            max_search_limit: default_max_search_limit(),
        }
    }
}

fn default_search_limit() -> usize {
    20
}

fn default_max_search_limit() -> usize {
    500
}

/// Vector index (L2) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct VectorConfig {
    /// Embedding dimension. Recorded on first open; fixed for the life of the index.
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Result count used when a search passes `top_k = 0`.
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            dimensions: default_dimensions(),
            default_top_k: default_top_k(),
        }
    }
}

fn default_dimensions() -> usize {
    384 // all-MiniLM-L6-v2
}

fn default_top_k() -> usize {
    10
}

/// Knowledge graph (L3) traversal bounds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GraphConfig {
    /// Requested traversal depths above this are clamped.
    #[serde(default = "default_max_traversal_depth")]
    pub max_traversal_depth: usize,

    /// Upper bound on nodes visited by a single traversal.
    #[serde(default = "default_max_visited_nodes")]
    pub max_visited_nodes: usize,

    /// Result cap used when `neighbors` passes `max_nodes = 0`.
    #[serde(default = "default_max_nodes")]
    pub default_max_nodes: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_traversal_depth: default_max_traversal_depth(),
            max_visited_nodes: default_max_visited_nodes(),
            default_max_nodes: default_max_nodes(),
        }
    }
}

fn default_max_traversal_depth() -> usize {
    16
}

fn default_max_visited_nodes() -> usize {
    10_000
}

fn default_max_nodes() -> usize {
    200
}

/// Hybrid retrieval configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GraphRagConfig {
    /// Result cap for full-text hybrid queries and the default `top_k`.
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

impl Default for GraphRagConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
        }
    }
}

fn default_max_results() -> usize {
    10
}
