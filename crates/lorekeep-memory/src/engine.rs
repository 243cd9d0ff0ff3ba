// SPDX-FileCopyrightText: 2026 Lorekeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The memory engine facade: one database, three layers.

use std::time::Duration;

use async_trait::async_trait;
use lorekeep_config::LorekeepConfig;
use lorekeep_core::{HealthStatus, LorekeepError, PluginAdapter, VectorIndex};
use lorekeep_storage::Database;
use tracing::{debug, info};

use crate::graph::SqliteKnowledgeGraph;
use crate::recording::register_metrics;
use crate::session_log::SqliteSessionLog;
use crate::vector_index::SqliteVectorIndex;

/// Opens the database described by a [`LorekeepConfig`] and hands out the
/// session log, vector index and knowledge graph built on it.
///
/// The components are cheap clones sharing the engine's connection;
/// [`PluginAdapter::shutdown`] cancels their in-flight calls.
#[derive(Debug, Clone)]
pub struct MemoryEngine {
    db: Database,
    session_log: SqliteSessionLog,
    vector_index: SqliteVectorIndex,
    graph: SqliteKnowledgeGraph,
}

impl MemoryEngine {
    /// Opens (creating and migrating if needed) the configured database file.
    pub async fn open(config: &LorekeepConfig) -> Result<Self, LorekeepError> {
        let db = Database::open(&config.storage).await?;
        Self::from_database(db, config).await
    }

    /// An engine over a private in-memory database.
    pub async fn open_in_memory(config: &LorekeepConfig) -> Result<Self, LorekeepError> {
        let db = Database::open_in_memory()
            .await?
            .with_query_timeout(Duration::from_millis(config.storage.query_timeout_ms));
        Self::from_database(db, config).await
    }

    /// Builds the components over an already-open database.
    ///
    /// Fails with [`LorekeepError::Config`] when the database was provisioned
    /// for a different embedding dimension.
    pub async fn from_database(db: Database, config: &LorekeepConfig) -> Result<Self, LorekeepError> {
        register_metrics();
        let vector_index = SqliteVectorIndex::open(db.clone(), &config.vector).await?;
        let session_log = SqliteSessionLog::new(db.clone(), config.session_log.clone());
        let graph = SqliteKnowledgeGraph::new(db.clone(), config.graph.clone(), config.graph_rag.clone())
            .with_embedding_dimensions(vector_index.dimensions());
        debug!("memory engine assembled");
        Ok(Self {
            db,
            session_log,
            vector_index,
            graph,
        })
    }

    pub fn session_log(&self) -> &SqliteSessionLog {
        &self.session_log
    }

    pub fn vector_index(&self) -> &SqliteVectorIndex {
        &self.vector_index
    }

    /// The knowledge graph, which also serves hybrid retrieval.
    pub fn graph(&self) -> &SqliteKnowledgeGraph {
        &self.graph
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl PluginAdapter for MemoryEngine {
    fn name(&self) -> &str {
        "lorekeep-memory"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    async fn health_check(&self) -> Result<HealthStatus, LorekeepError> {
        if self.db.is_cancelled() {
            return Ok(HealthStatus::Unhealthy("engine is shut down".into()));
        }
        match self.db.health_check().await {
            Ok(()) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), LorekeepError> {
        info!("shutting down memory engine");
        self.db.cancel_all();
        self.db.close().await?;
        info!("memory engine shut down");
        Ok(())
    }
}
