// SPDX-FileCopyrightText: 2026 Lorekeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All statements are serialized through tokio-rusqlite's single background
//! thread. Do NOT create additional Connection instances for writes.

use std::path::Path;
use std::time::Duration;

use lorekeep_config::model::StorageConfig;
use lorekeep_core::{Layer, LorekeepError};
use rusqlite::ErrorCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::migrations::run_migrations;

/// Handle to the SQLite backing store.
///
/// Cheap to clone: clones share the background connection thread and the
/// shutdown token. A clone may carry an extra cancellation token of its own
/// (see [`Database::with_cancellation`]).
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
    shutdown: CancellationToken,
    cancel: CancellationToken,
    query_timeout: Duration,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("query_timeout", &self.query_timeout)
            .field("shut_down", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Opens (creating if needed) the database at `config.database_path`,
    /// applies PRAGMAs and runs pending migrations.
    pub async fn open(config: &StorageConfig) -> Result<Self, LorekeepError> {
        let path = config.database_path.clone();
        if let Some(parent) = Path::new(&path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| open_err(&path, e))?;
            }
        }

        let conn = tokio_rusqlite::Connection::open(&path)
            .await
            .map_err(|e| open_err(&path, e))?;
        let db = Self::bootstrap(conn, config, config.wal_mode).await?;
        info!(path = %path, wal = config.wal_mode, "database opened");
        Ok(db)
    }

    /// Opens a private in-memory database with default settings. Used by tests.
    pub async fn open_in_memory() -> Result<Self, LorekeepError> {
        let conn = tokio_rusqlite::Connection::open_in_memory()
            .await
            .map_err(|e| open_err(":memory:", e))?;
        Self::bootstrap(conn, &StorageConfig::default(), false).await
    }

    async fn bootstrap(
        conn: tokio_rusqlite::Connection,
        config: &StorageConfig,
        wal: bool,
    ) -> Result<Self, LorekeepError> {
        let busy_timeout = Duration::from_millis(config.busy_timeout_ms);
        conn.call(move |conn| -> Result<(), LorekeepError> {
            let pragma_err = |e: rusqlite::Error| LorekeepError::Storage {
                layer: Layer::Storage,
                op: "open",
                key: "pragma".to_string(),
                source: Box::new(e),
            };
            if wal {
                conn.execute_batch("PRAGMA journal_mode = WAL;")
                    .map_err(pragma_err)?;
            }
            conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA synchronous = NORMAL;")
                .map_err(pragma_err)?;
            conn.busy_timeout(busy_timeout).map_err(pragma_err)?;
            run_migrations(conn)
        })
        .await
        .map_err(|e| match e {
            tokio_rusqlite::Error::Error(inner) => inner,
            other => open_err("bootstrap", other.to_string()),
        })?;

        Ok(Self {
            conn,
            shutdown: CancellationToken::new(),
            cancel: CancellationToken::new(),
            query_timeout: Duration::from_millis(config.query_timeout_ms),
        })
    }

    /// A handle whose calls are also cancelled when `token` is.
    ///
    /// The database-wide shutdown token keeps applying.
    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        Self {
            cancel: token,
            ..self.clone()
        }
    }

    /// Overrides the per-call deadline for this handle.
    pub fn with_query_timeout(&self, timeout: Duration) -> Self {
        Self {
            query_timeout: timeout,
            ..self.clone()
        }
    }

    /// Returns a reference to the underlying tokio-rusqlite connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// True once shutdown began or this handle's own token fired.
    pub fn is_cancelled(&self) -> bool {
        self.shutdown.is_cancelled() || self.cancel.is_cancelled()
    }

    /// Fails with `Cancelled` when [`is_cancelled`](Self::is_cancelled).
    pub fn ensure_active(&self, layer: Layer, op: &'static str) -> Result<(), LorekeepError> {
        if self.is_cancelled() {
            return Err(LorekeepError::Cancelled { layer, op });
        }
        Ok(())
    }

    /// Runs `f` on the connection thread, bounded by cancellation and the
    /// query deadline.
    ///
    /// Constraint failures map to [`LorekeepError::Constraint`], every other
    /// SQLite failure to [`LorekeepError::Storage`]; both carry `layer`, `op`
    /// and `key`. Abandoning the returned future abandons the call.
    pub async fn call<F, R>(
        &self,
        layer: Layer,
        op: &'static str,
        key: &str,
        f: F,
    ) -> Result<R, LorekeepError>
    where
        F: FnOnce(&mut rusqlite::Connection) -> rusqlite::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let deadline = self.query_timeout;
        let work = async {
            match tokio::time::timeout(deadline, self.conn.call(f)).await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(tokio_rusqlite::Error::Error(e))) => Err(classify(layer, op, key, e)),
                Ok(Err(other)) => Err(LorekeepError::Storage {
                    layer,
                    op,
                    key: key.to_string(),
                    source: other.to_string().into(),
                }),
                Err(_) => Err(LorekeepError::Timeout {
                    layer,
                    op,
                    duration: deadline,
                }),
            }
        };

        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(LorekeepError::Cancelled { layer, op }),
            _ = self.cancel.cancelled() => Err(LorekeepError::Cancelled { layer, op }),
            result = work => result,
        }
    }

    /// Runs `SELECT 1` through the normal call path.
    pub async fn health_check(&self) -> Result<(), LorekeepError> {
        self.call(Layer::Storage, "health_check", "select", |conn| {
            conn.execute_batch("SELECT 1;")
        })
        .await
    }

    /// Cancels every in-flight and future call on every clone of this handle.
    pub fn cancel_all(&self) {
        self.shutdown.cancel();
    }

    /// Checkpoints the WAL. Runs even after [`cancel_all`](Self::cancel_all).
    pub async fn close(&self) -> Result<(), LorekeepError> {
        self.conn
            .call(|conn| conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);"))
            .await
            .map_err(|e| LorekeepError::Storage {
                layer: Layer::Storage,
                op: "close",
                key: "wal_checkpoint".to_string(),
                source: e.to_string().into(),
            })?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

/// Maps a rusqlite failure to the engine taxonomy.
pub(crate) fn classify(layer: Layer, op: &'static str, key: &str, e: rusqlite::Error) -> LorekeepError {
    let is_constraint = matches!(
        &e,
        rusqlite::Error::SqliteFailure(failure, _) if failure.code == ErrorCode::ConstraintViolation
    );
    if is_constraint {
        LorekeepError::Constraint {
            layer,
            op,
            key: key.to_string(),
            source: Box::new(e),
        }
    } else {
        LorekeepError::Storage {
            layer,
            op,
            key: key.to_string(),
            source: Box::new(e),
        }
    }
}

fn open_err(path: &str, e: impl std::fmt::Display) -> LorekeepError {
    LorekeepError::Storage {
        layer: Layer::Storage,
        op: "open",
        key: path.to_string(),
        source: e.to_string().into(),
    }
}
