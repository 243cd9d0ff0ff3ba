// SPDX-FileCopyrightText: 2026 Lorekeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Lorekeep memory engine.

use strum::{Display, EnumString};
use thiserror::Error;

/// The memory layer an error originated from.
///
/// Rendered into every store-facing error message so callers can tell which
/// subsystem failed without a stack trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
pub enum Layer {
    #[strum(serialize = "L1 session log")]
    SessionLog,
    #[strum(serialize = "L2 vector index")]
    VectorIndex,
    #[strum(serialize = "L3 knowledge graph")]
    KnowledgeGraph,
    #[strum(serialize = "graphrag")]
    GraphRag,
    #[strum(serialize = "storage")]
    Storage,
}

impl Layer {
    /// Short label used for metrics.
    pub fn metric_label(&self) -> &'static str {
        match self {
            Layer::SessionLog => "l1",
            Layer::VectorIndex => "l2",
            Layer::KnowledgeGraph => "l3",
            Layer::GraphRag => "graphrag",
            Layer::Storage => "storage",
        }
    }
}

/// The primary error type used across all Lorekeep components.
#[derive(Debug, Error)]
pub enum LorekeepError {
    /// Configuration errors (invalid TOML, bad values, provisioning mismatch).
    #[error("configuration error: {0}")]
    Config(String),

    /// A mutation or lookup that requires an existing record found none.
    #[error("{layer}: {op}({key}): not found")]
    NotFound {
        layer: Layer,
        op: &'static str,
        key: String,
    },

    /// Malformed arguments, rejected before touching the store.
    #[error("{layer}: {op}: invalid argument: {message}")]
    Validation {
        layer: Layer,
        op: &'static str,
        message: String,
    },

    /// Backing store failure (I/O, query failure, corrupt row).
    #[error("{layer}: {op}({key}): storage error: {source}")]
    Storage {
        layer: Layer,
        op: &'static str,
        key: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The backing store rejected a write on a constraint.
    #[error("{layer}: {op}({key}): constraint violation: {source}")]
    Constraint {
        layer: Layer,
        op: &'static str,
        key: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The operation was cancelled before it completed.
    #[error("{layer}: {op}: cancelled")]
    Cancelled { layer: Layer, op: &'static str },

    /// The operation exceeded its deadline.
    #[error("{layer}: {op}: timed out after {duration:?}")]
    Timeout {
        layer: Layer,
        op: &'static str,
        duration: std::time::Duration,
    },
}

impl LorekeepError {
    /// Builds a validation error.
    pub fn validation(layer: Layer, op: &'static str, message: impl Into<String>) -> Self {
        LorekeepError::Validation {
            layer,
            op,
            message: message.into(),
        }
    }

    /// Builds a not-found error.
    pub fn not_found(layer: Layer, op: &'static str, key: impl Into<String>) -> Self {
        LorekeepError::NotFound {
            layer,
            op,
            key: key.into(),
        }
    }

    /// The layer this error is attributed to, if any.
    pub fn layer(&self) -> Option<Layer> {
        match self {
            LorekeepError::NotFound { layer, .. }
            | LorekeepError::Validation { layer, .. }
            | LorekeepError::Storage { layer, .. }
            | LorekeepError::Constraint { layer, .. }
            | LorekeepError::Cancelled { layer, .. }
            | LorekeepError::Timeout { layer, .. } => Some(*layer),
            LorekeepError::Config(_) => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, LorekeepError::NotFound { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, LorekeepError::Cancelled { .. })
    }

    /// True for store/transport failures that a read may be retried on.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LorekeepError::Storage { .. } | LorekeepError::Timeout { .. }
        )
    }

    /// Re-attributes a store-facing error to a different layer and operation.
    ///
    /// Used when one component reuses another component's queries, so the
    /// message names the operation the caller actually invoked.
    pub fn within(self, layer: Layer, op: &'static str) -> Self {
        match self {
            LorekeepError::NotFound { key, .. } => LorekeepError::NotFound { layer, op, key },
            LorekeepError::Validation { message, .. } => {
                LorekeepError::Validation { layer, op, message }
            }
            LorekeepError::Storage { key, source, .. } => {
                LorekeepError::Storage { layer, op, key, source }
            }
            LorekeepError::Constraint { key, source, .. } => {
                LorekeepError::Constraint { layer, op, key, source }
            }
            LorekeepError::Cancelled { .. } => LorekeepError::Cancelled { layer, op },
            LorekeepError::Timeout { duration, .. } => {
                LorekeepError::Timeout { layer, op, duration }
            }
            other => other,
        }
    }
}
