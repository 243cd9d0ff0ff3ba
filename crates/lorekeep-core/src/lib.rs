// SPDX-FileCopyrightText: 2026 Lorekeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Lorekeep memory engine.
//!
//! This crate provides the data model, error taxonomy and component traits
//! shared by the storage and memory crates. It performs no I/O.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::{Layer, LorekeepError};
pub use types::HealthStatus;

pub use traits::{GraphRagQuerier, KnowledgeGraph, PluginAdapter, SessionLog, VectorIndex};
