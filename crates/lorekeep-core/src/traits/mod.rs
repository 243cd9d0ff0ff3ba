// SPDX-FileCopyrightText: 2026 Lorekeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Component trait definitions for the layered memory engine.
//!
//! Each memory layer is a trait so that callers can swap backends or wrap
//! them (see the resilience guard in `lorekeep-memory`). All traits use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod graph;
pub mod session_log;
pub mod vector_index;

pub use adapter::PluginAdapter;
pub use graph::{GraphRagQuerier, KnowledgeGraph};
pub use session_log::SessionLog;
pub use vector_index::VectorIndex;
