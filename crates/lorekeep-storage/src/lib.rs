// SPDX-FileCopyrightText: 2026 Lorekeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Lorekeep memory engine.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a single-writer
//! concurrency model via `tokio-rusqlite`, and typed queries for transcript
//! entries, chunks, entities and relationships.

pub mod codec;
pub mod database;
pub mod fts;
pub mod migrations;
pub mod queries;

pub use database::Database;
