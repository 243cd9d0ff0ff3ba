// SPDX-FileCopyrightText: 2026 Lorekeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules, one per persisted record kind.
//!
//! Every function takes a [`Database`](crate::Database) and goes through
//! [`Database::call`](crate::Database::call), so all of them honour
//! cancellation and the query deadline.

pub mod chunks;
pub mod entities;
pub mod passages;
pub mod relationships;
pub mod transcripts;

/// Upper bound on bound parameters per `IN (...)` statement.
pub(crate) const MAX_IN_PARAMS: usize = 500;
