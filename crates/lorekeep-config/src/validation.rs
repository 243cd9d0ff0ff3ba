// SPDX-FileCopyrightText: 2026 Lorekeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks semantic constraints serde attributes cannot express, such as
//! non-zero limits and limits that must be ordered.

use crate::diagnostic::ConfigError;
use crate::model::LorekeepConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &LorekeepConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }

    if config.storage.query_timeout_ms == 0 {
        fail("storage.query_timeout_ms must be greater than 0".to_string());
    }

    if config.vector.dimensions == 0 {
        fail("vector.dimensions must be greater than 0".to_string());
    }

    let positive = [
        ("vector.default_top_k", config.vector.default_top_k),
        ("session_log.default_search_limit", config.session_log.default_search_limit),
        ("session_log.max_search_limit", config.session_log.max_search_limit),
        ("graph.max_traversal_depth", config.graph.max_traversal_depth),
        ("graph.max_visited_nodes", config.graph.max_visited_nodes),
        ("graph.default_max_nodes", config.graph.default_max_nodes),
        ("graph_rag.max_results", config.graph_rag.max_results),
    ];
    for (key, value) in positive {
        if value == 0 {
            fail(format!("{key} must be greater than 0"));
        }
    }

    if config.session_log.default_search_limit > config.session_log.max_search_limit {
        fail(format!(
            "session_log.default_search_limit ({}) must not exceed session_log.max_search_limit ({})",
            config.session_log.default_search_limit, config.session_log.max_search_limit
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
