// SPDX-FileCopyrightText: 2026 Lorekeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./lorekeep.toml` > `~/.config/lorekeep/lorekeep.toml` > `/etc/lorekeep/lorekeep.toml`
//! with environment variable overrides via `LOREKEEP_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::LorekeepConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/lorekeep/lorekeep.toml` (system-wide)
/// 3. `~/.config/lorekeep/lorekeep.toml` (user XDG config)
/// 4. `./lorekeep.toml` (local directory)
/// 5. `LOREKEEP_*` environment variables
pub fn load_config() -> Result<LorekeepConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<LorekeepConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(LorekeepConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<LorekeepConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(LorekeepConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading (exposed for diagnostic use).
///
/// Returns the Figment before extraction so callers can inspect metadata.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(LorekeepConfig::default()))
        .merge(Toml::file("/etc/lorekeep/lorekeep.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("lorekeep/lorekeep.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("lorekeep.toml"))
        .merge(env_provider())
}

/// Create the environment variable provider using explicit `map()` for section-to-dot mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` because section and key
/// names contain underscores: `LOREKEEP_GRAPH_RAG_MAX_RESULTS` must map to
/// `graph_rag.max_results`, not `graph.rag.max.results`.
fn env_provider() -> Env {
    Env::prefixed("LOREKEEP_").map(|key| map_env_key(&key.as_str().to_ascii_lowercase()).into())
}

/// Map a lowercased, prefix-stripped env var name to a dotted config path.
///
/// Longer section names are matched first so `graph_rag_` wins over `graph_`.
pub(crate) fn map_env_key(key: &str) -> String {
    const SECTIONS: [&str; 5] = ["graph_rag", "session_log", "storage", "vector", "graph"];
    for section in SECTIONS {
        if let Some(rest) = key.strip_prefix(section).and_then(|r| r.strip_prefix('_')) {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}
