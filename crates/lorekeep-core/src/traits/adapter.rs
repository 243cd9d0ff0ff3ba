// SPDX-FileCopyrightText: 2026 Lorekeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lifecycle trait for components that own backing-store resources.

use async_trait::async_trait;

use crate::error::LorekeepError;
use crate::types::HealthStatus;

/// Identity, health and shutdown for a component that owns resources.
#[async_trait]
pub trait PluginAdapter: Send + Sync + 'static {
    /// Returns the human-readable name of this component.
    fn name(&self) -> &str;

    /// Returns the semantic version of this component.
    fn version(&self) -> semver::Version;

    /// Performs a health check and returns the current status.
    async fn health_check(&self) -> Result<HealthStatus, LorekeepError>;

    /// Gracefully shuts down, cancelling in-flight work and releasing resources.
    async fn shutdown(&self) -> Result<(), LorekeepError>;
}
