// SPDX-FileCopyrightText: 2026 Lorekeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade; installing a recorder is the host's job.

use std::future::Future;
use std::time::Instant;

use lorekeep_core::{Layer, LorekeepError};
use metrics::{describe_counter, describe_histogram};

const OP_DURATION: &str = "lorekeep_memory_op_duration_seconds";
const ERRORS: &str = "lorekeep_memory_errors_total";
const DEGRADED: &str = "lorekeep_memory_degraded_total";

/// Register all memory metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_histogram!(OP_DURATION, "Latency of memory operations in seconds");
    describe_counter!(ERRORS, "Memory operations that returned an error");
    describe_counter!(DEGRADED, "Reads served empty by MemoryGuard after a transient failure");
}

/// Record one finished operation.
pub fn record_op<T>(layer: Layer, op: &'static str, seconds: f64, result: &Result<T, LorekeepError>) {
    let layer = layer.metric_label();
    metrics::histogram!(OP_DURATION, "layer" => layer, "op" => op).record(seconds);
    if let Err(e) = result {
        let kind = match e {
            LorekeepError::NotFound { .. } => "not_found",
            LorekeepError::Validation { .. } => "validation",
            LorekeepError::Storage { .. } => "storage",
            LorekeepError::Constraint { .. } => "constraint",
            LorekeepError::Cancelled { .. } => "cancelled",
            LorekeepError::Timeout { .. } => "timeout",
            LorekeepError::Config(_) => "config",
        };
        metrics::counter!(ERRORS, "layer" => layer, "op" => op, "kind" => kind).increment(1);
    }
}

/// Record a read that `MemoryGuard` degraded to an empty result.
pub fn record_degraded(layer: Option<Layer>, op: &'static str) {
    let layer = layer.map_or("unknown", |l| l.metric_label());
    metrics::counter!(DEGRADED, "layer" => layer, "op" => op).increment(1);
}

/// Awaits `fut` and records its latency and outcome.
pub(crate) async fn observed<T, F>(layer: Layer, op: &'static str, fut: F) -> Result<T, LorekeepError>
where
    F: Future<Output = Result<T, LorekeepError>>,
{
    let started = Instant::now();
    let result = fut.await;
    record_op(layer, op, started.elapsed().as_secs_f64(), &result);
    result
}
