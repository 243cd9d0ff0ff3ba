// SPDX-FileCopyrightText: 2026 Lorekeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Exact cosine ranking over stored embeddings.

use lorekeep_core::{Layer, LorekeepError};

/// Cosine distance `1 - cos(a, b)`, in `[0, 2]`.
///
/// A zero-norm operand is treated as orthogonal to everything (`1.0`).
/// Accumulates in `f64` so near-duplicates still rank stably.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    let cos = (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0);
    (1.0 - cos) as f32
}

/// The `top_k` candidates closest to `query`, ascending by distance with
/// ties broken by id. Candidates of a different length are skipped.
pub fn rank_by_distance(
    query: &[f32],
    candidates: Vec<(String, Vec<f32>)>,
    top_k: usize,
) -> Vec<(String, f32)> {
    let mut ranked: Vec<(String, f32)> = candidates
        .into_iter()
        .filter(|(_, embedding)| embedding.len() == query.len())
        .map(|(id, embedding)| {
            let distance = cosine_distance(query, &embedding);
            (id, distance)
        })
        .collect();
    ranked.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(top_k);
    ranked
}

/// Rejects empty or non-finite embeddings, and a length other than
/// `dimensions` when that is known.
pub fn check_embedding(
    layer: Layer,
    op: &'static str,
    embedding: &[f32],
    dimensions: Option<usize>,
) -> Result<(), LorekeepError> {
    if embedding.is_empty() {
        return Err(LorekeepError::validation(layer, op, "embedding is empty"));
    }
    if let Some(expected) = dimensions {
        if embedding.len() != expected {
            return Err(LorekeepError::validation(
                layer,
                op,
                format!("embedding has {} dimensions, index expects {expected}", embedding.len()),
            ));
        }
    }
    if let Some(pos) = embedding.iter().position(|v| !v.is_finite()) {
        return Err(LorekeepError::validation(
            layer,
            op,
            format!("embedding component {pos} is not finite"),
        ));
    }
    Ok(())
}
