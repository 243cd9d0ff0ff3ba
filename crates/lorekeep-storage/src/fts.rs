// SPDX-FileCopyrightText: 2026 Lorekeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Builds FTS5 `MATCH` expressions from free text.
//!
//! Every term is emitted as a quoted string so user input can never be
//! parsed as FTS5 query syntax (`NEAR`, `*`, column filters, ...).

/// How the terms of a query combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combine {
    /// Every term must match.
    All,
    /// Any term may match; BM25 does the ranking.
    Any,
}

/// Splits text into searchable terms: maximal runs of alphanumeric characters.
pub fn terms(text: &str) -> Vec<&str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect()
}

/// The `MATCH` expression for `text`, or `None` when it has no searchable terms.
pub fn match_expression(text: &str, combine: Combine) -> Option<String> {
    let quoted: Vec<String> = terms(text).into_iter().map(|t| format!("\"{t}\"")).collect();
    if quoted.is_empty() {
        return None;
    }
    let separator = match combine {
        Combine::All => " AND ",
        Combine::Any => " OR ",
    };
    Some(quoted.join(separator))
}
