// SPDX-FileCopyrightText: 2026 Lorekeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! L1 session log: the verbatim, append-only transcript of a play session.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lorekeep_config::model::SessionLogConfig;
use lorekeep_core::types::{check_time_window, SearchOpts, TranscriptEntry};
use lorekeep_core::{Layer, LorekeepError, SessionLog};
use lorekeep_storage::fts::{match_expression, Combine};
use lorekeep_storage::queries::transcripts::{self, TranscriptSearch};
use lorekeep_storage::Database;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::recording::observed;

const LAYER: Layer = Layer::SessionLog;

/// [`SessionLog`] over the `transcript_entries` table and its FTS5 index.
#[derive(Debug, Clone)]
pub struct SqliteSessionLog {
    db: Database,
    config: SessionLogConfig,
}

impl SqliteSessionLog {
    pub fn new(db: Database, config: SessionLogConfig) -> Self {
        Self { db, config }
    }

    /// A copy whose calls are also cancelled when `token` fires.
    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        Self {
            db: self.db.with_cancellation(token),
            config: self.config.clone(),
        }
    }

    fn effective_limit(&self, requested: usize) -> usize {
        match requested {
            0 => self.config.default_search_limit,
            n => n.min(self.config.max_search_limit),
        }
    }
}

fn require_session(op: &'static str, session_id: &str) -> Result<(), LorekeepError> {
    if session_id.is_empty() {
        return Err(LorekeepError::validation(LAYER, op, "session_id is empty"));
    }
    Ok(())
}

/// `now - window`, saturating at the earliest representable instant.
fn window_start(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(window)
        .ok()
        .and_then(|w| now.checked_sub_signed(w))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[async_trait]
impl SessionLog for SqliteSessionLog {
    async fn write_entry(&self, session_id: &str, entry: &TranscriptEntry) -> Result<(), LorekeepError> {
        observed(LAYER, "write_entry", async {
            require_session("write_entry", session_id)?;
            debug!(session_id, speaker_id = %entry.speaker_id, npc = entry.is_npc(), "appending transcript entry");
            transcripts::insert_entry(&self.db, session_id, entry).await
        })
        .await
    }

    async fn get_recent(
        &self,
        session_id: &str,
        window: Duration,
    ) -> Result<Vec<TranscriptEntry>, LorekeepError> {
        observed(LAYER, "get_recent", async {
            require_session("get_recent", session_id)?;
            let since = window_start(Utc::now(), window);
            let entries = transcripts::entries_since(&self.db, session_id, since).await?;
            debug!(session_id, window_secs = window.as_secs(), returned = entries.len(), "recent entries");
            Ok(entries)
        })
        .await
    }

    async fn search(&self, query: &str, opts: &SearchOpts) -> Result<Vec<TranscriptEntry>, LorekeepError> {
        observed(LAYER, "search", async {
            check_time_window(opts.after, opts.before)
                .map_err(|message| LorekeepError::validation(LAYER, "search", message))?;
            let Some(match_expr) = match_expression(query, Combine::All) else {
                debug!(query, "query has no searchable terms");
                return Ok(Vec::new());
            };

            let search = TranscriptSearch {
                match_expr,
                session_id: opts.session_id.clone(),
                speaker_id: opts.speaker_id.clone(),
                after: opts.after,
                before: opts.before,
                limit: self.effective_limit(opts.limit),
            };
            let entries = transcripts::search_entries(&self.db, &search).await?;
            debug!(query, limit = search.limit, returned = entries.len(), "transcript search");
            Ok(entries)
        })
        .await
    }

    async fn count(&self, session_id: &str) -> Result<u64, LorekeepError> {
        observed(LAYER, "count", async {
            require_session("count", session_id)?;
            transcripts::count_entries(&self.db, session_id).await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    async fn log() -> SqliteSessionLog {
        let db = Database::open_in_memory().await.unwrap();
        SqliteSessionLog::new(
            db,
            SessionLogConfig {
                default_search_limit: 2,
                max_search_limit: 3,
            },
        )
    }

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 19, minute, 0).unwrap()
    }

    #[tokio::test]
    async fn empty_session_id_is_rejected_before_the_store() {
        let log = log().await;
        let entry = TranscriptEntry::new("p1", "Mara", "hello");
        let err = log.write_entry("", &entry).await.unwrap_err();
        assert!(matches!(err, LorekeepError::Validation { .. }), "{err}");
        assert!(log.count("").await.is_err());
    }

    #[tokio::test]
    async fn write_then_count() {
        let log = log().await;
        let entry = TranscriptEntry::new("p1", "Mara", "We ride at dawn");
        log.write_entry("s1", &entry).await.unwrap();
        log.write_entry("s1", &entry).await.unwrap();
        log.write_entry("s2", &entry).await.unwrap();
        assert_eq!(log.count("s1").await.unwrap(), 2);
        assert_eq!(log.count("s3").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn recent_window_excludes_old_entries() {
        let log = log().await;
        let now = Utc::now();
        let old = TranscriptEntry::new("p1", "Mara", "ancient").at(now - chrono::Duration::hours(2));
        let fresh = TranscriptEntry::new("p1", "Mara", "fresh").at(now - chrono::Duration::seconds(5));
        log.write_entry("s1", &old).await.unwrap();
        log.write_entry("s1", &fresh).await.unwrap();

        let recent = log.get_recent("s1", Duration::from_secs(600)).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].text, "fresh");

        let all = log.get_recent("s1", Duration::MAX).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].text, "ancient");
    }

    #[tokio::test]
    async fn search_limit_defaults_and_clamps() {
        let log = log().await;
        for minute in 0..5 {
            let entry = TranscriptEntry::new("p1", "Mara", format!("dragon sighting {minute}")).at(at(minute));
            log.write_entry("s1", &entry).await.unwrap();
        }

        let default = log.search("dragon", &SearchOpts::default()).await.unwrap();
        assert_eq!(default.len(), 2);
        assert_eq!(default[1].text, "dragon sighting 4");

        let clamped = SearchOpts {
            limit: 100,
            ..SearchOpts::default()
        };
        assert_eq!(log.search("dragon", &clamped).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn termless_query_matches_nothing() {
        let log = log().await;
        log.write_entry("s1", &TranscriptEntry::new("p1", "Mara", "hello?!")).await.unwrap();
        assert!(log.search("  ?! ", &SearchOpts::default()).await.unwrap().is_empty());
        assert!(log.search("", &SearchOpts::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn search_validates_window() {
        let log = log().await;
        let inverted = SearchOpts {
            after: Some(at(10)),
            before: Some(at(5)),
            ..SearchOpts::default()
        };
        let err = log.search("dragon", &inverted).await.unwrap_err();
        assert!(matches!(err, LorekeepError::Validation { .. }), "{err}");
    }

    #[tokio::test]
    async fn search_with_no_matches_is_empty_not_error() {
        let log = log().await;
        let got = log.search("basilisk", &SearchOpts::default()).await.unwrap();
        assert!(got.is_empty());
    }

    #[test]
    fn window_start_saturates() {
        let now = at(0);
        assert_eq!(window_start(now, Duration::from_secs(60)), at(0) - chrono::Duration::minutes(1));
        assert_eq!(window_start(now, Duration::MAX), DateTime::<Utc>::MIN_UTC);
    }
}
