//! Activity replication
//!
//! Turns tracker activity events into reading session rows. Events are
//! replayed oldest first; an event whose document has no catalog match is
//! counted and skipped, and a session already recorded within the dedup
//! window is skipped silently. The caller advances the watermark past every
//! event this pass considered, matched or not.

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::catalog::CatalogIndex;
use crate::error::Result;
use crate::matching::resolve;
use crate::store::tracker::ActivityRow;
use crate::store::{BookType, NewSession, SessionStore};

/// Counters for one activity pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct ActivityReport {
    pub considered: usize,
    pub synced: usize,
    pub unmatched: usize,
    pub duplicates: usize,
    /// Highest event id seen, including skipped events
    pub max_id: i64,
}

/// Replay `events` into the session store for `user_id`.
///
/// The first store error aborts the pass so the surrounding transaction
/// rolls back as a unit.
pub async fn replay_activity<S>(
    events: &[ActivityRow],
    index: &CatalogIndex,
    sessions: &mut S,
    user_id: i64,
    watermark: i64,
) -> Result<ActivityReport>
where
    S: SessionStore,
{
    let mut report = ActivityReport {
        max_id: watermark,
        ..Default::default()
    };

    for event in events {
        report.considered += 1;
        report.max_id = report.max_id.max(event.id);

        let doc = event.document();
        let Some(book_id) = resolve(&doc, index) else {
            debug!(
                document_id = %event.document_id,
                title = %doc.title,
                "No catalog match for activity event"
            );
            report.unmatched += 1;
            continue;
        };

        let start = event_start_time(event);
        let duration = event.duration.unwrap_or(0);
        let end = start + Duration::seconds(duration);
        let start_progress = event.start_percentage.unwrap_or(0.0) * 100.0;
        let end_progress = event.end_percentage.unwrap_or(0.0) * 100.0;

        if sessions
            .recent_session_exists(user_id, book_id, start.naive_utc())
            .await?
        {
            report.duplicates += 1;
            continue;
        }

        let session = NewSession {
            user_id,
            book_id,
            book_type: BookType::classify(&doc.title, &doc.filepath),
            start_time: start.naive_utc(),
            end_time: end.naive_utc(),
            duration_seconds: duration,
            start_progress,
            end_progress,
            progress_delta: end_progress - start_progress,
            source_ref: format!("tracker:{}", event.document_id),
        };
        sessions.insert_session(&session).await?;
        report.synced += 1;

        let title = index
            .get(book_id)
            .map(|entry| entry.title.as_str())
            .unwrap_or_default();
        debug!(event_id = event.id, book_id, "Synced session for '{title}'");
    }

    Ok(report)
}

/// Event start time, falling back to the current time when the stored value
/// cannot be parsed
fn event_start_time(event: &ActivityRow) -> DateTime<Utc> {
    let raw = event.start_time.as_deref().unwrap_or("");
    match parse_start_time(raw) {
        Some(ts) => ts,
        None => {
            warn!(
                event_id = event.id,
                raw, "Unparseable activity start time, substituting current time"
            );
            Utc::now()
        }
    }
}

/// Parse the tracker's start time, which shows up as RFC 3339, a naive
/// datetime with `T` or space separator, or a unix epoch
fn parse_start_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    if let Ok(epoch) = raw.parse::<i64>() {
        return Utc.timestamp_opt(epoch, 0).single();
    }

    None
}

// ============================================================================
// Tests
// ============================================================================
