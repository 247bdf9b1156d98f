// ============================================================================
// Poll Resolver
// ============================================================================
//
// Computes the delta of messages newer than a client-supplied cursor from
// the recipient's bounded fast queue. An unreachable fast store is reported
// as a distinct transient failure, never conflated with "no new messages".
//
// ============================================================================

use uuid::Uuid;

use crate::db::MessageLog;
use crate::error::{AppError, AppResult};
use crate::message::QueueEntry;
use crate::metrics;
use crate::queue::MessageQueue;

pub const DEFAULT_POLL_LIMIT: usize = 50;
pub const MAX_POLL_LIMIT: usize = 100;

/// Clamps a requested limit into `[1, MAX_POLL_LIMIT]`; absent or
/// out-of-range values fall back to the default window.
pub fn clamp_limit(raw: Option<i64>) -> usize {
    match raw {
        Some(limit) if (1..=MAX_POLL_LIMIT as i64).contains(&limit) => limit as usize,
        Some(limit) => {
            tracing::debug!(limit, "Out-of-range poll limit, using default");
            DEFAULT_POLL_LIMIT
        }
        None => DEFAULT_POLL_LIMIT,
    }
}

/// Parses the client cursor. An unparseable value is ignored (the full
/// recent window is returned), a defined fallback rather than a hard error.
pub fn parse_since(raw: Option<&str>) -> Option<i64> {
    let raw = raw?;
    match raw.parse::<i64>() {
        Ok(since) => Some(since),
        Err(_) => {
            tracing::debug!(since = %raw, "Unparseable since cursor, ignoring");
            None
        }
    }
}

/// Returns entries with `timestamp > since` in chronological order (oldest
/// first). Entries that fail to deserialize are skipped and logged; they
/// never abort the response.
pub async fn resolve_new_messages(
    log: &dyn MessageLog,
    queue: &MessageQueue,
    user_id: Uuid,
    since: Option<i64>,
    limit: usize,
) -> AppResult<Vec<QueueEntry>> {
    metrics::POLL_REQUESTS_TOTAL.inc();

    let known = log
        .user_exists(user_id)
        .await
        .map_err(|e| AppError::internal(e.to_string()))?;
    if !known {
        return Err(AppError::NotFound(format!("user {} does not exist", user_id)));
    }

    // Newest `limit` snapshots, head-first. StoreError maps to a 503-shaped
    // TransientStore signal via From.
    let raw = queue.raw_entries(user_id, limit).await?;

    let floor = since.unwrap_or(i64::MIN);
    let mut entries: Vec<QueueEntry> = Vec::with_capacity(raw.len());
    for payload in &raw {
        match serde_json::from_str::<QueueEntry>(payload) {
            Ok(entry) => {
                if entry.timestamp > floor {
                    entries.push(entry);
                }
            }
            Err(e) => {
                metrics::QUEUE_ENTRIES_DROPPED_TOTAL.inc();
                tracing::warn!(
                    error = %e,
                    user_id = %user_id,
                    "Skipping undecodable fast-queue entry"
                );
            }
        }
    }

    // The list is newest-first; reversing restores chronological order and
    // keeps insertion order for entries sharing a timestamp.
    entries.reverse();

    tracing::debug!(
        user_id = %user_id,
        scanned = raw.len(),
        returned = entries.len(),
        "Resolved poll window"
    );

    Ok(entries)
}
