// ============================================================================
// Ingestion Handler
// ============================================================================
//
// Dual-writes an outgoing message: the durable record first (mandatory, the
// whole send fails without it), then a best-effort push of a snapshot into
// the recipient's fast queue. The two writes are intentionally not
// transactional; fast-path visibility is opportunistic and a missed push
// degrades to eventual visibility via reconciliation against the log.
//
// ============================================================================

use std::sync::atomic::{AtomicI64, Ordering};
use uuid::Uuid;

use crate::config::MAX_BODY_CHARS;
use crate::db::MessageLog;
use crate::error::{AppError, AppResult};
use crate::message::{Message, QueueEntry};
use crate::metrics;
use crate::queue::MessageQueue;

/// Mints strictly increasing millisecond timestamps within this process, so
/// a burst of sends in the same millisecond still gets a total order and the
/// client's max-timestamp cursor rule never skips an entry.
pub struct MonotonicClock {
    last: AtomicI64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            last: AtomicI64::new(0),
        }
    }

    pub fn next_millis(&self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(last + 1);
            match self.last.compare_exchange_weak(
                last,
                candidate,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return candidate,
                Err(observed) => last = observed,
            }
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Validates and sends one direct message, returning the created record.
pub async fn ingest_message(
    log: &dyn MessageLog,
    queue: &MessageQueue,
    clock: &MonotonicClock,
    sender_id: Uuid,
    recipient_id: Uuid,
    body: &str,
) -> AppResult<Message> {
    let body = body.trim();
    if body.is_empty() {
        return Err(AppError::validation("message body must not be empty"));
    }
    if body.chars().count() > MAX_BODY_CHARS {
        return Err(AppError::Validation(format!(
            "message body exceeds {} characters",
            MAX_BODY_CHARS
        )));
    }

    let recipient_known = log
        .user_exists(recipient_id)
        .await
        .map_err(|e| AppError::internal(e.to_string()))?;
    if !recipient_known {
        return Err(AppError::NotFound(format!(
            "recipient {} does not exist",
            recipient_id
        )));
    }

    let message = Message {
        id: Uuid::new_v4(),
        sender_id,
        recipient_id,
        body: body.to_string(),
        created_at: clock.next_millis(),
    };

    // The durable record must exist before the message is visible anywhere.
    log.append(&message)
        .await
        .map_err(|e| AppError::DurableWrite(e.to_string()))?;

    metrics::MESSAGES_SENT_TOTAL.inc();

    // Best effort from here on: the send already succeeded durably.
    let entry = QueueEntry::from(&message);
    if let Err(e) = queue.push_entry(&entry).await {
        metrics::FAST_QUEUE_FAILURES_TOTAL.inc();
        tracing::warn!(
            error = %e,
            message_id = %message.id,
            recipient_id = %recipient_id,
            "Fast-queue push failed; message remains durable and reconcilable"
        );
    }

    if let Err(e) = queue.increment_unread(recipient_id, sender_id).await {
        tracing::warn!(
            error = %e,
            recipient_id = %recipient_id,
            "Failed to bump unread counter"
        );
    }

    tracing::info!(
        message_id = %message.id,
        sender_id = %sender_id,
        recipient_id = %recipient_id,
        created_at = message.created_at,
        "Message sent"
    );

    Ok(message)
}
