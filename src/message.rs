use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A delivered direct message. Immutable once created; the durable log is the
/// only structure guaranteed to hold the full history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub body: String,
    /// Milliseconds since the Unix epoch, monotonically assigned at ingestion.
    pub created_at: i64,
}

/// Wire snapshot of a [`Message`] pushed onto the recipient's fast queue.
///
/// A copy, not a reference: fast-queue eviction never affects the durable
/// record, and a past entry is never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub from: Uuid,
    pub to: Uuid,
    pub body: String,
    pub timestamp: i64,
}

impl From<&Message> for QueueEntry {
    fn from(message: &Message) -> Self {
        Self {
            from: message.sender_id,
            to: message.recipient_id,
            body: message.body.clone(),
            timestamp: message.created_at,
        }
    }
}
