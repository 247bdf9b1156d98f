// ============================================================================
// Fast Queue Manager
// ============================================================================
//
// One bounded, TTL-limited list per recipient, keyed by recipient id, plus
// the adjacent per-conversation key families (unread counters, typing
// flags) that live in the same fast store.
//
// Entries are independent snapshots; a past entry is never mutated.
// Everything here is best-effort acceleration: the durable log holds the
// authoritative history and losing a fast-store key is recoverable.
//
// ============================================================================

use std::sync::Arc;
use uuid::Uuid;

use crate::config::Config;
use crate::message::QueueEntry;
use crate::store::{KeyedStore, StoreError};

const QUEUE_KEY_PREFIX: &str = "queue:";
const UNREAD_KEY_PREFIX: &str = "unread:";
const TYPING_KEY_PREFIX: &str = "typing:";

/// Typing flags are short-lived by design.
const TYPING_TTL_SECONDS: i64 = 5;

pub struct MessageQueue {
    store: Arc<dyn KeyedStore>,
    max_len: usize,
    ttl_seconds: i64,
}

impl MessageQueue {
    pub fn new(store: Arc<dyn KeyedStore>, config: &Config) -> Self {
        Self {
            store,
            max_len: config.queue_max_len,
            ttl_seconds: config.message_ttl_seconds(),
        }
    }

    fn queue_key(recipient: Uuid) -> String {
        format!("{}{}", QUEUE_KEY_PREFIX, recipient)
    }

    fn unread_key(recipient: Uuid, sender: Uuid) -> String {
        format!("{}{}:{}", UNREAD_KEY_PREFIX, recipient, sender)
    }

    fn typing_key(recipient: Uuid, sender: Uuid) -> String {
        format!("{}{}:{}", TYPING_KEY_PREFIX, recipient, sender)
    }

    /// Appends a snapshot to the recipient's queue, trimming to the most
    /// recent `max_len` entries and refreshing the rolling TTL.
    pub async fn push_entry(&self, entry: &QueueEntry) -> Result<(), StoreError> {
        let payload = serde_json::to_string(entry)
            .map_err(|e| StoreError::Unavailable(format!("entry serialization failed: {}", e)))?;
        self.store
            .push_capped(&Self::queue_key(entry.to), &payload, self.max_len, self.ttl_seconds)
            .await?;
        tracing::debug!(recipient = %entry.to, sender = %entry.from, "Queued message snapshot");
        Ok(())
    }

    /// Raw serialized entries from the head of the recipient's queue, newest
    /// first. Deserialization and cursor filtering belong to the resolver.
    pub async fn raw_entries(
        &self,
        recipient: Uuid,
        limit: usize,
    ) -> Result<Vec<String>, StoreError> {
        self.store.list_range(&Self::queue_key(recipient), limit).await
    }

    pub async fn increment_unread(&self, recipient: Uuid, sender: Uuid) -> Result<i64, StoreError> {
        self.store
            .incr_with_ttl(&Self::unread_key(recipient, sender), self.ttl_seconds)
            .await
    }

    pub async fn unread_count(&self, recipient: Uuid, sender: Uuid) -> Result<i64, StoreError> {
        self.store.read_counter(&Self::unread_key(recipient, sender)).await
    }

    pub async fn clear_unread(&self, recipient: Uuid, sender: Uuid) -> Result<(), StoreError> {
        self.store.remove(&Self::unread_key(recipient, sender)).await
    }

    /// Flags `sender` as typing toward `recipient` for a few seconds.
    pub async fn set_typing(&self, sender: Uuid, recipient: Uuid) -> Result<(), StoreError> {
        self.store
            .put_with_ttl(&Self::typing_key(recipient, sender), "1", TYPING_TTL_SECONDS)
            .await
    }

    pub async fn is_typing(&self, recipient: Uuid, sender: Uuid) -> Result<bool, StoreError> {
        self.store.exists(&Self::typing_key(recipient, sender)).await
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        self.store.ping().await
    }
}
