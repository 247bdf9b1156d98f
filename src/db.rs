// ============================================================================
// Durable Message Log
// ============================================================================
//
// Authoritative persisted store of every message ever sent. A message is
// never visible to any poller before its durable record exists; the fast
// queue only accelerates what is already recorded here.
//
// ============================================================================

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use thiserror::Error;
use uuid::Uuid;

use crate::config::Config;
use crate::message::Message;

pub type DbPool = Pool<Postgres>;

#[derive(Debug, Error)]
pub enum LogError {
    #[error("durable store failure: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for LogError {
    fn from(err: sqlx::Error) -> Self {
        LogError::Backend(err.to_string())
    }
}

/// Narrow boundary toward the durable message log.
///
/// `fetch_since` and `fetch_conversation` are reconciliation reads against
/// the full history; the polling hot path never touches this store.
#[async_trait]
pub trait MessageLog: Send + Sync {
    async fn append(&self, message: &Message) -> Result<(), LogError>;

    /// All messages addressed to `user_id`, optionally newer than `since`
    /// (milliseconds), in chronological order.
    async fn fetch_since(&self, user_id: Uuid, since: Option<i64>)
        -> Result<Vec<Message>, LogError>;

    /// Both directions of the conversation between two users, chronological,
    /// capped at the most recent `limit` messages.
    async fn fetch_conversation(
        &self,
        user_a: Uuid,
        user_b: Uuid,
        limit: usize,
    ) -> Result<Vec<Message>, LogError>;

    async fn user_exists(&self, user_id: Uuid) -> Result<bool, LogError>;

    async fn ping(&self) -> Result<(), LogError>;
}

pub async fn create_pool(config: &Config) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await
}

// ============================================================================
// Postgres implementation
// ============================================================================

pub struct PgMessageLog {
    pool: DbPool,
}

impl PgMessageLog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageLog for PgMessageLog {
    async fn append(&self, message: &Message) -> Result<(), LogError> {
        sqlx::query(
            r#"
            INSERT INTO messages (id, sender_id, recipient_id, body, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(message.id)
        .bind(message.sender_id)
        .bind(message.recipient_id)
        .bind(&message.body)
        .bind(message.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fetch_since(
        &self,
        user_id: Uuid,
        since: Option<i64>,
    ) -> Result<Vec<Message>, LogError> {
        let messages = sqlx::query_as::<_, Message>(
            r#"
            SELECT id, sender_id, recipient_id, body, created_at
            FROM messages
            WHERE recipient_id = $1 AND created_at > $2
            ORDER BY created_at ASC
            "#,
        )
        .bind(user_id)
        .bind(since.unwrap_or(0))
        .fetch_all(&self.pool)
        .await?;
        Ok(messages)
    }

    async fn fetch_conversation(
        &self,
        user_a: Uuid,
        user_b: Uuid,
        limit: usize,
    ) -> Result<Vec<Message>, LogError> {
        // Newest window first, then flipped back to chronological order.
        let mut messages = sqlx::query_as::<_, Message>(
            r#"
            SELECT id, sender_id, recipient_id, body, created_at
            FROM messages
            WHERE (sender_id = $1 AND recipient_id = $2)
               OR (sender_id = $2 AND recipient_id = $1)
            ORDER BY created_at DESC
            LIMIT $3
            "#,
        )
        .bind(user_a)
        .bind(user_b)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        messages.reverse();
        Ok(messages)
    }

    async fn user_exists(&self, user_id: Uuid) -> Result<bool, LogError> {
        let exists: (bool,) =
            sqlx::query_as(r#"SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)"#)
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists.0)
    }

    async fn ping(&self) -> Result<(), LogError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// ============================================================================
// In-memory implementation
// ============================================================================

use std::collections::HashSet;
use std::sync::Mutex;

/// In-memory [`MessageLog`] used by the test suite and local development.
#[derive(Default)]
pub struct MemoryMessageLog {
    users: Mutex<HashSet<Uuid>>,
    messages: Mutex<Vec<Message>>,
}

impl MemoryMessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a user id so `user_exists` resolves it. User lifecycle is
    /// owned by the wider platform; this mirror exists for tests and demos.
    pub fn insert_user(&self, user_id: Uuid) {
        self.users.lock().unwrap().insert(user_id);
    }
}

#[async_trait]
impl MessageLog for MemoryMessageLog {
    async fn append(&self, message: &Message) -> Result<(), LogError> {
        self.messages.lock().unwrap().push(message.clone());
        Ok(())
    }

    async fn fetch_since(
        &self,
        user_id: Uuid,
        since: Option<i64>,
    ) -> Result<Vec<Message>, LogError> {
        let floor = since.unwrap_or(0);
        let mut messages: Vec<Message> = self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.recipient_id == user_id && m.created_at > floor)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }

    async fn fetch_conversation(
        &self,
        user_a: Uuid,
        user_b: Uuid,
        limit: usize,
    ) -> Result<Vec<Message>, LogError> {
        let mut messages: Vec<Message> = self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| {
                (m.sender_id == user_a && m.recipient_id == user_b)
                    || (m.sender_id == user_b && m.recipient_id == user_a)
            })
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.created_at);
        if messages.len() > limit {
            messages.drain(..messages.len() - limit);
        }
        Ok(messages)
    }

    async fn user_exists(&self, user_id: Uuid) -> Result<bool, LogError> {
        Ok(self.users.lock().unwrap().contains(&user_id))
    }

    async fn ping(&self) -> Result<(), LogError> {
        Ok(())
    }
}
