// ============================================================================
// Fast Store Abstraction
// ============================================================================
//
// The fast queue store is an external collaborator reached only through the
// narrow KeyedStore interface. Production deployments use Redis; tests and
// local development use the in-memory implementation. Entries held here are
// bounded and TTL-limited: losing them is acceptable, the durable log is the
// source of truth.
//
// ============================================================================

use async_trait::async_trait;
use redis::AsyncCommands;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("fast store unavailable: {0}")]
    Unavailable(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// Narrow interface over the fast keyed store.
///
/// Every mutation is a single atomic operation against the store, so
/// concurrent writers to the same key never need additional locking.
#[async_trait]
pub trait KeyedStore: Send + Sync {
    /// Appends `entry` at the head of the list at `key`, trims the list to
    /// the most recent `max_len` entries and refreshes the rolling TTL.
    async fn push_capped(
        &self,
        key: &str,
        entry: &str,
        max_len: usize,
        ttl_seconds: i64,
    ) -> Result<(), StoreError>;

    /// Returns up to `limit` entries from the head of the list at `key`
    /// (newest first). A missing key yields an empty list.
    async fn list_range(&self, key: &str, limit: usize) -> Result<Vec<String>, StoreError>;

    /// Increments the counter at `key`, refreshing its TTL, and returns the
    /// new value.
    async fn incr_with_ttl(&self, key: &str, ttl_seconds: i64) -> Result<i64, StoreError>;

    /// Reads the counter at `key`; a missing key reads as zero.
    async fn read_counter(&self, key: &str) -> Result<i64, StoreError>;

    async fn put_with_ttl(&self, key: &str, value: &str, ttl_seconds: i64)
        -> Result<(), StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    async fn set_add(&self, key: &str, member: &str) -> Result<(), StoreError>;

    async fn set_remove(&self, key: &str, member: &str) -> Result<(), StoreError>;

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

// ============================================================================
// Redis implementation
// ============================================================================

pub struct RedisStore {
    conn: redis::aio::ConnectionManager,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| StoreError::Unavailable(format!("invalid Redis URL: {}", e)))?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl KeyedStore for RedisStore {
    async fn push_capped(
        &self,
        key: &str,
        entry: &str,
        max_len: usize,
        ttl_seconds: i64,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        // MULTI/EXEC so append, trim and TTL refresh land as one unit.
        let mut pipe = redis::pipe();
        pipe.atomic()
            .lpush(key, entry)
            .ignore()
            .ltrim(key, 0, max_len as isize - 1)
            .ignore()
            .expire(key, ttl_seconds)
            .ignore();
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn list_range(&self, key: &str, limit: usize) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        let entries: Vec<String> = conn.lrange(key, 0, limit as isize - 1).await?;
        Ok(entries)
    }

    async fn incr_with_ttl(&self, key: &str, ttl_seconds: i64) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        let count: i64 = conn.incr(key, 1).await?;
        let _: () = conn.expire(key, ttl_seconds).await?;
        Ok(count)
    }

    async fn read_counter(&self, key: &str) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        let count: Option<i64> = conn.get(key).await?;
        Ok(count.unwrap_or(0))
    }

    async fn put_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: i64,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(key, value, ttl_seconds.max(0) as u64).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.sadd(key, member).await?;
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.srem(key, member).await?;
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn.smembers(key).await?;
        Ok(members)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

// ============================================================================
// In-memory implementation
// ============================================================================

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug)]
enum Slot {
    List(VecDeque<String>),
    Text(String),
    Counter(i64),
    Set(BTreeSet<String>),
}

#[derive(Debug)]
struct Entry {
    slot: Slot,
    expires_at: Option<Instant>,
}

impl Entry {
    fn expired(&self, now: Instant) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

/// In-memory [`KeyedStore`] with the same bounded-list and TTL semantics as
/// the Redis implementation. Used by the test suite and local development.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn deadline(ttl_seconds: i64) -> Option<Instant> {
        Some(Instant::now() + Duration::from_secs(ttl_seconds.max(0) as u64))
    }
}

fn purge_expired(entries: &mut HashMap<String, Entry>) {
    let now = Instant::now();
    entries.retain(|_, entry| !entry.expired(now));
}

#[async_trait]
impl KeyedStore for MemoryStore {
    async fn push_capped(
        &self,
        key: &str,
        entry: &str,
        max_len: usize,
        ttl_seconds: i64,
    ) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap();
        purge_expired(&mut entries);
        let slot = entries.entry(key.to_string()).or_insert_with(|| Entry {
            slot: Slot::List(VecDeque::new()),
            expires_at: None,
        });
        if let Slot::List(list) = &mut slot.slot {
            list.push_front(entry.to_string());
            list.truncate(max_len);
        } else {
            slot.slot = Slot::List(VecDeque::from([entry.to_string()]));
        }
        slot.expires_at = Self::deadline(ttl_seconds);
        Ok(())
    }

    async fn list_range(&self, key: &str, limit: usize) -> Result<Vec<String>, StoreError> {
        let mut entries = self.entries.lock().unwrap();
        purge_expired(&mut entries);
        match entries.get(key) {
            Some(Entry {
                slot: Slot::List(list),
                ..
            }) => Ok(list.iter().take(limit).cloned().collect()),
            _ => Ok(Vec::new()),
        }
    }

    async fn incr_with_ttl(&self, key: &str, ttl_seconds: i64) -> Result<i64, StoreError> {
        let mut entries = self.entries.lock().unwrap();
        purge_expired(&mut entries);
        let slot = entries.entry(key.to_string()).or_insert_with(|| Entry {
            slot: Slot::Counter(0),
            expires_at: None,
        });
        let value = if let Slot::Counter(count) = &mut slot.slot {
            *count += 1;
            *count
        } else {
            slot.slot = Slot::Counter(1);
            1
        };
        slot.expires_at = Self::deadline(ttl_seconds);
        Ok(value)
    }

    async fn read_counter(&self, key: &str) -> Result<i64, StoreError> {
        let mut entries = self.entries.lock().unwrap();
        purge_expired(&mut entries);
        match entries.get(key) {
            Some(Entry {
                slot: Slot::Counter(count),
                ..
            }) => Ok(*count),
            _ => Ok(0),
        }
    }

    async fn put_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: i64,
    ) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap();
        purge_expired(&mut entries);
        entries.insert(
            key.to_string(),
            Entry {
                slot: Slot::Text(value.to_string()),
                expires_at: Self::deadline(ttl_seconds),
            },
        );
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut entries = self.entries.lock().unwrap();
        purge_expired(&mut entries);
        Ok(entries.contains_key(key))
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap();
        entries.remove(key);
        Ok(())
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap();
        purge_expired(&mut entries);
        let slot = entries.entry(key.to_string()).or_insert_with(|| Entry {
            slot: Slot::Set(BTreeSet::new()),
            expires_at: None,
        });
        if let Slot::Set(set) = &mut slot.slot {
            set.insert(member.to_string());
        } else {
            slot.slot = Slot::Set(BTreeSet::from([member.to_string()]));
        }
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap();
        purge_expired(&mut entries);
        if let Some(Entry {
            slot: Slot::Set(set),
            ..
        }) = entries.get_mut(key)
        {
            set.remove(member);
        }
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut entries = self.entries.lock().unwrap();
        purge_expired(&mut entries);
        match entries.get(key) {
            Some(Entry {
                slot: Slot::Set(set),
                ..
            }) => Ok(set.iter().cloned().collect()),
            _ => Ok(Vec::new()),
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
