// ============================================================================
// Online Presence Registry
// ============================================================================
//
// Tracks which users are currently online. Each user holds a TTL'd presence
// key refreshed by heartbeats, plus membership in a shared set used for
// listing. The set can go stale between heartbeats; listing prunes members
// whose presence key has expired.
//
// ============================================================================

use std::sync::Arc;
use uuid::Uuid;

use crate::store::{KeyedStore, StoreError};

const ONLINE_KEY_PREFIX: &str = "online:";
const ONLINE_SET_KEY: &str = "online_users";

pub struct PresenceRegistry {
    store: Arc<dyn KeyedStore>,
    ttl_seconds: i64,
}

impl PresenceRegistry {
    pub fn new(store: Arc<dyn KeyedStore>, ttl_seconds: i64) -> Self {
        Self { store, ttl_seconds }
    }

    fn online_key(user_id: Uuid) -> String {
        format!("{}{}", ONLINE_KEY_PREFIX, user_id)
    }

    /// Marks the user online, refreshing the TTL if already online.
    pub async fn mark_online(&self, user_id: Uuid) -> Result<(), StoreError> {
        let stamp = chrono::Utc::now().to_rfc3339();
        self.store
            .put_with_ttl(&Self::online_key(user_id), &stamp, self.ttl_seconds)
            .await?;
        self.store
            .set_add(ONLINE_SET_KEY, &user_id.to_string())
            .await?;
        tracing::debug!(user_id = %user_id, "User marked online");
        Ok(())
    }

    pub async fn mark_offline(&self, user_id: Uuid) -> Result<(), StoreError> {
        self.store.remove(&Self::online_key(user_id)).await?;
        self.store
            .set_remove(ONLINE_SET_KEY, &user_id.to_string())
            .await?;
        tracing::debug!(user_id = %user_id, "User marked offline");
        Ok(())
    }

    pub async fn is_online(&self, user_id: Uuid) -> Result<bool, StoreError> {
        self.store.exists(&Self::online_key(user_id)).await
    }

    /// Lists online users, pruning set members whose presence key expired.
    pub async fn online_users(&self) -> Result<Vec<Uuid>, StoreError> {
        let members = self.store.set_members(ONLINE_SET_KEY).await?;
        let mut online = Vec::with_capacity(members.len());
        for member in members {
            let Ok(user_id) = Uuid::parse_str(&member) else {
                self.store.set_remove(ONLINE_SET_KEY, &member).await?;
                continue;
            };
            if self.is_online(user_id).await? {
                online.push(user_id);
            } else {
                self.store.set_remove(ONLINE_SET_KEY, &member).await?;
            }
        }
        Ok(online)
    }
}
