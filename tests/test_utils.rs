use async_trait::async_trait;
use duet_messaging::{
    config::Config,
    context::AppContext,
    db::MemoryMessageLog,
    presence::PresenceRegistry,
    queue::MessageQueue,
    routes::create_router,
    store::{KeyedStore, MemoryStore, StoreError},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use uuid::Uuid;

pub fn test_config(queue_max_len: usize) -> Config {
    Config {
        database_url: String::new(),
        redis_url: String::new(),
        port: 0,
        queue_max_len,
        message_ttl_days: 30,
        presence_ttl_secs: 300,
        db_max_connections: 5,
        rust_log: "info".to_string(),
    }
}

/// Fast store stand-in that refuses every operation, simulating an outage.
pub struct FailingStore;

#[async_trait]
impl KeyedStore for FailingStore {
    async fn push_capped(
        &self,
        _key: &str,
        _entry: &str,
        _max_len: usize,
        _ttl_seconds: i64,
    ) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("simulated outage".to_string()))
    }

    async fn list_range(&self, _key: &str, _limit: usize) -> Result<Vec<String>, StoreError> {
        Err(StoreError::Unavailable("simulated outage".to_string()))
    }

    async fn incr_with_ttl(&self, _key: &str, _ttl_seconds: i64) -> Result<i64, StoreError> {
        Err(StoreError::Unavailable("simulated outage".to_string()))
    }

    async fn read_counter(&self, _key: &str) -> Result<i64, StoreError> {
        Err(StoreError::Unavailable("simulated outage".to_string()))
    }

    async fn put_with_ttl(
        &self,
        _key: &str,
        _value: &str,
        _ttl_seconds: i64,
    ) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("simulated outage".to_string()))
    }

    async fn exists(&self, _key: &str) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("simulated outage".to_string()))
    }

    async fn remove(&self, _key: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("simulated outage".to_string()))
    }

    async fn set_add(&self, _key: &str, _member: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("simulated outage".to_string()))
    }

    async fn set_remove(&self, _key: &str, _member: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("simulated outage".to_string()))
    }

    async fn set_members(&self, _key: &str) -> Result<Vec<String>, StoreError> {
        Err(StoreError::Unavailable("simulated outage".to_string()))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("simulated outage".to_string()))
    }
}

pub struct TestApp {
    pub address: String,
    pub http: reqwest::Client,
    pub log: Arc<MemoryMessageLog>,
    pub store: Arc<MemoryStore>,
}

impl TestApp {
    /// Registers a fresh user with the durable log mirror.
    pub fn register_user(&self) -> Uuid {
        let user_id = Uuid::new_v4();
        self.log.insert_user(user_id);
        user_id
    }
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with_queue_cap(1000).await
}

pub async fn spawn_app_with_queue_cap(queue_max_len: usize) -> TestApp {
    let config = Arc::new(test_config(queue_max_len));
    let store = Arc::new(MemoryStore::new());
    let log = Arc::new(MemoryMessageLog::new());

    let address = serve(store.clone(), log.clone(), config).await;

    TestApp {
        address,
        http: reqwest::Client::new(),
        log,
        store,
    }
}

/// Spawns an app whose fast store is down; the durable log still works.
pub async fn spawn_unavailable_app() -> (String, Arc<MemoryMessageLog>, reqwest::Client) {
    let config = Arc::new(test_config(1000));
    let log = Arc::new(MemoryMessageLog::new());

    let address = serve(Arc::new(FailingStore), log.clone(), config).await;

    (address, log, reqwest::Client::new())
}

async fn serve(
    store: Arc<dyn KeyedStore>,
    log: Arc<MemoryMessageLog>,
    config: Arc<Config>,
) -> String {
    let queue = Arc::new(MessageQueue::new(store.clone(), &config));
    let presence = Arc::new(PresenceRegistry::new(store, config.presence_ttl_secs));
    let ctx = Arc::new(AppContext::new(log, queue, presence, config));
    let router = create_router(ctx);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    format!("http://{}", addr)
}
