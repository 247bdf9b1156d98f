use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod health;
pub mod ingest;
pub mod message;
pub mod metrics;
pub mod poller;
pub mod presence;
pub mod queue;
pub mod resolver;
pub mod routes;
pub mod store;

use config::Config;
use context::AppContext;
use db::PgMessageLog;
use presence::PresenceRegistry;
use queue::MessageQueue;
use store::{KeyedStore, RedisStore};

pub async fn run() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Arc::new(Config::from_env()?);

    // Connect to the durable log
    let db_pool = db::create_pool(&config).await?;
    tracing::info!("Connected to database");

    tracing::info!("Applying database migrations...");
    sqlx::migrate!().run(&db_pool).await?;
    tracing::info!("Database migrations applied successfully.");

    // Connect to the fast store
    let store: Arc<dyn KeyedStore> = Arc::new(
        tokio::time::timeout(Duration::from_secs(10), RedisStore::connect(&config.redis_url))
            .await
            .map_err(|_| anyhow::anyhow!("Redis connection timed out after 10 seconds"))??,
    );
    tracing::info!("Connected to Redis");

    let log = Arc::new(PgMessageLog::new(db_pool));
    let queue = Arc::new(MessageQueue::new(store.clone(), &config));
    let presence = Arc::new(PresenceRegistry::new(store, config.presence_ttl_secs));

    let app_context = Arc::new(AppContext::new(log, queue, presence, config.clone()));
    let app = routes::create_router(app_context);

    let bind_address = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&bind_address).await?;
    tracing::info!("Duet messaging listening on {}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = signal::ctrl_c().await;
            tracing::info!("Shutdown signal received. Shutting down...");
        })
        .await?;

    Ok(())
}
