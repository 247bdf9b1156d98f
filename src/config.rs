use anyhow::Result;

// ============================================================================
// Configuration Constants
// ============================================================================

const DEFAULT_PORT: u16 = 8080;

/// Per-recipient fast queue cap; oldest entries are evicted on overflow.
const DEFAULT_QUEUE_MAX_LEN: usize = 1000;

/// Rolling TTL for a recipient's fast queue. After this long without
/// activity the whole list is reclaimed by the store.
const DEFAULT_MESSAGE_TTL_DAYS: i64 = 30;

/// Presence keys expire after this long without a heartbeat.
const DEFAULT_PRESENCE_TTL_SECS: i64 = 300;

const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;

pub const SECONDS_PER_DAY: i64 = 86_400;

/// Hard cap on a message body, counted in characters.
pub const MAX_BODY_CHARS: usize = 1000;

// ============================================================================
// Configuration
// ============================================================================

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub port: u16,
    pub queue_max_len: usize,
    pub message_ttl_days: i64,
    pub presence_ttl_secs: i64,
    pub db_max_connections: u32,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")?,
            redis_url: std::env::var("REDIS_URL")?,
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            queue_max_len: std::env::var("QUEUE_MAX_LEN")
                .ok()
                .and_then(|n| n.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(DEFAULT_QUEUE_MAX_LEN),
            message_ttl_days: std::env::var("MESSAGE_TTL_DAYS")
                .ok()
                .and_then(|d| d.parse().ok())
                .filter(|d| *d > 0)
                .unwrap_or(DEFAULT_MESSAGE_TTL_DAYS),
            presence_ttl_secs: std::env::var("PRESENCE_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|s| *s > 0)
                .unwrap_or(DEFAULT_PRESENCE_TTL_SECS),
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS),
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }

    pub fn message_ttl_seconds(&self) -> i64 {
        self.message_ttl_days * SECONDS_PER_DAY
    }
}
