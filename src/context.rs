use std::sync::Arc;

use crate::config::Config;
use crate::db::MessageLog;
use crate::ingest::MonotonicClock;
use crate::presence::PresenceRegistry;
use crate::queue::MessageQueue;

/// Application context containing shared dependencies.
#[derive(Clone)]
pub struct AppContext {
    pub log: Arc<dyn MessageLog>,
    pub queue: Arc<MessageQueue>,
    pub presence: Arc<PresenceRegistry>,
    pub clock: Arc<MonotonicClock>,
    pub config: Arc<Config>,
}

impl AppContext {
    pub fn new(
        log: Arc<dyn MessageLog>,
        queue: Arc<MessageQueue>,
        presence: Arc<PresenceRegistry>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            log,
            queue,
            presence,
            clock: Arc::new(MonotonicClock::new()),
            config,
        }
    }
}
