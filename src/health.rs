use anyhow::Result;

use crate::db::MessageLog;
use crate::queue::MessageQueue;

pub async fn health_check(log: &dyn MessageLog, queue: &MessageQueue) -> Result<()> {
    // Check the durable log
    log.ping().await?;

    // Check the fast store
    queue.ping().await?;

    Ok(())
}
