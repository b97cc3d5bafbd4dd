//! Work queue contract and its Redis list adapter.
//!
//! The queue holds serialized notification records in FIFO order. Producers
//! (other processes) append to the tail; this worker is the single consumer
//! popping from the head. A record popped and then lost to a terminal
//! transient failure is pushed back to the tail, giving at-least-once
//! delivery across worker restarts.

use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use crate::error::DeliveryError;
use crate::types::Notification;

/// FIFO queue of serialized notification records.
pub trait WorkQueue {
    /// Pop one record from the head. Non-blocking: returns `None` immediately
    /// when the queue is empty.
    fn pop_head(
        &mut self,
    ) -> impl std::future::Future<Output = Result<Option<Notification>, DeliveryError>> + Send;

    /// Append a record to the tail.
    fn push_tail(
        &mut self,
        notification: &Notification,
    ) -> impl std::future::Future<Output = Result<(), DeliveryError>> + Send;
}

/// Redis list adapter: `LPOP` from the head, `RPUSH` to the tail.
pub struct RedisQueue {
    conn: ConnectionManager,
    key: String,
}

impl RedisQueue {
    /// Connect to Redis and bind to the given list key.
    ///
    /// The underlying connection manager re-establishes dropped connections
    /// on its own; queue operations surface the error for the cycle in which
    /// it happened and succeed again once the manager has recovered.
    pub async fn connect(redis_url: &str, queue_key: impl Into<String>) -> Result<Self, DeliveryError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        let key = queue_key.into();

        tracing::info!(key = %key, "Connected to Redis work queue");
        Ok(Self { conn, key })
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl WorkQueue for RedisQueue {
    async fn pop_head(&mut self) -> Result<Option<Notification>, DeliveryError> {
        let raw: Option<String> = self.conn.lpop(&self.key, None).await?;
        Ok(raw.map(Notification::from))
    }

    async fn push_tail(&mut self, notification: &Notification) -> Result<(), DeliveryError> {
        let _: i64 = self.conn.rpush(&self.key, notification.as_str()).await?;
        tracing::debug!(key = %self.key, "Record pushed to queue tail");
        Ok(())
    }
}
