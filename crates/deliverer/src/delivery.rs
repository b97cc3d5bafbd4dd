//! The delivery loop: consume, encode, send, react.
//!
//! A single task owns the whole cycle. Each iteration pulls at most one
//! record from the queue head, encodes it once, and writes the encoded bytes
//! to the gateway, reconnecting on transient transport failures until the
//! per-notification retry budget runs out. An exhausted record goes back to
//! the queue tail unchanged, preserving at-least-once delivery; duplicate
//! delivery is an accepted cost of that guarantee. "Delivered" means the
//! write returned without error — the gateway sends no acknowledgment.

use std::time::Duration;

use uuid::Uuid;

use push_codec::NotificationCodec;
use push_common::config::AppConfig;
use push_common::error::{DeliveryError, Recovery, TransportKind};
use push_common::queue::WorkQueue;
use push_common::types::Notification;

use crate::clock::Sleeper;
use crate::connection::{Connect, GatewayWrite};

/// Write attempts permitted per notification before it is handed back to
/// the queue. Bounds reconnect storms on a flapping link.
pub const RETRY_BUDGET: u32 = 3;

/// Pause durations for the three wait states of the loop.
#[derive(Debug, Clone)]
pub struct DeliveryTimings {
    /// Pause when the queue has no work
    pub empty_poll_interval: Duration,
    /// Pause before an in-budget reconnect
    pub reconnect_backoff: Duration,
    /// Pause after a requeue on budget exhaustion
    pub requeue_backoff: Duration,
}

impl DeliveryTimings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            empty_poll_interval: config.empty_poll_interval(),
            reconnect_backoff: config.reconnect_backoff(),
            requeue_backoff: config.requeue_backoff(),
        }
    }
}

impl Default for DeliveryTimings {
    fn default() -> Self {
        Self {
            empty_poll_interval: Duration::from_secs(1),
            reconnect_backoff: Duration::from_secs(2),
            requeue_backoff: Duration::from_secs(30),
        }
    }
}

/// What a single cycle did. Returned by [`DeliveryLoop::run_once`] so tests
/// can step the state machine without the perpetual loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Queue was empty (or unreadable); the worker slept one poll interval
    Idle,
    /// Notification written to the gateway
    Delivered,
    /// Retry budget exhausted; record returned to the queue tail
    Requeued,
    /// Malformed record logged and discarded
    Dropped,
}

/// Single-stream delivery worker.
///
/// Generic over its collaborators so the retry machine is testable with
/// in-memory fakes: the queue, the connection factory, the codec, and the
/// clock are all injected at construction.
pub struct DeliveryLoop<Q, C, N, S>
where
    Q: WorkQueue,
    C: Connect,
    N: NotificationCodec,
    S: Sleeper,
{
    queue: Q,
    connector: C,
    codec: N,
    sleeper: S,
    timings: DeliveryTimings,
    conn: Option<C::Conn>,
}

impl<Q, C, N, S> DeliveryLoop<Q, C, N, S>
where
    Q: WorkQueue,
    C: Connect,
    N: NotificationCodec,
    S: Sleeper,
{
    pub fn new(queue: Q, connector: C, codec: N, sleeper: S, timings: DeliveryTimings) -> Self {
        Self {
            queue,
            connector,
            codec,
            sleeper,
            timings,
            conn: None,
        }
    }

    /// Connect and run forever. Returns only on a fatal error; a startup
    /// connect failure of any kind propagates before the queue is touched.
    pub async fn run(&mut self) -> Result<(), DeliveryError> {
        tracing::info!("Connecting to push gateway...");
        self.ensure_connected().await?;
        tracing::info!(codec = self.codec.name(), "Delivery worker started");

        loop {
            self.run_once().await?;
        }
    }

    /// Drive one cycle of the state machine.
    pub async fn run_once(&mut self) -> Result<CycleOutcome, DeliveryError> {
        let notification = match self.queue.pop_head().await {
            Ok(Some(notification)) => notification,
            Ok(None) => {
                self.sleeper.sleep(self.timings.empty_poll_interval).await;
                return Ok(CycleOutcome::Idle);
            }
            Err(err) => {
                // The queue connection heals underneath; pause and re-poll
                tracing::error!(error = %err, "Queue poll failed");
                self.sleeper.sleep(self.timings.empty_poll_interval).await;
                return Ok(CycleOutcome::Idle);
            }
        };

        self.attempt(notification).await
    }

    /// Carry one notification from popped to durably handled: delivered,
    /// requeued, or deliberately dropped.
    async fn attempt(&mut self, notification: Notification) -> Result<CycleOutcome, DeliveryError> {
        let delivery_id = Uuid::new_v4();
        let mut budget = RETRY_BUDGET;

        let encoded = match self.codec.encode(&notification) {
            Ok(bytes) => bytes,
            Err(err) => {
                // Deterministic failure: requeueing would cycle the same bad
                // record forever. Log the full record for manual replay.
                tracing::error!(
                    delivery_id = %delivery_id,
                    error = %err,
                    record = %notification,
                    "Unable to encode notification, discarding"
                );
                return Ok(CycleOutcome::Dropped);
            }
        };

        loop {
            match self.write(&encoded).await {
                Ok(()) => {
                    tracing::debug!(
                        delivery_id = %delivery_id,
                        bytes = encoded.len(),
                        "Notification sent"
                    );
                    return Ok(CycleOutcome::Delivered);
                }
                Err(err) => match err.recovery() {
                    Recovery::RetryWithBackoff if budget > 1 => {
                        tracing::error!(
                            delivery_id = %delivery_id,
                            error = %err,
                            "Error in gateway connection, trying to reconnect..."
                        );
                        self.conn = None;
                        self.sleeper.sleep(self.timings.reconnect_backoff).await;
                        budget -= 1;
                        // Next iteration reconnects and resends the same bytes
                    }
                    Recovery::RetryWithBackoff => {
                        tracing::error!(
                            delivery_id = %delivery_id,
                            error = %err,
                            record = %notification,
                            "Retry budget exhausted, returning notification to the queue"
                        );
                        self.requeue(&notification, delivery_id).await;
                        self.conn = None;

                        tracing::info!(
                            pause_ms = self.timings.requeue_backoff.as_millis() as u64,
                            "Attempting to reconnect after backoff..."
                        );
                        self.sleeper.sleep(self.timings.requeue_backoff).await;
                        self.reconnect_best_effort().await?;
                        return Ok(CycleOutcome::Requeued);
                    }
                    // Config during an in-flight reconnect; nothing else
                    // reaches here
                    _ => return Err(err),
                },
            }
        }
    }

    /// Ensure a live connection, then perform one unbuffered write.
    async fn write(&mut self, bytes: &[u8]) -> Result<(), DeliveryError> {
        self.ensure_connected().await?;

        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| DeliveryError::transport(TransportKind::Reset, "no gateway connection"))?;

        conn.write(bytes).await
    }

    async fn ensure_connected(&mut self) -> Result<(), DeliveryError> {
        if self.conn.is_some() {
            return Ok(());
        }
        self.conn = Some(self.connector.connect().await?);
        Ok(())
    }

    /// Hand the original, un-encoded record back to the queue tail.
    async fn requeue(&mut self, notification: &Notification, delivery_id: Uuid) {
        if let Err(err) = self.queue.push_tail(notification).await {
            tracing::error!(
                delivery_id = %delivery_id,
                error = %err,
                record = %notification,
                "Requeue failed; record needs manual replay"
            );
        }
    }

    /// Post-requeue reconnect. Transient failures are left for the next
    /// cycle's lazy reconnect; configuration failures abort the worker.
    async fn reconnect_best_effort(&mut self) -> Result<(), DeliveryError> {
        match self.connector.connect().await {
            Ok(conn) => {
                self.conn = Some(conn);
                Ok(())
            }
            Err(err) if err.is_transient() => {
                tracing::warn!(error = %err, "Reconnect failed; will retry on the next delivery");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}
