//! Single-stream push-notification delivery worker.
//!
//! Pops serialized records from the work queue, encodes them through the
//! configured codec, and writes them over a long-lived client-authenticated
//! TLS connection to the push gateway, with a bounded reconnect/requeue
//! policy preserving at-least-once delivery.

pub mod clock;
pub mod connection;
pub mod delivery;

pub use clock::{Sleeper, TokioSleeper};
pub use connection::{Connect, ConnectionManager, GatewayConnection, GatewayWrite};
pub use delivery::{CycleOutcome, DeliveryLoop, DeliveryTimings, RETRY_BUDGET};
