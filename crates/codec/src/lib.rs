pub mod frame;

use push_common::types::Notification;
use thiserror::Error;

pub use frame::BinaryFrameCodec;

/// Failure modes for turning a queue record into gateway wire bytes.
///
/// Every variant is deterministic: the same record fails the same way on
/// every attempt, so these are never retried.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("record is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("device token must be {expected} bytes of hex: {detail}")]
    Token { expected: usize, detail: String },

    #[error("payload is {0} bytes, exceeding the gateway limit of {1}")]
    PayloadTooLarge(usize, usize),
}

/// Trait that notification wire codecs implement.
///
/// Purely computational: no I/O, no internal state. The worker encodes each
/// record exactly once per delivery cycle and resends the same bytes on
/// every retry.
pub trait NotificationCodec: Send + Sync {
    /// Convert a queue record into the gateway's binary wire format.
    fn encode(&self, notification: &Notification) -> Result<Vec<u8>, EncodeError>;

    /// Human-readable name for this codec (e.g., "binary-frame").
    fn name(&self) -> &'static str;
}
