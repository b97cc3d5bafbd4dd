//! Legacy binary-frame codec for the push gateway.
//!
//! Queue records are JSON objects carrying the hex-encoded device token and
//! the payload object:
//!
//! ```json
//! { "token": "<64 hex chars>", "payload": { "aps": { "alert": "..." } } }
//! ```
//!
//! The wire frame is:
//!
//! - Byte 0: command (always `0x00`)
//! - Bytes 1-2: token length (u16 big-endian, always 32)
//! - Token bytes
//! - Next 2 bytes: payload length (u16 big-endian)
//! - Payload bytes (serialized JSON)

use serde::Deserialize;

use push_common::types::Notification;

use crate::{EncodeError, NotificationCodec};

/// Device tokens are fixed-width binary identifiers.
pub const DEVICE_TOKEN_LEN: usize = 32;

/// The gateway rejects payloads over this many bytes.
pub const MAX_PAYLOAD_LEN: usize = 256;

const FRAME_COMMAND: u8 = 0;

#[derive(Debug, Deserialize)]
struct Record {
    token: String,
    payload: serde_json::Value,
}

/// Stateless codec emitting the legacy gateway frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct BinaryFrameCodec;

impl BinaryFrameCodec {
    pub fn new() -> Self {
        Self
    }

    fn decode_token(raw: &str) -> Result<Vec<u8>, EncodeError> {
        let token = hex::decode(raw.trim()).map_err(|e| EncodeError::Token {
            expected: DEVICE_TOKEN_LEN,
            detail: e.to_string(),
        })?;

        if token.len() != DEVICE_TOKEN_LEN {
            return Err(EncodeError::Token {
                expected: DEVICE_TOKEN_LEN,
                detail: format!("got {} bytes", token.len()),
            });
        }

        Ok(token)
    }
}

impl NotificationCodec for BinaryFrameCodec {
    fn encode(&self, notification: &Notification) -> Result<Vec<u8>, EncodeError> {
        let record: Record = serde_json::from_str(notification.as_str())?;

        let token = Self::decode_token(&record.token)?;
        let payload = serde_json::to_vec(&record.payload)?;

        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(EncodeError::PayloadTooLarge(payload.len(), MAX_PAYLOAD_LEN));
        }

        let mut frame = Vec::with_capacity(1 + 2 + token.len() + 2 + payload.len());
        frame.push(FRAME_COMMAND);
        frame.extend_from_slice(&(token.len() as u16).to_be_bytes());
        frame.extend_from_slice(&token);
        frame.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        frame.extend_from_slice(&payload);

        Ok(frame)
    }

    fn name(&self) -> &'static str {
        "binary-frame"
    }
}
