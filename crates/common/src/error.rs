use std::io;

use thiserror::Error;

/// Transport failure categories expected to be resolved by reconnecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Reset,
    BrokenPipe,
    Timeout,
    Tls,
}

impl TransportKind {
    /// Map an OS-level I/O error into the closed transport taxonomy.
    ///
    /// TLS-layer failures surface from the stream as `InvalidData`. Anything
    /// not otherwise recognized is treated as a connection reset: every
    /// mid-stream OS failure is connection-level and recoverable by the same
    /// reconnect path.
    pub fn classify(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::BrokenPipe => TransportKind::BrokenPipe,
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TransportKind::Timeout,
            io::ErrorKind::InvalidData => TransportKind::Tls,
            _ => TransportKind::Reset,
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Reset => write!(f, "reset"),
            TransportKind::BrokenPipe => write!(f, "broken_pipe"),
            TransportKind::Timeout => write!(f, "timeout"),
            TransportKind::Tls => write!(f, "tls"),
        }
    }
}

/// Error types used across the delivery pipeline.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Missing or invalid credentials/settings; fatal, aborts the worker.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transient network or TLS failure; drives the retry/requeue machine.
    #[error("Transport error ({kind}): {message}")]
    Transport { kind: TransportKind, message: String },

    /// Deterministic codec failure on a malformed record.
    #[error("Encoding error: {0}")]
    Encode(String),

    /// Queue transport failure; the connection manager self-heals underneath.
    #[error("Queue error: {0}")]
    Queue(#[from] redis::RedisError),
}

impl DeliveryError {
    /// Wrap an I/O error from the gateway connection, classifying its kind.
    pub fn from_io(err: io::Error) -> Self {
        DeliveryError::Transport {
            kind: TransportKind::classify(&err),
            message: err.to_string(),
        }
    }

    pub fn transport(kind: TransportKind, message: impl Into<String>) -> Self {
        DeliveryError::Transport {
            kind,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, DeliveryError::Transport { .. })
    }

    /// The policy table: which recovery action each error kind maps to.
    pub fn recovery(&self) -> Recovery {
        match self {
            DeliveryError::Transport { .. } => Recovery::RetryWithBackoff,
            DeliveryError::Config(_) => Recovery::Fatal,
            DeliveryError::Encode(_) => Recovery::Drop,
            DeliveryError::Queue(_) => Recovery::Pause,
        }
    }
}

/// Recovery action the worker applies to a failed cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Reconnect and resend, requeueing once the retry budget is exhausted
    RetryWithBackoff,
    /// Abort the worker; operator intervention required
    Fatal,
    /// Log the record for manual replay and discard it
    Drop,
    /// Pause one interval and continue with the next cycle
    Pause,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_io_kinds() {
        let cases = [
            (io::ErrorKind::BrokenPipe, TransportKind::BrokenPipe),
            (io::ErrorKind::ConnectionReset, TransportKind::Reset),
            (io::ErrorKind::ConnectionAborted, TransportKind::Reset),
            (io::ErrorKind::TimedOut, TransportKind::Timeout),
            (io::ErrorKind::WouldBlock, TransportKind::Timeout),
            (io::ErrorKind::InvalidData, TransportKind::Tls),
            (io::ErrorKind::UnexpectedEof, TransportKind::Reset),
            (io::ErrorKind::ConnectionRefused, TransportKind::Reset),
        ];
        for (kind, expected) in cases {
            let err = io::Error::new(kind, "boom");
            assert_eq!(TransportKind::classify(&err), expected, "{kind:?}");
        }
    }

    #[test]
    fn test_recovery_table() {
        let transport = DeliveryError::transport(TransportKind::Timeout, "slow");
        assert_eq!(transport.recovery(), Recovery::RetryWithBackoff);
        assert!(transport.is_transient());

        let config = DeliveryError::Config("no pem".to_string());
        assert_eq!(config.recovery(), Recovery::Fatal);
        assert!(!config.is_transient());

        let encode = DeliveryError::Encode("bad token".to_string());
        assert_eq!(encode.recovery(), Recovery::Drop);
        assert!(!encode.is_transient());
    }

    #[test]
    fn test_transport_display_names_kind() {
        let err = DeliveryError::transport(TransportKind::BrokenPipe, "pipe closed");
        assert_eq!(
            err.to_string(),
            "Transport error (broken_pipe): pipe closed"
        );
    }
}
