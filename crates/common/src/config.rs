use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Path to the PEM bundle holding the client certificate and private key
    pub gateway_cert_path: PathBuf,

    /// Passphrase for the certificate bundle, if the key is protected
    pub gateway_cert_passphrase: Option<String>,

    /// Optional CA bundle path; when unset, the webpki root store is used
    pub gateway_ca_path: Option<PathBuf>,

    /// Push gateway hostname
    pub gateway_host: String,

    /// Push gateway TLS port
    pub gateway_port: u16,

    /// Redis connection string
    pub redis_url: String,

    /// Redis list key holding the serialized notification queue
    pub queue_key: String,

    /// Pause between polls when the queue is empty, in milliseconds (default: 1000)
    pub empty_poll_interval_ms: u64,

    /// Pause before each in-budget reconnect attempt, in milliseconds (default: 2000)
    pub reconnect_backoff_ms: u64,

    /// Pause after a requeue when the retry budget is exhausted, in milliseconds (default: 30000)
    pub requeue_backoff_ms: u64,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            gateway_cert_path: std::env::var("GATEWAY_CERT_PATH")
                .map(PathBuf::from)
                .map_err(|_| anyhow::anyhow!("GATEWAY_CERT_PATH environment variable is required"))?,
            gateway_cert_passphrase: std::env::var("GATEWAY_CERT_PASSPHRASE").ok(),
            gateway_ca_path: std::env::var("GATEWAY_CA_PATH").ok().map(PathBuf::from),
            gateway_host: std::env::var("GATEWAY_HOST")
                .unwrap_or_else(|_| "gateway.push.apple.com".to_string()),
            gateway_port: std::env::var("GATEWAY_PORT")
                .unwrap_or_else(|_| "2195".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("GATEWAY_PORT must be a valid u16"))?,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            queue_key: std::env::var("QUEUE_KEY")
                .unwrap_or_else(|_| "push_emissary.queue".to_string()),
            empty_poll_interval_ms: std::env::var("EMPTY_POLL_INTERVAL_MS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("EMPTY_POLL_INTERVAL_MS must be a valid u64"))?,
            reconnect_backoff_ms: std::env::var("RECONNECT_BACKOFF_MS")
                .unwrap_or_else(|_| "2000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("RECONNECT_BACKOFF_MS must be a valid u64"))?,
            requeue_backoff_ms: std::env::var("REQUEUE_BACKOFF_MS")
                .unwrap_or_else(|_| "30000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("REQUEUE_BACKOFF_MS must be a valid u64"))?,
        })
    }

    pub fn empty_poll_interval(&self) -> Duration {
        Duration::from_millis(self.empty_poll_interval_ms)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }

    pub fn requeue_backoff(&self) -> Duration {
        Duration::from_millis(self.requeue_backoff_ms)
    }
}
