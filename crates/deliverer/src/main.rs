use push_codec::BinaryFrameCodec;
use push_common::config::AppConfig;
use push_common::queue::RedisQueue;
use push_deliverer::clock::TokioSleeper;
use push_deliverer::connection::ConnectionManager;
use push_deliverer::delivery::{DeliveryLoop, DeliveryTimings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "push_deliverer=info,push_common=info".into()),
        )
        .json()
        .init();

    tracing::info!("PushEmissary deliverer starting...");

    // Load configuration
    let config = AppConfig::from_env()?;

    tracing::info!(
        gateway = %format!("{}:{}", config.gateway_host, config.gateway_port),
        queue_key = %config.queue_key,
        "Configuration loaded"
    );

    // Connect to the Redis work queue
    let queue = RedisQueue::connect(&config.redis_url, config.queue_key.clone()).await?;

    // Build the delivery worker
    let connector = ConnectionManager::new(&config);
    let timings = DeliveryTimings::from_config(&config);
    let mut worker = DeliveryLoop::new(
        queue,
        connector,
        BinaryFrameCodec::new(),
        TokioSleeper,
        timings,
    );

    // Run with graceful shutdown on Ctrl+C
    tokio::select! {
        result = worker.run() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Delivery worker exited with error");
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal, stopping gracefully...");
        }
    }

    tracing::info!("PushEmissary deliverer stopped.");
    Ok(())
}
