//! Event Relay server binary.
//!
//! Startup order:
//! 1. Load and validate configuration
//! 2. Initialize logging
//! 3. Connect to Redis and verify it answers `PING`
//! 4. Build the adapters and start the supervised tasks
//! 5. Wait for SIGINT/SIGTERM, then shut down gracefully

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use redis::aio::MultiplexedConnection;
use tokio_util::sync::CancellationToken;

use event_relay::adapters::http::{bind_and_serve, relay_router, EventAppState};
use event_relay::adapters::{
    ConnectionManager, InboundBridge, RedisDistributedLock, RedisPubSub,
};
use event_relay::application::{RequestCorrelator, TaskSupervisor};
use event_relay::config::{AppConfig, ConfigError, ValidationError};
use event_relay::ports::{DistributedLock, PubSub};

/// Failures that stop the process before it starts serving.
#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid configuration: {0}")]
    Validation(#[from] ValidationError),

    #[error("Failed to initialize logging: {0}")]
    Logging(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Redis did not answer within {0:?}")]
    RedisTimeout(Duration),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("event-relay: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), StartupError> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref())?;
    config.validate()?;

    setup_logging(&config)?;
    tracing::info!(
        environment = ?config.server.environment,
        "Starting event relay"
    );

    let (client, conn) = connect_redis(&config).await?;

    let pub_sub: Arc<dyn PubSub> = Arc::new(RedisPubSub::new(client, conn.clone()));
    let lock: Arc<dyn DistributedLock> = Arc::new(RedisDistributedLock::new(
        conn,
        config.redis.lock_key_prefix.clone(),
        config.relay.dedup_ttl(),
    ));

    let connections = ConnectionManager::new_shared(pub_sub.clone(), lock);
    let correlator = RequestCorrelator::new_shared(pub_sub.clone(), config.relay.reply_timeout());
    let bridge = InboundBridge::new_shared(pub_sub, connections.clone());
    let router = relay_router(EventAppState::new(correlator, connections.clone()));
    let addr = config.server.socket_addr()?;

    let shutdown = CancellationToken::new();
    let mut supervisor = TaskSupervisor::new(config.relay.restart_policy(), shutdown.clone());

    supervisor.supervise("inbound-bridge", move |token| {
        let bridge = bridge.clone();
        async move { bridge.run(token).await }
    });
    supervisor.supervise("http-server", move |token| {
        let router = router.clone();
        async move { bind_and_serve(addr, router, token).await }
    });

    wait_for_signal().await;
    tracing::info!("Shutting down");

    shutdown.cancel();
    connections.close_all();
    if !supervisor
        .graceful_shutdown(config.relay.shutdown_grace())
        .await
    {
        tracing::warn!("Forcing exit with tasks still running");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Setup logging from `RUST_LOG`, falling back to the configured level.
///
/// Lines are JSON when `server.log_format` asks for it (by default, in
/// production) and human readable otherwise.
fn setup_logging(config: &AppConfig) -> Result<(), StartupError> {
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.server.log_level))
        .map_err(|e| StartupError::Logging(e.to_string()))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true);

    let result = if config.server.json_logs() {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| StartupError::Logging(e.to_string()))
}

/// Open the Redis client and check the server answers.
async fn connect_redis(
    config: &AppConfig,
) -> Result<(redis::Client, MultiplexedConnection), StartupError> {
    let timeout = config.redis.timeout();
    let client = redis::Client::open(config.redis.connection_info()?)?;

    let mut conn = tokio::time::timeout(timeout, client.get_multiplexed_tokio_connection())
        .await
        .map_err(|_| StartupError::RedisTimeout(timeout))??;

    let ping = redis::cmd("PING");
    let pong = tokio::time::timeout(timeout, ping.query_async::<_, String>(&mut conn))
        .await
        .map_err(|_| StartupError::RedisTimeout(timeout))??;

    tracing::info!(reply = %pong, "Connected to Redis");
    Ok((client, conn))
}

/// Wait for SIGINT or SIGTERM.
async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to register SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}
