mod config;
mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use config::ServiceConfig;
use pulse_domain::{
    CachingTemplateCatalog, LivenessMonitor, LivenessMonitorConfig, SyncCoordinator,
    SyncCoordinatorConfig,
};
use pulse_nats::{DeviceUpdateConsumer, NatsBrokerPublisher, NatsClient, NatsSessionBroadcaster};
use pulse_postgres::{
    PostgresChannelRepository, PostgresClient, PostgresConfig, PostgresDeviceRepository,
    PostgresTemplateRepository,
};
use pulse_redis::{RedisClient, RedisConfig, RedisDeviceStateCache};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    telemetry::init_telemetry(&config.log_level);

    info!("Starting pulse-server");

    if let Err(e) = run(config).await {
        error!(error = %e, "Service failed");
        std::process::exit(1);
    }
}

async fn run(config: ServiceConfig) -> anyhow::Result<()> {
    // Backends
    info!("Initializing PostgreSQL...");
    let postgres_client = PostgresClient::new(&PostgresConfig {
        host: config.postgres_host.clone(),
        port: config.postgres_port,
        database: config.postgres_database.clone(),
        username: config.postgres_username.clone(),
        password: config.postgres_password.clone(),
        max_pool_size: config.postgres_max_pool_size,
    })?;
    postgres_client.ping().await?;

    info!("Initializing Redis...");
    let redis_client = RedisClient::connect(&RedisConfig {
        url: config.redis_url.clone(),
    })
    .await?;
    redis_client.ping().await?;

    info!("Initializing NATS...");
    let nats_client = NatsClient::connect(
        &config.nats_url,
        Duration::from_secs(config.startup_timeout_secs),
    )
    .await?;
    nats_client
        .ensure_stream(
            &config.device_stream,
            vec![format!("{}.>", config.device_subject_prefix)],
        )
        .await?;

    // Repositories and sinks
    let devices = Arc::new(PostgresDeviceRepository::new(postgres_client.clone()));
    let channels = Arc::new(PostgresChannelRepository::new(postgres_client.clone()));
    let templates = Arc::new(PostgresTemplateRepository::new(postgres_client));
    let catalog = Arc::new(CachingTemplateCatalog::new(templates));
    let cache = Arc::new(RedisDeviceStateCache::new(redis_client));
    let broker = Arc::new(NatsBrokerPublisher::new(
        nats_client.jetstream(),
        config.device_subject_prefix.clone(),
    ));
    let sessions = Arc::new(NatsSessionBroadcaster::new(
        nats_client.client(),
        config.session_subject_prefix.clone(),
    ));

    let coordinator = Arc::new(SyncCoordinator::new(
        devices.clone(),
        channels,
        catalog,
        cache.clone(),
        broker,
        sessions,
        SyncCoordinatorConfig {
            cache_ttl: Duration::from_secs(config.cache_ttl_secs),
            apply_timeout: Duration::from_secs(config.apply_timeout_secs),
            fanout_timeout: Duration::from_secs(config.fanout_timeout_secs),
            fanout_retries: config.fanout_retries,
        },
    ));

    let monitor = LivenessMonitor::new(
        devices,
        cache,
        coordinator.clone(),
        LivenessMonitorConfig {
            staleness_window: Duration::from_secs(config.staleness_window_secs),
            sweep_period: Duration::from_secs(config.sweep_period_secs),
        },
    );

    let consumer = DeviceUpdateConsumer::new(
        &nats_client.jetstream(),
        &config.device_stream,
        &config.update_consumer_name,
        &config.device_subject_prefix,
        coordinator,
    )
    .await?;

    // Background tasks
    let shutdown = CancellationToken::new();

    let monitor_handle = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { monitor.run(shutdown).await })
    };
    let consumer_handle = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { consumer.run(shutdown).await })
    };

    wait_for_shutdown_signal().await;
    info!("Shutdown signal received, stopping background tasks");
    shutdown.cancel();

    if let Err(e) = monitor_handle.await {
        error!(error = %e, "Liveness monitor task panicked");
    }
    match consumer_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "Device update consumer failed"),
        Err(e) => error!(error = %e, "Device update consumer task panicked"),
    }

    info!("Shutdown complete");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => error!(error = %e, "Failed to listen for SIGTERM"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
