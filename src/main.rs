use anyhow::{bail, Context};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use event_payout::{
    app,
    config::{Config, StartupMode},
    database::Database,
    redis_client::RedisClient,
    services::{spawn_delivery_worker, LogNotifier},
    snapshot::{self, RedisSnapshotStore, SnapshotError},
    wallet::ChainWalletResolver,
    AppState,
};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::new(&config.app.rust_log);
    if config.app.log_format.eq_ignore_ascii_case("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env().context("Invalid configuration")?;
    init_tracing(&config);

    info!("Starting Event Payout API");

    // Connect to the database
    let db = Database::new(&config.database.url)
        .await
        .context("Failed to open database")?;
    db.run_migrations()
        .await
        .context("Failed to run migrations")?;
    info!("Database ready");

    // Connect to Redis
    let redis = RedisClient::new(&config.redis.url)
        .await
        .context("Failed to connect to Redis")?;
    let snapshots = RedisSnapshotStore::new(redis, config.redis.snapshot_key.clone());
    info!("Redis connected");

    match config.app.startup_mode {
        StartupMode::Init => info!("Startup mode: init, starting with an empty database"),
        StartupMode::Resume => match snapshot::restore(&db, &snapshots).await {
            Ok(()) => {}
            Err(SnapshotError::Missing(location)) => {
                bail!("Failed to get database: no snapshot at {}", location)
            }
            Err(e) => return Err(e).context("Failed to restore database snapshot"),
        },
    }

    // Chain access
    let resolver = ChainWalletResolver::from_config(&config.chain, &config.circuit_breaker)
        .context("Failed to set up wallets")?;
    match resolver.rpc().chain_id().await {
        Ok(id) if id == resolver.chain_id() => info!("Connected to chain {}", id),
        Ok(id) => warn!(
            "Chain RPC reports chain id {} but CHAIN_ID is {}",
            id,
            resolver.chain_id()
        ),
        Err(e) => warn!("Could not reach chain RPC at startup: {}", e),
    }

    let state = AppState::new(config.clone(), db.clone(), Arc::new(resolver), Arc::new(LogNotifier));

    // --- Start background tasks ---
    let worker = spawn_delivery_worker(
        state.notifications.clone(),
        Duration::from_secs(config.notification.poll_interval_seconds),
    );

    // --- Start the web server ---
    let router = app(state);

    let addr: SocketAddr = format!("{}:{}", config.app.host, config.app.port)
        .parse()
        .context("Invalid HOST/PORT")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Server listening on {}", addr);

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    worker.abort();

    snapshot::persist(&db, &snapshots)
        .await
        .context("Failed to save database snapshot")?;
    info!("Shutdown complete");
    Ok(())
}
