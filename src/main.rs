//! GamePulse aggregation & cross-store sync engine
//!
//! Scheduled jobs that turn raw gameplay telemetry into idempotent
//! pre-aggregated rollups:
//! - per-domain daily rebuilds (level funnels, active users, retention,
//!   monetization) plus an additive hourly merge for today's numbers
//! - watermark-driven replication of the raw fact tables to ClickHouse
//! - advisory-lock coordination so stateless instances share one schedule

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};

use pg_store::{schema::init_schema, PgStore, PostgresConfig};
use rollup::{
    ActiveUsersEngine, DomainEngine, MonetizationEngine, ProgressionEngine, RetentionEngine,
    RollupConfig, RollupRunner, ThrottleConfig, ThrottleController,
};
use telemetry::init_tracing_from_env;
use warehouse::{ClickHouseClient, ClickHouseConfig, ClickHouseWarehouse};
use worker::{JobScheduler, JobsConfig, SyncConfig, SyncEngine};

/// Application configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Config {
    #[serde(default)]
    postgres: PostgresConfig,

    #[serde(default)]
    clickhouse: ClickHouseConfig,

    #[serde(default)]
    jobs: JobsConfig,

    #[serde(default)]
    rollup: RollupConfig,

    #[serde(default)]
    throttle: ThrottleConfig,

    #[serde(default)]
    sync: SyncConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            postgres: PostgresConfig::default(),
            clickhouse: ClickHouseConfig::default(),
            jobs: JobsConfig::default(),
            rollup: RollupConfig::default(),
            throttle: ThrottleConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing_from_env();

    info!(
        "Starting GamePulse aggregation engine v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = load_config()?;

    // Row store: the engine cannot do anything useful without it.
    let store = Arc::new(
        PgStore::connect(&config.postgres)
            .await
            .context("Failed to connect to Postgres")?,
    );
    init_schema(&store)
        .await
        .context("Failed to initialize Postgres schema")?;
    store
        .check_health()
        .await
        .context("Postgres health check failed")?;

    // Analytical store: optional at startup, probed again every sync cycle.
    let clickhouse =
        ClickHouseClient::new(config.clickhouse.clone()).context("Invalid ClickHouse config")?;
    if let Err(e) = warehouse::health::init_schema(&clickhouse).await {
        // Rollups still run without the warehouse; sync skips until it's up.
        warn!(error = %e, "ClickHouse schema init failed, sync will retry");
    }
    warehouse::health::check_connection(&clickhouse).await;
    let destination = Arc::new(ClickHouseWarehouse::new(clickhouse));

    let runner = Arc::new(RollupRunner::new(
        store.clone(),
        config.rollup.clone(),
        ThrottleController::new(config.throttle.clone()),
    ));

    let engines: Vec<Arc<dyn DomainEngine>> = vec![
        Arc::new(ProgressionEngine::new(store.clone(), store.clone())),
        Arc::new(ActiveUsersEngine::new(store.clone(), store.clone())),
        Arc::new(RetentionEngine::new(store.clone(), store.clone())),
        Arc::new(MonetizationEngine::new(store.clone(), store.clone())),
    ];

    let sync = Arc::new(SyncEngine::new(
        store.clone(),
        store.clone(),
        destination,
        config.sync.clone(),
    ));

    let scheduler = Arc::new(JobScheduler::new(
        config.jobs.clone(),
        runner,
        engines,
        Arc::new(store.lock_manager()),
        sync,
    ));
    scheduler
        .validate()
        .context("Invalid job schedule configuration")?;

    let handles = scheduler.start();

    shutdown_signal().await;
    info!("Shutting down...");

    for handle in handles {
        handle.abort();
    }

    info!("Shutdown complete");
    Ok(())
}

/// Load configuration from files and environment.
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        // Start with defaults
        .add_source(config::Config::try_from(&Config::default())?)
        // Load from config file if exists
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        // Override with environment variables (GAMEPULSE_POSTGRES__URL etc.)
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("GAMEPULSE")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut config: Config = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    // Flat overrides for the two connection URLs, for environments where
    // nested keys are awkward to set.
    if let Ok(url) = std::env::var("GAMEPULSE_POSTGRES_URL") {
        config.postgres.url = url;
    }
    if let Ok(url) = std::env::var("GAMEPULSE_CLICKHOUSE_URL") {
        config.clickhouse.url = url;
    }

    Ok(config)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
