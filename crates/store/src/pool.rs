//! Row store handle.

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use engine_core::Result;

use crate::config::PostgresConfig;
use crate::db_err;
use crate::lock::PgLockManager;

/// Postgres row store handle with connection pooling.
///
/// Cloning is cheap; the inner pool is reference-counted. One `PgStore`
/// implements all of the engine's store traits.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect a new store.
    pub async fn connect(config: &PostgresConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.url)
            .await
            .map_err(db_err)?;

        info!(
            max_connections = config.max_connections,
            "Connected Postgres pool"
        );

        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns the inner pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// A lock manager sharing this store's pool.
    pub fn lock_manager(&self) -> PgLockManager {
        PgLockManager::new(self.pool.clone())
    }
}
