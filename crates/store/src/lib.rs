//! Postgres implementations of the engine's store traits.
//!
//! One [`PgStore`] handle implements every read/write trait the engines
//! need; [`lock::PgLockManager`] provides the advisory-lock based
//! [`engine_core::LockManager`].

pub mod config;
pub mod facts;
pub mod health;
pub mod lock;
pub mod pool;
pub mod rollups;
pub mod schema;
pub mod watermark;

pub use config::PostgresConfig;
pub use lock::PgLockManager;
pub use pool::PgStore;

use engine_core::Error;

/// Map a sqlx error into the engine's store error.
pub(crate) fn db_err(e: sqlx::Error) -> Error {
    Error::store(e.to_string())
}
