//! ClickHouse analytical store for the rollup engine.
//!
//! Raw fact tables are replicated here by the sync worker; the `Warehouse`
//! trait is the seam the worker writes through, so tests substitute an
//! in-memory destination.

pub mod client;
pub mod config;
pub mod health;
pub mod insert;
pub mod schema;
pub mod sink;

pub use client::ClickHouseClient;
pub use config::ClickHouseConfig;
pub use sink::{ClickHouseWarehouse, Warehouse};
