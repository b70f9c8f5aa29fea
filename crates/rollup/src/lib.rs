//! Rollup engines: one per analytical domain, all driven by the same
//! windowed runner.
//!
//! Each engine turns a window of raw facts into per-user fact deltas, merges
//! them through its store, and re-aggregates the touched dimension groups
//! into rollup rows. The runner decides how a day is windowed (one full-day
//! pass or chronological sub-windows) and isolates per-game failures.

pub mod active_users;
pub mod backfill;
pub mod engine;
pub mod monetization;
pub mod progression;
pub mod retention;
pub mod throttle;

pub use active_users::{estimate_active_users, ActiveUsersEngine};
pub use backfill::run_backfill;
pub use engine::{DomainEngine, RollupConfig, RollupMode, RollupRunner, WindowOutcome};
pub use monetization::MonetizationEngine;
pub use progression::ProgressionEngine;
pub use retention::RetentionEngine;
pub use throttle::{ThrottleConfig, ThrottleController};
