//! Scheduled jobs for the aggregation engine.
//!
//! Each job fires on its own cron expression and runs under a named
//! distributed lock, so any number of stateless instances can share one
//! schedule with exactly one active runner per job.

pub mod scheduler;
pub mod sync;

pub use scheduler::{JobScheduler, JobsConfig};
pub use sync::{SyncConfig, SyncEngine};
