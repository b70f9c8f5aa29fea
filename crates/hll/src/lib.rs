//! Probabilistic cardinality sketches.
//!
//! Exact DAU deduplication is bounded to one day of user facts; wider
//! windows (WAU/MAU) would need every distinct user id for the window in
//! memory. Instead each day stores a mergeable HyperLogLog sketch and the
//! window estimate comes from merging the per-day sketches at read time.

pub mod sketch;

pub use sketch::Sketch;
