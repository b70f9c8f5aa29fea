//! Unified error types for the aggregation engine.
//!
//! A lock that is already held elsewhere is deliberately *not* an error:
//! `run_exclusive` reports it as [`crate::store::LockOutcome::Skipped`].
//! Per-game aggregation failures are collected into run summaries by the
//! engines rather than propagated.

use thiserror::Error;
use uuid::Uuid;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the aggregation engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Row store read/write failure.
    #[error("store error: {0}")]
    Store(String),

    /// The analytical destination is unreachable or rejected a delivery.
    /// Aborts the current sync cycle; the next cycle retries from the
    /// persisted watermark.
    #[error("destination unavailable: {0}")]
    Destination(String),

    /// A raw fact that cannot be attributed (e.g. missing user id).
    /// Skipped and counted by the engines, never fatal to a batch.
    #[error("malformed fact {id}: {reason}")]
    MalformedFact { id: Uuid, reason: String },

    #[error("config error: {0}")]
    Config(String),

    #[error("invalid schedule {expr:?}: {reason}")]
    Schedule { expr: String, reason: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("sketch decode error: {0}")]
    SketchDecode(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    pub fn destination(msg: impl Into<String>) -> Self {
        Self::Destination(msg.into())
    }

    pub fn malformed_fact(id: Uuid, reason: impl Into<String>) -> Self {
        Self::MalformedFact {
            id,
            reason: reason.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn schedule(expr: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Schedule {
            expr: expr.into(),
            reason: reason.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error should abort the whole process.
    ///
    /// Only configuration problems qualify; everything else is retried on
    /// the next scheduled run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Schedule { .. })
    }
}
