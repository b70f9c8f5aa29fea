//! Store traits: the seam between the engines and the row store.
//!
//! Every engine takes explicit store handles at construction, so tests run
//! the exact same aggregation code against in-memory implementations while
//! production wires the Postgres-backed ones from `pg-store`.
//!
//! Upsert contracts the implementations must honor:
//! - `merge_user_facts` adds counters (`starts = starts + delta`), ORs
//!   boolean-like flags, and keeps the dimension tuple already stored for an
//!   existing (user, entity, day) row; the first-seen tuple is canonical.
//!   It returns the *stored* (canonical) group keys touched by the merge,
//!   deduplicated, so callers know which rollup groups to rebuild.
//! - `replace_rollups` deletes the rollup rows for the given groups and
//!   inserts the freshly computed ones in one transaction.
//! - `put_sketches` replaces any existing sketch for the same key.

use std::collections::HashMap;
use std::future::Future;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::dimensions::{DimensionTuple, LevelKey};
use crate::error::Result;
use crate::facts::{EventFact, InstallFact, RevenueFact, SessionFact};
use crate::rollup::{
    ActiveRollup, ActiveUserFact, LevelRollup, LevelUserFact, RetentionRollup, RetentionUserFact,
    RevenueRollup, RevenueUserFact, SketchRecord, Watermark,
};
use crate::window::TimeWindow;

// ============================================================================
// Raw fact reads
// ============================================================================

/// Read access to the immutable raw fact tables.
#[async_trait]
pub trait FactStore: Send + Sync {
    /// Games that produced any fact inside the window.
    async fn games_with_activity(&self, window: &TimeWindow) -> Result<Vec<Uuid>>;

    /// Level progression events for one game inside the window, ordered by
    /// occurrence time.
    async fn level_events(&self, game_id: Uuid, window: &TimeWindow) -> Result<Vec<EventFact>>;

    /// Sessions for one game that started inside the window.
    async fn sessions_in(&self, game_id: Uuid, window: &TimeWindow) -> Result<Vec<SessionFact>>;

    /// Revenue facts for one game inside the window.
    async fn revenue_in(&self, game_id: Uuid, window: &TimeWindow) -> Result<Vec<RevenueFact>>;

    /// Install records for the given users of one game.
    async fn installs_for_users(
        &self,
        game_id: Uuid,
        users: &[Uuid],
    ) -> Result<Vec<InstallFact>>;
}

// ============================================================================
// Per-domain rollup stores
// ============================================================================

/// Level-funnel user facts and rollups.
#[async_trait]
pub trait ProgressionStore: Send + Sync {
    /// Delete all user facts and rollup rows for (game, day).
    async fn clear_day(&self, game_id: Uuid, date: NaiveDate) -> Result<()>;

    /// Latest persisted start timestamps per (user, level) for the day,
    /// used to seed duration matching across sub-windows.
    async fn open_starts(
        &self,
        game_id: Uuid,
        date: NaiveDate,
    ) -> Result<HashMap<(Uuid, LevelKey), DateTime<Utc>>>;

    async fn merge_user_facts(
        &self,
        deltas: Vec<LevelUserFact>,
    ) -> Result<Vec<(LevelKey, DimensionTuple)>>;

    /// The day's user facts for the given rollup groups.
    async fn user_facts(
        &self,
        game_id: Uuid,
        date: NaiveDate,
        groups: &[(LevelKey, DimensionTuple)],
    ) -> Result<Vec<LevelUserFact>>;

    async fn replace_rollups(
        &self,
        game_id: Uuid,
        date: NaiveDate,
        groups: &[(LevelKey, DimensionTuple)],
        rows: Vec<LevelRollup>,
    ) -> Result<()>;
}

/// Active-user facts, rollups, and per-day cardinality sketches.
#[async_trait]
pub trait ActiveStore: Send + Sync {
    async fn clear_day(&self, game_id: Uuid, date: NaiveDate) -> Result<()>;

    async fn merge_user_facts(&self, deltas: Vec<ActiveUserFact>) -> Result<Vec<DimensionTuple>>;

    async fn user_facts(
        &self,
        game_id: Uuid,
        date: NaiveDate,
        groups: &[DimensionTuple],
    ) -> Result<Vec<ActiveUserFact>>;

    async fn replace_rollups(
        &self,
        game_id: Uuid,
        date: NaiveDate,
        groups: &[DimensionTuple],
        rows: Vec<ActiveRollup>,
    ) -> Result<()>;

    async fn put_sketches(&self, records: Vec<SketchRecord>) -> Result<()>;

    /// All sketches for one game across `[from, to]`, any dimension tuple.
    async fn sketches_in_range(
        &self,
        game_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<SketchRecord>>;
}

/// Cohort-retention facts and rollups.
#[async_trait]
pub trait RetentionStore: Send + Sync {
    async fn clear_day(&self, game_id: Uuid, date: NaiveDate) -> Result<()>;

    async fn merge_user_facts(
        &self,
        deltas: Vec<RetentionUserFact>,
    ) -> Result<Vec<(NaiveDate, DimensionTuple)>>;

    async fn user_facts(
        &self,
        game_id: Uuid,
        date: NaiveDate,
        groups: &[(NaiveDate, DimensionTuple)],
    ) -> Result<Vec<RetentionUserFact>>;

    async fn replace_rollups(
        &self,
        game_id: Uuid,
        date: NaiveDate,
        groups: &[(NaiveDate, DimensionTuple)],
        rows: Vec<RetentionRollup>,
    ) -> Result<()>;
}

/// Monetization facts and rollups.
#[async_trait]
pub trait RevenueStore: Send + Sync {
    async fn clear_day(&self, game_id: Uuid, date: NaiveDate) -> Result<()>;

    async fn merge_user_facts(&self, deltas: Vec<RevenueUserFact>) -> Result<Vec<DimensionTuple>>;

    async fn user_facts(
        &self,
        game_id: Uuid,
        date: NaiveDate,
        groups: &[DimensionTuple],
    ) -> Result<Vec<RevenueUserFact>>;

    async fn replace_rollups(
        &self,
        game_id: Uuid,
        date: NaiveDate,
        groups: &[DimensionTuple],
        rows: Vec<RevenueRollup>,
    ) -> Result<()>;
}

// ============================================================================
// Distributed lock
// ============================================================================

/// Whether `run_exclusive` actually ran the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    Ran,
    /// Another instance holds the lock; the run was skipped. Missed runs
    /// are caught by the next scheduled tick.
    Skipped,
}

/// A held named lock. Dropping without `release` is tolerated: the backing
/// session closing releases the lock server-side.
#[async_trait]
pub trait LockGuard: Send {
    async fn release(self: Box<Self>) -> Result<()>;
}

/// Named-lock primitive giving mutual exclusion for a job name across all
/// running instances.
#[async_trait]
pub trait LockManager: Send + Sync {
    /// Non-blocking acquire; `None` when the lock is held elsewhere.
    async fn try_acquire(&self, job: &str) -> Result<Option<Box<dyn LockGuard>>>;
}

/// Run `body` under the named lock, or skip silently if it is held
/// elsewhere. The lock is released whether the body succeeds or errors; on
/// panic the backing session unwinds and the lock auto-releases.
pub async fn run_exclusive<F, Fut>(
    lock: &dyn LockManager,
    job: &str,
    body: F,
) -> Result<LockOutcome>
where
    F: FnOnce() -> Fut + Send,
    Fut: Future<Output = Result<()>> + Send,
{
    let Some(guard) = lock.try_acquire(job).await? else {
        info!(job = job, "lock held elsewhere, skipping run");
        return Ok(LockOutcome::Skipped);
    };

    let result = body().await;

    if let Err(e) = guard.release().await {
        // Session close releases the lock; not fatal.
        warn!(job = job, error = %e, "failed to release job lock");
    }

    result.map(|_| LockOutcome::Ran)
}

// ============================================================================
// Sync source & watermarks
// ============================================================================

/// The raw tables replicated to the analytical store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceTable {
    Events,
    Sessions,
    Revenue,
    Installs,
}

impl SourceTable {
    pub const ALL: &'static [SourceTable] = &[
        SourceTable::Events,
        SourceTable::Sessions,
        SourceTable::Revenue,
        SourceTable::Installs,
    ];

    /// Watermark pipeline name for this table.
    pub fn pipeline(&self) -> &'static str {
        match self {
            Self::Events => "sync.events",
            Self::Sessions => "sync.sessions",
            Self::Revenue => "sync.revenue",
            Self::Installs => "sync.installs",
        }
    }
}

/// One fetched batch of source rows, already in `(timestamp, id)` order.
#[derive(Debug, Clone)]
pub enum SourceBatch {
    Events(Vec<EventFact>),
    Sessions(Vec<SessionFact>),
    Revenue(Vec<RevenueFact>),
    Installs(Vec<InstallFact>),
}

impl SourceBatch {
    pub fn len(&self) -> usize {
        match self {
            Self::Events(v) => v.len(),
            Self::Sessions(v) => v.len(),
            Self::Revenue(v) => v.len(),
            Self::Installs(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cursor of the last row in the batch, for watermark advancement.
    pub fn last_cursor(&self) -> Option<(DateTime<Utc>, Uuid)> {
        match self {
            Self::Events(v) => v.last().map(|f| (f.occurred_at, f.id)),
            Self::Sessions(v) => v.last().map(|f| (f.started_at, f.id)),
            Self::Revenue(v) => v.last().map(|f| (f.occurred_at, f.id)),
            Self::Installs(v) => v.last().map(|f| (f.installed_at, f.id)),
        }
    }
}

/// Keyset reads over the raw tables for replication. Rows strictly greater
/// than the watermark under `(timestamp, id)` ordering, so a row is never
/// revisited once past its watermark.
#[async_trait]
pub trait SyncSource: Send + Sync {
    async fn fetch_after(
        &self,
        table: SourceTable,
        after: Option<&Watermark>,
        limit: u32,
    ) -> Result<SourceBatch>;
}

/// Durable replication cursors, one row per pipeline. Read before every
/// batch and persisted after every delivered batch so restarts resume
/// without gaps.
#[async_trait]
pub trait WatermarkStore: Send + Sync {
    async fn load(&self, pipeline: &str) -> Result<Option<Watermark>>;
    async fn save(&self, watermark: &Watermark) -> Result<()>;
}
