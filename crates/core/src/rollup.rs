//! Rollup row types: per-user dedup facts, pre-aggregated daily rollups,
//! sketch records, watermarks, and run summaries.
//!
//! `Daily*UserFact` rows are the exact de-duplication unit: one row per
//! (user, entity, day) carrying the canonical first-seen dimension tuple and
//! per-user partial sums. Daily rollups are always recomputed by
//! re-aggregating these rows for the affected dimension groups, never
//! incremented blindly, so a rerun of any window converges to the same
//! totals. Duration sums stay in exact integer milliseconds; averages are a
//! floating-point projection computed downstream.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dimensions::{DimensionTuple, LevelKey};

// ============================================================================
// Level progression
// ============================================================================

/// Per-(user, level, day) progression fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelUserFact {
    pub game_id: Uuid,
    pub date: NaiveDate,
    pub user_id: Uuid,
    pub level: LevelKey,
    /// Canonical (first-seen) dimension tuple for this user/level/day.
    pub dims: DimensionTuple,
    pub starts: i64,
    pub completes: i64,
    pub fails: i64,
    /// Exact sum of matched start→outcome deltas, milliseconds.
    pub duration_ms: i64,
    /// Number of matched outcome pairs contributing to `duration_ms`.
    pub duration_samples: i64,
    /// Most recent start event seen, for cross-window duration matching.
    pub last_start_at: Option<DateTime<Utc>>,
}

/// Daily level-funnel rollup row, keyed by (game, date, level, dims).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelRollup {
    pub game_id: Uuid,
    pub date: NaiveDate,
    pub level: LevelKey,
    pub dims: DimensionTuple,
    pub starts: i64,
    pub completes: i64,
    pub fails: i64,
    pub started_players: i64,
    pub completed_players: i64,
    pub failed_players: i64,
    pub duration_ms: i64,
    pub duration_samples: i64,
}

impl LevelRollup {
    /// Mean completion time in milliseconds; `None` with no matched samples.
    pub fn avg_duration_ms(&self) -> Option<f64> {
        (self.duration_samples > 0)
            .then(|| self.duration_ms as f64 / self.duration_samples as f64)
    }
}

// ============================================================================
// Active users
// ============================================================================

/// Per-(user, day) activity fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveUserFact {
    pub game_id: Uuid,
    pub date: NaiveDate,
    pub user_id: Uuid,
    pub dims: DimensionTuple,
    pub sessions: i64,
    pub session_ms: i64,
}

/// Daily active-users rollup row, keyed by (game, date, dims).
///
/// `dau` is exact (count of user-fact rows); wider windows (WAU/MAU) merge
/// the per-day [`SketchRecord`]s instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveRollup {
    pub game_id: Uuid,
    pub date: NaiveDate,
    pub dims: DimensionTuple,
    pub dau: i64,
    pub sessions: i64,
    pub session_ms: i64,
}

// ============================================================================
// Cohort retention
// ============================================================================

/// Per-(user, activity day) retention fact; cohort attributes come from the
/// user's install record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionUserFact {
    pub game_id: Uuid,
    pub date: NaiveDate,
    pub user_id: Uuid,
    pub cohort_date: NaiveDate,
    pub dims: DimensionTuple,
}

/// Daily retention rollup row, keyed by (game, activity date, cohort date,
/// dims).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionRollup {
    pub game_id: Uuid,
    pub date: NaiveDate,
    pub cohort_date: NaiveDate,
    pub dims: DimensionTuple,
    /// Days since install; 0 on the install day itself.
    pub day_number: i32,
    pub retained_users: i64,
}

// ============================================================================
// Monetization
// ============================================================================

/// Per-(user, day) revenue fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevenueUserFact {
    pub game_id: Uuid,
    pub date: NaiveDate,
    pub user_id: Uuid,
    pub dims: DimensionTuple,
    pub revenue_cents: i64,
    pub purchases: i64,
}

/// Daily monetization rollup row, keyed by (game, date, dims).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenueRollup {
    pub game_id: Uuid,
    pub date: NaiveDate,
    pub dims: DimensionTuple,
    pub revenue_cents: i64,
    pub purchases: i64,
    /// Distinct paying users (count of user-fact rows with purchases).
    pub payers: i64,
}

// ============================================================================
// Sketches
// ============================================================================

/// Serialized cardinality sketch for one (game, date, dims) key.
///
/// Rebuilt from scratch and replaced (never merged in place) on rollup
/// re-run, so re-running a day cannot double-count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SketchRecord {
    pub game_id: Uuid,
    pub date: NaiveDate,
    pub dims: DimensionTuple,
    pub bytes: Vec<u8>,
}

// ============================================================================
// Watermarks
// ============================================================================

/// Durable replication cursor: the last source row delivered to the
/// analytical store, per pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Watermark {
    pub pipeline: String,
    pub last_timestamp: DateTime<Utc>,
    pub last_id: Uuid,
}

// ============================================================================
// Run summaries
// ============================================================================

/// Outcome of one rollup run over a date.
#[derive(Debug, Clone, Default)]
pub struct DaySummary {
    pub games_ok: u64,
    pub games_failed: u64,
    /// Malformed facts skipped during the run.
    pub skipped_facts: u64,
    pub rollup_rows: u64,
}

impl DaySummary {
    pub fn absorb(&mut self, other: &DaySummary) {
        self.games_ok += other.games_ok;
        self.games_failed += other.games_failed;
        self.skipped_facts += other.skipped_facts;
        self.rollup_rows += other.rollup_rows;
    }
}

/// Outcome of a backfill over a date range.
#[derive(Debug, Clone, Default)]
pub struct BackfillSummary {
    pub days_ok: u64,
    pub days_failed: u64,
    pub failed_dates: Vec<NaiveDate>,
    pub totals: DaySummary,
}

/// Outcome of one sync cycle across all source tables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleSummary {
    pub batches: u64,
    pub rows: u64,
    /// True when the cycle was skipped because the destination was
    /// disabled or unreachable.
    pub skipped: bool,
}
