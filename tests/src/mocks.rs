//! In-memory store implementations.
//!
//! These honor the same upsert contracts as the Postgres backend (counters
//! add, stored dimension tuples win, rollups replaced per group) so the
//! engines run unchanged against them.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use engine_core::window::TimeWindow;
use engine_core::{
    event_names, ActiveRollup, ActiveStore, ActiveUserFact, DimensionTuple, Error, EventFact,
    FactStore, InstallFact, LevelKey, LevelRollup, LevelUserFact, LockGuard, LockManager,
    ProgressionStore, Result, RetentionRollup, RetentionStore, RetentionUserFact, RevenueFact,
    RevenueRollup, RevenueStore, RevenueUserFact, SessionFact, SketchRecord, SourceBatch,
    SourceTable, SyncSource, Watermark, WatermarkStore,
};
use warehouse::Warehouse;

// ============================================================================
// Raw facts
// ============================================================================

/// In-memory raw fact tables.
#[derive(Default)]
pub struct MemoryFacts {
    events: Mutex<Vec<EventFact>>,
    sessions: Mutex<Vec<SessionFact>>,
    revenue: Mutex<Vec<RevenueFact>>,
    installs: Mutex<Vec<InstallFact>>,
}

impl MemoryFacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_events(&self, facts: impl IntoIterator<Item = EventFact>) {
        self.events.lock().extend(facts);
    }

    pub fn add_sessions(&self, facts: impl IntoIterator<Item = SessionFact>) {
        self.sessions.lock().extend(facts);
    }

    pub fn add_revenue(&self, facts: impl IntoIterator<Item = RevenueFact>) {
        self.revenue.lock().extend(facts);
    }

    pub fn add_installs(&self, facts: impl IntoIterator<Item = InstallFact>) {
        self.installs.lock().extend(facts);
    }
}

#[async_trait]
impl FactStore for MemoryFacts {
    async fn games_with_activity(&self, window: &TimeWindow) -> Result<Vec<Uuid>> {
        let mut games = HashSet::new();
        games.extend(
            self.events
                .lock()
                .iter()
                .filter(|f| window.contains(f.occurred_at))
                .map(|f| f.game_id),
        );
        games.extend(
            self.sessions
                .lock()
                .iter()
                .filter(|f| window.contains(f.started_at))
                .map(|f| f.game_id),
        );
        games.extend(
            self.revenue
                .lock()
                .iter()
                .filter(|f| window.contains(f.occurred_at))
                .map(|f| f.game_id),
        );
        Ok(games.into_iter().collect())
    }

    async fn level_events(&self, game_id: Uuid, window: &TimeWindow) -> Result<Vec<EventFact>> {
        let mut events: Vec<EventFact> = self
            .events
            .lock()
            .iter()
            .filter(|f| {
                f.game_id == game_id
                    && window.contains(f.occurred_at)
                    && event_names::PROGRESSION.contains(&f.name.as_str())
            })
            .cloned()
            .collect();
        events.sort_by_key(|f| (f.occurred_at, f.id));
        Ok(events)
    }

    async fn sessions_in(&self, game_id: Uuid, window: &TimeWindow) -> Result<Vec<SessionFact>> {
        Ok(self
            .sessions
            .lock()
            .iter()
            .filter(|f| f.game_id == game_id && window.contains(f.started_at))
            .cloned()
            .collect())
    }

    async fn revenue_in(&self, game_id: Uuid, window: &TimeWindow) -> Result<Vec<RevenueFact>> {
        Ok(self
            .revenue
            .lock()
            .iter()
            .filter(|f| f.game_id == game_id && window.contains(f.occurred_at))
            .cloned()
            .collect())
    }

    async fn installs_for_users(
        &self,
        game_id: Uuid,
        users: &[Uuid],
    ) -> Result<Vec<InstallFact>> {
        Ok(self
            .installs
            .lock()
            .iter()
            .filter(|f| f.game_id == game_id && users.contains(&f.user_id))
            .cloned()
            .collect())
    }
}

fn after_cursor(ts: DateTime<Utc>, id: Uuid, watermark: Option<&Watermark>) -> bool {
    match watermark {
        Some(wm) => (ts, id) > (wm.last_timestamp, wm.last_id),
        None => true,
    }
}

#[async_trait]
impl SyncSource for MemoryFacts {
    async fn fetch_after(
        &self,
        table: SourceTable,
        after: Option<&Watermark>,
        limit: u32,
    ) -> Result<SourceBatch> {
        let limit = limit as usize;
        Ok(match table {
            SourceTable::Events => {
                let mut rows: Vec<EventFact> = self
                    .events
                    .lock()
                    .iter()
                    .filter(|f| after_cursor(f.occurred_at, f.id, after))
                    .cloned()
                    .collect();
                rows.sort_by_key(|f| (f.occurred_at, f.id));
                rows.truncate(limit);
                SourceBatch::Events(rows)
            }
            SourceTable::Sessions => {
                let mut rows: Vec<SessionFact> = self
                    .sessions
                    .lock()
                    .iter()
                    .filter(|f| after_cursor(f.started_at, f.id, after))
                    .cloned()
                    .collect();
                rows.sort_by_key(|f| (f.started_at, f.id));
                rows.truncate(limit);
                SourceBatch::Sessions(rows)
            }
            SourceTable::Revenue => {
                let mut rows: Vec<RevenueFact> = self
                    .revenue
                    .lock()
                    .iter()
                    .filter(|f| after_cursor(f.occurred_at, f.id, after))
                    .cloned()
                    .collect();
                rows.sort_by_key(|f| (f.occurred_at, f.id));
                rows.truncate(limit);
                SourceBatch::Revenue(rows)
            }
            SourceTable::Installs => {
                let mut rows: Vec<InstallFact> = self
                    .installs
                    .lock()
                    .iter()
                    .filter(|f| after_cursor(f.installed_at, f.id, after))
                    .cloned()
                    .collect();
                rows.sort_by_key(|f| (f.installed_at, f.id));
                rows.truncate(limit);
                SourceBatch::Installs(rows)
            }
        })
    }
}

// ============================================================================
// Rollup state
// ============================================================================

/// In-memory rollup state for all four domains plus watermarks.
#[derive(Default)]
pub struct MemoryRollups {
    level_user: Mutex<HashMap<(Uuid, NaiveDate, Uuid, LevelKey), LevelUserFact>>,
    level_rollups: Mutex<HashMap<(Uuid, NaiveDate, LevelKey, DimensionTuple), LevelRollup>>,

    active_user: Mutex<HashMap<(Uuid, NaiveDate, Uuid), ActiveUserFact>>,
    active_rollups: Mutex<HashMap<(Uuid, NaiveDate, DimensionTuple), ActiveRollup>>,
    sketches: Mutex<HashMap<(Uuid, NaiveDate, DimensionTuple), SketchRecord>>,

    retention_user: Mutex<HashMap<(Uuid, NaiveDate, Uuid), RetentionUserFact>>,
    retention_rollups:
        Mutex<HashMap<(Uuid, NaiveDate, NaiveDate, DimensionTuple), RetentionRollup>>,

    revenue_user: Mutex<HashMap<(Uuid, NaiveDate, Uuid), RevenueUserFact>>,
    revenue_rollups: Mutex<HashMap<(Uuid, NaiveDate, DimensionTuple), RevenueRollup>>,

    watermarks: Mutex<HashMap<String, Watermark>>,
}

impl MemoryRollups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Level rollup rows for (game, date), sorted for comparison.
    pub fn level_rows(&self, game_id: Uuid, date: NaiveDate) -> Vec<LevelRollup> {
        let mut rows: Vec<LevelRollup> = self
            .level_rollups
            .lock()
            .values()
            .filter(|r| r.game_id == game_id && r.date == date)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            (&a.level.level, &a.level.funnel_tag, &a.dims.platform, &a.dims.country)
                .cmp(&(&b.level.level, &b.level.funnel_tag, &b.dims.platform, &b.dims.country))
        });
        rows
    }

    pub fn active_rows(&self, game_id: Uuid, date: NaiveDate) -> Vec<ActiveRollup> {
        let mut rows: Vec<ActiveRollup> = self
            .active_rollups
            .lock()
            .values()
            .filter(|r| r.game_id == game_id && r.date == date)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.dims.platform.cmp(&b.dims.platform));
        rows
    }

    pub fn retention_rows(&self, game_id: Uuid, date: NaiveDate) -> Vec<RetentionRollup> {
        let mut rows: Vec<RetentionRollup> = self
            .retention_rollups
            .lock()
            .values()
            .filter(|r| r.game_id == game_id && r.date == date)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.cohort_date);
        rows
    }

    pub fn revenue_rows(&self, game_id: Uuid, date: NaiveDate) -> Vec<RevenueRollup> {
        let mut rows: Vec<RevenueRollup> = self
            .revenue_rollups
            .lock()
            .values()
            .filter(|r| r.game_id == game_id && r.date == date)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.dims.platform.cmp(&b.dims.platform));
        rows
    }

    pub fn watermark(&self, pipeline: &str) -> Option<Watermark> {
        self.watermarks.lock().get(pipeline).cloned()
    }
}

#[async_trait]
impl ProgressionStore for MemoryRollups {
    async fn clear_day(&self, game_id: Uuid, date: NaiveDate) -> Result<()> {
        self.level_user
            .lock()
            .retain(|(g, d, _, _), _| !(*g == game_id && *d == date));
        self.level_rollups
            .lock()
            .retain(|(g, d, _, _), _| !(*g == game_id && *d == date));
        Ok(())
    }

    async fn open_starts(
        &self,
        game_id: Uuid,
        date: NaiveDate,
    ) -> Result<HashMap<(Uuid, LevelKey), DateTime<Utc>>> {
        Ok(self
            .level_user
            .lock()
            .values()
            .filter(|f| f.game_id == game_id && f.date == date)
            .filter_map(|f| {
                f.last_start_at
                    .map(|ts| ((f.user_id, f.level.clone()), ts))
            })
            .collect())
    }

    async fn merge_user_facts(
        &self,
        deltas: Vec<LevelUserFact>,
    ) -> Result<Vec<(LevelKey, DimensionTuple)>> {
        let mut rows = self.level_user.lock();
        let mut touched = HashSet::new();

        for d in deltas {
            let key = (d.game_id, d.date, d.user_id, d.level.clone());
            match rows.entry(key) {
                Entry::Occupied(mut e) => {
                    let row = e.get_mut();
                    row.starts += d.starts;
                    row.completes += d.completes;
                    row.fails += d.fails;
                    row.duration_ms += d.duration_ms;
                    row.duration_samples += d.duration_samples;
                    row.last_start_at = match (row.last_start_at, d.last_start_at) {
                        (Some(a), Some(b)) => Some(a.max(b)),
                        (a, b) => a.or(b),
                    };
                    touched.insert((row.level.clone(), row.dims.clone()));
                }
                Entry::Vacant(v) => {
                    let row = v.insert(d);
                    touched.insert((row.level.clone(), row.dims.clone()));
                }
            }
        }

        Ok(touched.into_iter().collect())
    }

    async fn user_facts(
        &self,
        game_id: Uuid,
        date: NaiveDate,
        groups: &[(LevelKey, DimensionTuple)],
    ) -> Result<Vec<LevelUserFact>> {
        Ok(self
            .level_user
            .lock()
            .values()
            .filter(|f| {
                f.game_id == game_id
                    && f.date == date
                    && groups.contains(&(f.level.clone(), f.dims.clone()))
            })
            .cloned()
            .collect())
    }

    async fn replace_rollups(
        &self,
        game_id: Uuid,
        date: NaiveDate,
        groups: &[(LevelKey, DimensionTuple)],
        new_rows: Vec<LevelRollup>,
    ) -> Result<()> {
        let mut rows = self.level_rollups.lock();
        rows.retain(|(g, d, level, dims), _| {
            !(*g == game_id && *d == date && groups.contains(&(level.clone(), dims.clone())))
        });
        for r in new_rows {
            rows.insert((r.game_id, r.date, r.level.clone(), r.dims.clone()), r);
        }
        Ok(())
    }
}

#[async_trait]
impl ActiveStore for MemoryRollups {
    async fn clear_day(&self, game_id: Uuid, date: NaiveDate) -> Result<()> {
        self.active_user
            .lock()
            .retain(|(g, d, _), _| !(*g == game_id && *d == date));
        self.active_rollups
            .lock()
            .retain(|(g, d, _), _| !(*g == game_id && *d == date));
        self.sketches
            .lock()
            .retain(|(g, d, _), _| !(*g == game_id && *d == date));
        Ok(())
    }

    async fn merge_user_facts(&self, deltas: Vec<ActiveUserFact>) -> Result<Vec<DimensionTuple>> {
        let mut rows = self.active_user.lock();
        let mut touched = HashSet::new();

        for d in deltas {
            let key = (d.game_id, d.date, d.user_id);
            match rows.entry(key) {
                Entry::Occupied(mut e) => {
                    let row = e.get_mut();
                    row.sessions += d.sessions;
                    row.session_ms += d.session_ms;
                    touched.insert(row.dims.clone());
                }
                Entry::Vacant(v) => {
                    let row = v.insert(d);
                    touched.insert(row.dims.clone());
                }
            }
        }

        Ok(touched.into_iter().collect())
    }

    async fn user_facts(
        &self,
        game_id: Uuid,
        date: NaiveDate,
        groups: &[DimensionTuple],
    ) -> Result<Vec<ActiveUserFact>> {
        Ok(self
            .active_user
            .lock()
            .values()
            .filter(|f| f.game_id == game_id && f.date == date && groups.contains(&f.dims))
            .cloned()
            .collect())
    }

    async fn replace_rollups(
        &self,
        game_id: Uuid,
        date: NaiveDate,
        groups: &[DimensionTuple],
        new_rows: Vec<ActiveRollup>,
    ) -> Result<()> {
        let mut rows = self.active_rollups.lock();
        rows.retain(|(g, d, dims), _| !(*g == game_id && *d == date && groups.contains(dims)));
        for r in new_rows {
            rows.insert((r.game_id, r.date, r.dims.clone()), r);
        }
        Ok(())
    }

    async fn put_sketches(&self, records: Vec<SketchRecord>) -> Result<()> {
        let mut sketches = self.sketches.lock();
        for rec in records {
            sketches.insert((rec.game_id, rec.date, rec.dims.clone()), rec);
        }
        Ok(())
    }

    async fn sketches_in_range(
        &self,
        game_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<SketchRecord>> {
        Ok(self
            .sketches
            .lock()
            .values()
            .filter(|s| s.game_id == game_id && s.date >= from && s.date <= to)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RetentionStore for MemoryRollups {
    async fn clear_day(&self, game_id: Uuid, date: NaiveDate) -> Result<()> {
        self.retention_user
            .lock()
            .retain(|(g, d, _), _| !(*g == game_id && *d == date));
        self.retention_rollups
            .lock()
            .retain(|(g, d, _, _), _| !(*g == game_id && *d == date));
        Ok(())
    }

    async fn merge_user_facts(
        &self,
        deltas: Vec<RetentionUserFact>,
    ) -> Result<Vec<(NaiveDate, DimensionTuple)>> {
        let mut rows = self.retention_user.lock();
        let mut touched = HashSet::new();

        for d in deltas {
            let key = (d.game_id, d.date, d.user_id);
            let row = rows.entry(key).or_insert(d);
            touched.insert((row.cohort_date, row.dims.clone()));
        }

        Ok(touched.into_iter().collect())
    }

    async fn user_facts(
        &self,
        game_id: Uuid,
        date: NaiveDate,
        groups: &[(NaiveDate, DimensionTuple)],
    ) -> Result<Vec<RetentionUserFact>> {
        Ok(self
            .retention_user
            .lock()
            .values()
            .filter(|f| {
                f.game_id == game_id
                    && f.date == date
                    && groups.contains(&(f.cohort_date, f.dims.clone()))
            })
            .cloned()
            .collect())
    }

    async fn replace_rollups(
        &self,
        game_id: Uuid,
        date: NaiveDate,
        groups: &[(NaiveDate, DimensionTuple)],
        new_rows: Vec<RetentionRollup>,
    ) -> Result<()> {
        let mut rows = self.retention_rollups.lock();
        rows.retain(|(g, d, cohort, dims), _| {
            !(*g == game_id && *d == date && groups.contains(&(*cohort, dims.clone())))
        });
        for r in new_rows {
            rows.insert((r.game_id, r.date, r.cohort_date, r.dims.clone()), r);
        }
        Ok(())
    }
}

#[async_trait]
impl RevenueStore for MemoryRollups {
    async fn clear_day(&self, game_id: Uuid, date: NaiveDate) -> Result<()> {
        self.revenue_user
            .lock()
            .retain(|(g, d, _), _| !(*g == game_id && *d == date));
        self.revenue_rollups
            .lock()
            .retain(|(g, d, _), _| !(*g == game_id && *d == date));
        Ok(())
    }

    async fn merge_user_facts(&self, deltas: Vec<RevenueUserFact>) -> Result<Vec<DimensionTuple>> {
        let mut rows = self.revenue_user.lock();
        let mut touched = HashSet::new();

        for d in deltas {
            let key = (d.game_id, d.date, d.user_id);
            match rows.entry(key) {
                Entry::Occupied(mut e) => {
                    let row = e.get_mut();
                    row.revenue_cents += d.revenue_cents;
                    row.purchases += d.purchases;
                    touched.insert(row.dims.clone());
                }
                Entry::Vacant(v) => {
                    let row = v.insert(d);
                    touched.insert(row.dims.clone());
                }
            }
        }

        Ok(touched.into_iter().collect())
    }

    async fn user_facts(
        &self,
        game_id: Uuid,
        date: NaiveDate,
        groups: &[DimensionTuple],
    ) -> Result<Vec<RevenueUserFact>> {
        Ok(self
            .revenue_user
            .lock()
            .values()
            .filter(|f| f.game_id == game_id && f.date == date && groups.contains(&f.dims))
            .cloned()
            .collect())
    }

    async fn replace_rollups(
        &self,
        game_id: Uuid,
        date: NaiveDate,
        groups: &[DimensionTuple],
        new_rows: Vec<RevenueRollup>,
    ) -> Result<()> {
        let mut rows = self.revenue_rollups.lock();
        rows.retain(|(g, d, dims), _| !(*g == game_id && *d == date && groups.contains(dims)));
        for r in new_rows {
            rows.insert((r.game_id, r.date, r.dims.clone()), r);
        }
        Ok(())
    }
}

#[async_trait]
impl WatermarkStore for MemoryRollups {
    async fn load(&self, pipeline: &str) -> Result<Option<Watermark>> {
        Ok(self.watermarks.lock().get(pipeline).cloned())
    }

    async fn save(&self, watermark: &Watermark) -> Result<()> {
        self.watermarks
            .lock()
            .insert(watermark.pipeline.clone(), watermark.clone());
        Ok(())
    }
}

// ============================================================================
// Locking
// ============================================================================

/// In-memory lock manager with the same non-blocking semantics as the
/// advisory-lock backend.
#[derive(Default)]
pub struct MemoryLock {
    held: Arc<Mutex<HashSet<String>>>,
}

impl MemoryLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_held(&self, job: &str) -> bool {
        self.held.lock().contains(job)
    }
}

struct MemoryLockGuard {
    held: Arc<Mutex<HashSet<String>>>,
    job: String,
    released: bool,
}

#[async_trait]
impl LockGuard for MemoryLockGuard {
    async fn release(mut self: Box<Self>) -> Result<()> {
        self.released = true;
        self.held.lock().remove(&self.job);
        Ok(())
    }
}

// Guard contract: a guard dropped without release still frees the lock, the
// same way the Postgres guard closes its session on drop.
impl Drop for MemoryLockGuard {
    fn drop(&mut self) {
        if !self.released {
            self.held.lock().remove(&self.job);
        }
    }
}

#[async_trait]
impl LockManager for MemoryLock {
    async fn try_acquire(&self, job: &str) -> Result<Option<Box<dyn LockGuard>>> {
        let mut held = self.held.lock();
        if !held.insert(job.to_string()) {
            return Ok(None);
        }
        Ok(Some(Box::new(MemoryLockGuard {
            held: self.held.clone(),
            job: job.to_string(),
            released: false,
        })))
    }
}

// ============================================================================
// Warehouse
// ============================================================================

/// Mock sync destination that captures delivered row ids in memory.
#[derive(Default)]
pub struct MockWarehouse {
    live: Mutex<bool>,
    should_fail: Mutex<bool>,
    delivered: Mutex<HashMap<String, Vec<Uuid>>>,
}

impl MockWarehouse {
    pub fn new() -> Self {
        Self {
            live: Mutex::new(true),
            should_fail: Mutex::new(false),
            delivered: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_live(&self, live: bool) {
        *self.live.lock() = live;
    }

    pub fn set_should_fail(&self, fail: bool) {
        *self.should_fail.lock() = fail;
    }

    /// Ids delivered for one pipeline, in delivery order.
    pub fn delivered_ids(&self, table: SourceTable) -> Vec<Uuid> {
        self.delivered
            .lock()
            .get(table.pipeline())
            .cloned()
            .unwrap_or_default()
    }

    pub fn total_rows(&self) -> usize {
        self.delivered.lock().values().map(Vec::len).sum()
    }
}

#[async_trait]
impl Warehouse for MockWarehouse {
    async fn is_live(&self) -> bool {
        *self.live.lock()
    }

    async fn insert_batch(&self, batch: SourceBatch) -> Result<usize> {
        if *self.should_fail.lock() {
            return Err(Error::destination("mock warehouse failure"));
        }

        let (pipeline, ids) = match &batch {
            SourceBatch::Events(v) => (
                SourceTable::Events.pipeline(),
                v.iter().map(|f| f.id).collect::<Vec<_>>(),
            ),
            SourceBatch::Sessions(v) => (
                SourceTable::Sessions.pipeline(),
                v.iter().map(|f| f.id).collect(),
            ),
            SourceBatch::Revenue(v) => (
                SourceTable::Revenue.pipeline(),
                v.iter().map(|f| f.id).collect(),
            ),
            SourceBatch::Installs(v) => (
                SourceTable::Installs.pipeline(),
                v.iter().map(|f| f.id).collect(),
            ),
        };

        let count = ids.len();
        self.delivered
            .lock()
            .entry(pipeline.to_string())
            .or_default()
            .extend(ids);
        Ok(count)
    }
}
