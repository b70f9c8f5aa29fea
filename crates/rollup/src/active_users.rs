//! Daily active users and the sketches behind wider unique-user windows.
//!
//! DAU is exact: one user-fact row per (user, day), counted per dimension
//! group. WAU/MAU would need every distinct id for the window in memory, so
//! each (day, dims) group also persists a cardinality sketch rebuilt from
//! scratch on every merge; wide windows merge the stored sketches instead of
//! rows.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::debug;
use uuid::Uuid;

use cardinality::Sketch;
use engine_core::window::TimeWindow;
use engine_core::{
    ActiveRollup, ActiveStore, ActiveUserFact, DimensionTuple, FactStore, Result, SketchRecord,
};

use crate::engine::{DomainEngine, WindowOutcome};

pub struct ActiveUsersEngine {
    facts: Arc<dyn FactStore>,
    store: Arc<dyn ActiveStore>,
}

impl ActiveUsersEngine {
    pub fn new(facts: Arc<dyn FactStore>, store: Arc<dyn ActiveStore>) -> Self {
        Self { facts, store }
    }
}

#[async_trait]
impl DomainEngine for ActiveUsersEngine {
    fn domain(&self) -> &'static str {
        "active_users"
    }

    async fn clear_day(&self, game_id: Uuid, date: NaiveDate) -> Result<()> {
        self.store.clear_day(game_id, date).await
    }

    async fn merge_window(&self, game_id: Uuid, window: &TimeWindow) -> Result<WindowOutcome> {
        let date = window.date();
        let sessions = self.facts.sessions_in(game_id, window).await?;

        let mut deltas: HashMap<Uuid, ActiveUserFact> = HashMap::new();
        for session in &sessions {
            let delta = deltas
                .entry(session.user_id)
                .or_insert_with(|| ActiveUserFact {
                    game_id,
                    date,
                    user_id: session.user_id,
                    dims: session.dims(),
                    sessions: 0,
                    session_ms: 0,
                });
            delta.sessions += 1;
            delta.session_ms += session.duration_ms;
        }

        if deltas.is_empty() {
            return Ok(WindowOutcome::default());
        }

        let groups = self
            .store
            .merge_user_facts(deltas.into_values().collect())
            .await?;
        let user_facts = self.store.user_facts(game_id, date, &groups).await?;
        let rollups = aggregate(game_id, date, &user_facts);
        let rows = rollups.len() as u64;

        self.store
            .replace_rollups(game_id, date, &groups, rollups)
            .await?;

        // Sketches for the touched groups are rebuilt from the full day's
        // user facts and replaced, never merged in place.
        let sketches = build_sketches(game_id, date, &user_facts);
        self.store.put_sketches(sketches).await?;

        debug!(
            game_id = %game_id,
            window_start = %window.start,
            rollup_rows = rows,
            "active-users window merged"
        );
        Ok(WindowOutcome {
            rollup_rows: rows,
            skipped_facts: 0,
        })
    }
}

fn aggregate(game_id: Uuid, date: NaiveDate, user_facts: &[ActiveUserFact]) -> Vec<ActiveRollup> {
    let mut rollups: HashMap<DimensionTuple, ActiveRollup> = HashMap::new();

    for fact in user_facts {
        let rollup = rollups
            .entry(fact.dims.clone())
            .or_insert_with(|| ActiveRollup {
                game_id,
                date,
                dims: fact.dims.clone(),
                dau: 0,
                sessions: 0,
                session_ms: 0,
            });
        rollup.dau += 1;
        rollup.sessions += fact.sessions;
        rollup.session_ms += fact.session_ms;
    }

    rollups.into_values().collect()
}

fn build_sketches(
    game_id: Uuid,
    date: NaiveDate,
    user_facts: &[ActiveUserFact],
) -> Vec<SketchRecord> {
    let mut sketches: HashMap<DimensionTuple, Sketch> = HashMap::new();
    for fact in user_facts {
        sketches
            .entry(fact.dims.clone())
            .or_insert_with(Sketch::new)
            .insert(&fact.user_id);
    }

    sketches
        .into_iter()
        .map(|(dims, sketch)| SketchRecord {
            game_id,
            date,
            dims,
            bytes: sketch.to_bytes(),
        })
        .collect()
}

/// Approximate unique active users for a game over `[from, to]`, merging the
/// per-day sketches across all dimension tuples. Within roughly ±2% of the
/// true count at the default precision.
pub async fn estimate_active_users(
    store: &dyn ActiveStore,
    game_id: Uuid,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<u64> {
    let records = store.sketches_in_range(game_id, from, to).await?;

    let mut merged = Sketch::new();
    for record in records {
        merged.merge(&Sketch::from_bytes(&record.bytes)?);
    }
    Ok(merged.estimate().round() as u64)
}
