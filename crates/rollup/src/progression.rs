//! Level-funnel rollups.
//!
//! A window's progression events fold into per-(user, level) deltas with
//! first-seen dimensions. Durations pair an outcome with the most recent
//! prior start for the same (user, level); unmatched outcomes contribute no
//! sample. The start map is seeded from the persisted user facts so pairs
//! spanning a chunk boundary still match.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tracing::debug;
use uuid::Uuid;

use engine_core::window::TimeWindow;
use engine_core::{
    DimensionTuple, EventFact, FactStore, LevelKey, LevelRollup, LevelUserFact, ProgressionKind,
    ProgressionStore, Result,
};

use crate::engine::{DomainEngine, WindowOutcome};

pub struct ProgressionEngine {
    facts: Arc<dyn FactStore>,
    store: Arc<dyn ProgressionStore>,
}

impl ProgressionEngine {
    pub fn new(facts: Arc<dyn FactStore>, store: Arc<dyn ProgressionStore>) -> Self {
        Self { facts, store }
    }
}

#[async_trait]
impl DomainEngine for ProgressionEngine {
    fn domain(&self) -> &'static str {
        "progression"
    }

    async fn clear_day(&self, game_id: Uuid, date: NaiveDate) -> Result<()> {
        self.store.clear_day(game_id, date).await
    }

    async fn merge_window(&self, game_id: Uuid, window: &TimeWindow) -> Result<WindowOutcome> {
        let date = window.date();
        let mut open = self.store.open_starts(game_id, date).await?;
        let events = self.facts.level_events(game_id, window).await?;

        let (deltas, skipped) = fold_events(game_id, date, &events, &mut open);
        if deltas.is_empty() {
            return Ok(WindowOutcome {
                rollup_rows: 0,
                skipped_facts: skipped,
            });
        }

        let groups = self.store.merge_user_facts(deltas).await?;
        let user_facts = self.store.user_facts(game_id, date, &groups).await?;
        let rollups = aggregate(game_id, date, &user_facts);
        let rows = rollups.len() as u64;

        self.store
            .replace_rollups(game_id, date, &groups, rollups)
            .await?;

        debug!(
            game_id = %game_id,
            window_start = %window.start,
            rollup_rows = rows,
            skipped_facts = skipped,
            "progression window merged"
        );
        Ok(WindowOutcome {
            rollup_rows: rows,
            skipped_facts: skipped,
        })
    }
}

/// Fold a window's events into per-(user, level) deltas. `open` is the live
/// start map: seeded from persisted facts, updated in event order.
fn fold_events(
    game_id: Uuid,
    date: NaiveDate,
    events: &[EventFact],
    open: &mut HashMap<(Uuid, LevelKey), DateTime<Utc>>,
) -> (Vec<LevelUserFact>, u64) {
    let mut deltas: HashMap<(Uuid, LevelKey), LevelUserFact> = HashMap::new();
    let mut skipped = 0u64;

    for event in events {
        let Some(kind) = event.progression_kind() else {
            continue;
        };
        let (user_id, level) = match (event.require_user(), event.require_level()) {
            (Ok(user_id), Ok(level)) => (user_id, level),
            (Err(e), _) | (_, Err(e)) => {
                debug!(error = %e, "skipping malformed progression event");
                skipped += 1;
                continue;
            }
        };

        let key = (user_id, level.clone());
        let delta = deltas.entry(key.clone()).or_insert_with(|| LevelUserFact {
            game_id,
            date,
            user_id,
            level,
            dims: event.dims(),
            starts: 0,
            completes: 0,
            fails: 0,
            duration_ms: 0,
            duration_samples: 0,
            last_start_at: None,
        });

        match kind {
            ProgressionKind::Start => {
                delta.starts += 1;
                delta.last_start_at = Some(
                    delta
                        .last_start_at
                        .map_or(event.occurred_at, |prev| prev.max(event.occurred_at)),
                );
                open.insert(key, event.occurred_at);
            }
            ProgressionKind::Complete | ProgressionKind::Fail => {
                if kind == ProgressionKind::Complete {
                    delta.completes += 1;
                } else {
                    delta.fails += 1;
                }
                // Most recent prior start, non-consuming: repeated outcomes
                // each measure against the same start.
                if let Some(&started) = open.get(&key) {
                    if started <= event.occurred_at {
                        delta.duration_ms += (event.occurred_at - started).num_milliseconds();
                        delta.duration_samples += 1;
                    }
                }
            }
        }
    }

    (deltas.into_values().collect(), skipped)
}

/// Re-aggregate user facts into rollup rows, one per (level, dims) group.
fn aggregate(game_id: Uuid, date: NaiveDate, user_facts: &[LevelUserFact]) -> Vec<LevelRollup> {
    let mut rollups: HashMap<(LevelKey, DimensionTuple), LevelRollup> = HashMap::new();

    for fact in user_facts {
        let rollup = rollups
            .entry((fact.level.clone(), fact.dims.clone()))
            .or_insert_with(|| LevelRollup {
                game_id,
                date,
                level: fact.level.clone(),
                dims: fact.dims.clone(),
                starts: 0,
                completes: 0,
                fails: 0,
                started_players: 0,
                completed_players: 0,
                failed_players: 0,
                duration_ms: 0,
                duration_samples: 0,
            });

        rollup.starts += fact.starts;
        rollup.completes += fact.completes;
        rollup.fails += fact.fails;
        rollup.duration_ms += fact.duration_ms;
        rollup.duration_samples += fact.duration_samples;
        if fact.starts > 0 {
            rollup.started_players += 1;
        }
        if fact.completes > 0 {
            rollup.completed_players += 1;
        }
        if fact.fails > 0 {
            rollup.failed_players += 1;
        }
    }

    rollups.into_values().collect()
}
