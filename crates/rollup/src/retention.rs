//! Cohort retention rollups.
//!
//! A user counts as retained on day N when they have any session N days
//! after their install. Cohort membership and dimensions come from the
//! install record, not the session, so a cohort's composition is stable
//! across days. Active users without an install record cannot be attributed
//! to a cohort and are skipped.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::debug;
use uuid::Uuid;

use engine_core::window::TimeWindow;
use engine_core::{
    DimensionTuple, FactStore, Result, RetentionRollup, RetentionStore, RetentionUserFact,
};

use crate::engine::{DomainEngine, WindowOutcome};

pub struct RetentionEngine {
    facts: Arc<dyn FactStore>,
    store: Arc<dyn RetentionStore>,
}

impl RetentionEngine {
    pub fn new(facts: Arc<dyn FactStore>, store: Arc<dyn RetentionStore>) -> Self {
        Self { facts, store }
    }
}

#[async_trait]
impl DomainEngine for RetentionEngine {
    fn domain(&self) -> &'static str {
        "retention"
    }

    async fn clear_day(&self, game_id: Uuid, date: NaiveDate) -> Result<()> {
        self.store.clear_day(game_id, date).await
    }

    async fn merge_window(&self, game_id: Uuid, window: &TimeWindow) -> Result<WindowOutcome> {
        let date = window.date();
        let sessions = self.facts.sessions_in(game_id, window).await?;

        let active_users: Vec<Uuid> = sessions
            .iter()
            .map(|s| s.user_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        if active_users.is_empty() {
            return Ok(WindowOutcome::default());
        }

        let installs = self.facts.installs_for_users(game_id, &active_users).await?;
        let install_by_user: HashMap<Uuid, _> = installs
            .into_iter()
            .map(|install| (install.user_id, install))
            .collect();

        let mut deltas = Vec::new();
        let mut skipped = 0u64;
        for user_id in active_users {
            let Some(install) = install_by_user.get(&user_id) else {
                skipped += 1;
                continue;
            };
            deltas.push(RetentionUserFact {
                game_id,
                date,
                user_id,
                cohort_date: install.installed_at.date_naive(),
                dims: install.dims(),
            });
        }

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
            "retention window merged"
        );
        Ok(WindowOutcome {
            rollup_rows: rows,
            skipped_facts: skipped,
        })
    }
}

fn aggregate(
    game_id: Uuid,
    date: NaiveDate,
    user_facts: &[RetentionUserFact],
) -> Vec<RetentionRollup> {
    let mut rollups: HashMap<(NaiveDate, DimensionTuple), RetentionRollup> = HashMap::new();

    for fact in user_facts {
        let rollup = rollups
            .entry((fact.cohort_date, fact.dims.clone()))
            .or_insert_with(|| RetentionRollup {
                game_id,
                date,
                cohort_date: fact.cohort_date,
                dims: fact.dims.clone(),
                day_number: (date - fact.cohort_date).num_days() as i32,
                retained_users: 0,
            });
        rollup.retained_users += 1;
    }

    rollups.into_values().collect()
}
