//! Monetization rollups.
//!
//! Revenue stays in exact integer cents end to end; ARPDAU-style ratios are
//! a dashboard projection. `payers` counts distinct users with at least one
//! purchase, which falls out of the per-user fact rows for free.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::debug;
use uuid::Uuid;

use engine_core::window::TimeWindow;
use engine_core::{
    DimensionTuple, FactStore, Result, RevenueRollup, RevenueStore, RevenueUserFact,
};

use crate::engine::{DomainEngine, WindowOutcome};

pub struct MonetizationEngine {
    facts: Arc<dyn FactStore>,
    store: Arc<dyn RevenueStore>,
}

impl MonetizationEngine {
    pub fn new(facts: Arc<dyn FactStore>, store: Arc<dyn RevenueStore>) -> Self {
        Self { facts, store }
    }
}

#[async_trait]
impl DomainEngine for MonetizationEngine {
    fn domain(&self) -> &'static str {
        "monetization"
    }

    async fn clear_day(&self, game_id: Uuid, date: NaiveDate) -> Result<()> {
        self.store.clear_day(game_id, date).await
    }

    async fn merge_window(&self, game_id: Uuid, window: &TimeWindow) -> Result<WindowOutcome> {
        let date = window.date();
        let purchases = self.facts.revenue_in(game_id, window).await?;

        let mut deltas: HashMap<Uuid, RevenueUserFact> = HashMap::new();
        for purchase in &purchases {
            let delta = deltas
                .entry(purchase.user_id)
                .or_insert_with(|| RevenueUserFact {
                    game_id,
                    date,
                    user_id: purchase.user_id,
                    dims: purchase.dims(),
                    revenue_cents: 0,
                    purchases: 0,
                });
            delta.revenue_cents += purchase.amount_cents;
            delta.purchases += 1;
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

        debug!(
            game_id = %game_id,
            window_start = %window.start,
            rollup_rows = rows,
            "monetization window merged"
        );
        Ok(WindowOutcome {
            rollup_rows: rows,
            skipped_facts: 0,
        })
    }
}

fn aggregate(game_id: Uuid, date: NaiveDate, user_facts: &[RevenueUserFact]) -> Vec<RevenueRollup> {
    let mut rollups: HashMap<DimensionTuple, RevenueRollup> = HashMap::new();

    for fact in user_facts {
        let rollup = rollups
            .entry(fact.dims.clone())
            .or_insert_with(|| RevenueRollup {
                game_id,
                date,
                dims: fact.dims.clone(),
                revenue_cents: 0,
                purchases: 0,
                payers: 0,
            });
        rollup.revenue_cents += fact.revenue_cents;
        rollup.purchases += fact.purchases;
        if fact.purchases > 0 {
            rollup.payers += 1;
        }
    }

    rollups.into_values().collect()
}
