//! The windowed rollup runner shared by every domain engine.
//!
//! A day is rebuilt by clearing its user facts and rollups, then merging
//! each window's contribution in chronological order. Full-day mode uses a
//! single window covering the day; chunked mode bounds peak memory to one
//! sub-window's fact volume. Either way the rollup rows come out identical,
//! because rollups are always re-aggregated from the merged user facts.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use engine_core::window::{day_bounds, previous_hour, sub_windows, TimeWindow};
use engine_core::{DaySummary, FactStore, Result};
use telemetry::metrics::metrics;

use crate::throttle::ThrottleController;

/// How a day's facts are windowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollupMode {
    /// One pass over the whole day. Peak memory proportional to the day's
    /// fact volume.
    FullDay,
    /// Chronological sub-windows merged incrementally.
    Chunked,
}

/// Rollup runner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollupConfig {
    #[serde(default = "default_mode")]
    pub mode: RollupMode,
    /// Sub-window width for chunked mode, hours.
    #[serde(default = "default_chunk_hours")]
    pub chunk_hours: u32,
    /// Per-domain mode overrides, keyed by domain name.
    #[serde(default)]
    pub modes: HashMap<String, RollupMode>,
}

fn default_mode() -> RollupMode {
    RollupMode::Chunked
}

fn default_chunk_hours() -> u32 {
    1
}

impl Default for RollupConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            chunk_hours: default_chunk_hours(),
            modes: HashMap::new(),
        }
    }
}

impl RollupConfig {
    pub fn mode_for(&self, domain: &str) -> RollupMode {
        self.modes.get(domain).copied().unwrap_or(self.mode)
    }
}

/// What one window merge produced.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowOutcome {
    pub rollup_rows: u64,
    pub skipped_facts: u64,
}

/// One analytical domain's aggregation, driven window by window.
#[async_trait]
pub trait DomainEngine: Send + Sync {
    fn domain(&self) -> &'static str;

    /// Delete the day's user facts and rollup rows for one game.
    async fn clear_day(&self, game_id: Uuid, date: NaiveDate) -> Result<()>;

    /// Merge one window's raw facts into user facts and re-aggregate the
    /// touched rollup groups. Must converge when re-run for the same window.
    async fn merge_window(&self, game_id: Uuid, window: &TimeWindow) -> Result<WindowOutcome>;
}

/// Drives a [`DomainEngine`] over games and windows.
pub struct RollupRunner {
    facts: Arc<dyn FactStore>,
    config: RollupConfig,
    throttle: ThrottleController,
}

impl RollupRunner {
    pub fn new(
        facts: Arc<dyn FactStore>,
        config: RollupConfig,
        throttle: ThrottleController,
    ) -> Self {
        Self {
            facts,
            config,
            throttle,
        }
    }

    /// Rebuild one date for every game with activity. Per-game failures are
    /// isolated: logged, counted, and skipped without aborting the rest.
    pub async fn run_for_date(
        &self,
        engine: &dyn DomainEngine,
        date: NaiveDate,
    ) -> Result<DaySummary> {
        let day = day_bounds(date);
        let games = self.facts.games_with_activity(&day).await?;

        let mut summary = DaySummary::default();
        for game_id in games {
            match self.rebuild_game_day(engine, game_id, date).await {
                Ok(outcome) => {
                    summary.games_ok += 1;
                    summary.rollup_rows += outcome.rollup_rows;
                    summary.skipped_facts += outcome.skipped_facts;
                }
                Err(e) => {
                    error!(
                        domain = engine.domain(),
                        game_id = %game_id,
                        date = %date,
                        error = %e,
                        "game rollup failed"
                    );
                    metrics().games_failed.inc();
                    summary.games_failed += 1;
                }
            }
        }

        metrics().rollup_rows_written.inc_by(summary.rollup_rows);
        metrics().facts_skipped.inc_by(summary.skipped_facts);

        info!(
            domain = engine.domain(),
            date = %date,
            games_ok = summary.games_ok,
            games_failed = summary.games_failed,
            rollup_rows = summary.rollup_rows,
            skipped_facts = summary.skipped_facts,
            "rollup run complete"
        );
        Ok(summary)
    }

    /// Merge the most recent fully elapsed hour for every game with
    /// activity in it. No clear: purely additive scaffolding for today's
    /// numbers, superseded by the next full rebuild of the same date.
    pub async fn run_previous_hour(
        &self,
        engine: &dyn DomainEngine,
        now: DateTime<Utc>,
    ) -> Result<DaySummary> {
        let window = previous_hour(now);
        let games = self.facts.games_with_activity(&window).await?;

        let mut summary = DaySummary::default();
        for game_id in games {
            match engine.merge_window(game_id, &window).await {
                Ok(outcome) => {
                    summary.games_ok += 1;
                    summary.rollup_rows += outcome.rollup_rows;
                    summary.skipped_facts += outcome.skipped_facts;
                }
                Err(e) => {
                    error!(
                        domain = engine.domain(),
                        game_id = %game_id,
                        window_start = %window.start,
                        error = %e,
                        "hourly merge failed"
                    );
                    metrics().games_failed.inc();
                    summary.games_failed += 1;
                }
            }
        }

        metrics().rollup_rows_written.inc_by(summary.rollup_rows);
        metrics().facts_skipped.inc_by(summary.skipped_facts);

        if summary.games_failed > 0 {
            warn!(
                domain = engine.domain(),
                games_failed = summary.games_failed,
                "hourly merge finished with failures"
            );
        }
        Ok(summary)
    }

    async fn rebuild_game_day(
        &self,
        engine: &dyn DomainEngine,
        game_id: Uuid,
        date: NaiveDate,
    ) -> Result<WindowOutcome> {
        engine.clear_day(game_id, date).await?;

        let windows = match self.config.mode_for(engine.domain()) {
            RollupMode::FullDay => vec![day_bounds(date)],
            RollupMode::Chunked => sub_windows(date, self.config.chunk_hours),
        };

        let mut total = WindowOutcome::default();
        let last = windows.len() - 1;
        for (i, window) in windows.iter().enumerate() {
            let outcome = engine.merge_window(game_id, window).await?;
            total.rollup_rows += outcome.rollup_rows;
            total.skipped_facts += outcome.skipped_facts;
            if i < last {
                self.throttle.pause().await;
            }
        }
        Ok(total)
    }
}
