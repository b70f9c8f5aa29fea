//! Cron-driven job scheduler.
//!
//! One spawned loop per job: sleep until the next cron fire, then run the
//! job body under its named lock. A fire that lands while another instance
//! holds the lock is skipped, not queued; the next tick catches up. Daily
//! rollup jobs rebuild yesterday's date; the hourly merge keeps today's
//! numbers fresh until the nightly rebuild supersedes them.

use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use cron::Schedule;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{error, info};

use engine_core::{run_exclusive, Error, LockManager, LockOutcome, Result};
use rollup::{DomainEngine, RollupRunner};
use telemetry::health::health;
use telemetry::metrics::metrics;

use crate::sync::SyncEngine;

/// Cron expressions per job, standard 5-field syntax.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    #[serde(default = "default_progression_daily")]
    pub progression_daily: String,
    #[serde(default = "default_active_users_daily")]
    pub active_users_daily: String,
    #[serde(default = "default_retention_daily")]
    pub retention_daily: String,
    #[serde(default = "default_monetization_daily")]
    pub monetization_daily: String,
    /// Fixed minute offset past each hour, clear of the top-of-hour rush.
    #[serde(default = "default_hourly_merge")]
    pub hourly_merge: String,
    #[serde(default = "default_sync_cycle")]
    pub sync_cycle: String,
    #[serde(default = "default_hourly_enabled")]
    pub hourly_enabled: bool,
}

fn default_progression_daily() -> String {
    "0 2 * * *".to_string()
}

fn default_active_users_daily() -> String {
    "10 2 * * *".to_string()
}

fn default_retention_daily() -> String {
    "20 2 * * *".to_string()
}

fn default_monetization_daily() -> String {
    "30 2 * * *".to_string()
}

fn default_hourly_merge() -> String {
    "5 * * * *".to_string()
}

fn default_sync_cycle() -> String {
    "*/5 * * * *".to_string()
}

fn default_hourly_enabled() -> bool {
    true
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            progression_daily: default_progression_daily(),
            active_users_daily: default_active_users_daily(),
            retention_daily: default_retention_daily(),
            monetization_daily: default_monetization_daily(),
            hourly_merge: default_hourly_merge(),
            sync_cycle: default_sync_cycle(),
            hourly_enabled: default_hourly_enabled(),
        }
    }
}

impl JobsConfig {
    fn daily_cron(&self, domain: &str) -> &str {
        match domain {
            "progression" => &self.progression_daily,
            "active_users" => &self.active_users_daily,
            "retention" => &self.retention_daily,
            "monetization" => &self.monetization_daily,
            _ => &self.progression_daily,
        }
    }
}

/// Parse a cron expression, accepting standard 5-field syntax by pinning
/// the seconds field to zero.
pub fn parse_schedule(expr: &str) -> Result<Schedule> {
    let normalized = if expr.split_whitespace().count() == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    };
    Schedule::from_str(&normalized).map_err(|e| Error::schedule(expr, e.to_string()))
}

/// Background job scheduler.
pub struct JobScheduler {
    config: JobsConfig,
    runner: Arc<RollupRunner>,
    engines: Vec<Arc<dyn DomainEngine>>,
    lock: Arc<dyn LockManager>,
    sync: Arc<SyncEngine>,
}

impl JobScheduler {
    pub fn new(
        config: JobsConfig,
        runner: Arc<RollupRunner>,
        engines: Vec<Arc<dyn DomainEngine>>,
        lock: Arc<dyn LockManager>,
        sync: Arc<SyncEngine>,
    ) -> Self {
        Self {
            config,
            runner,
            engines,
            lock,
            sync,
        }
    }

    /// Validate every configured expression up front, so a typo fails the
    /// process at startup instead of silently never firing.
    pub fn validate(&self) -> Result<()> {
        for engine in &self.engines {
            parse_schedule(self.config.daily_cron(engine.domain()))?;
        }
        parse_schedule(&self.config.hourly_merge)?;
        parse_schedule(&self.config.sync_cycle)?;
        Ok(())
    }

    /// Starts all job loops.
    pub fn start(self: Arc<Self>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        for engine in &self.engines {
            let scheduler = self.clone();
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                scheduler.run_daily_loop(engine).await;
            }));
        }

        if self.config.hourly_enabled {
            let scheduler = self.clone();
            handles.push(tokio::spawn(async move {
                scheduler.run_hourly_loop().await;
            }));
        }

        let scheduler = self.clone();
        handles.push(tokio::spawn(async move {
            scheduler.run_sync_loop().await;
        }));

        info!(jobs = handles.len(), "job scheduler started");
        handles
    }

    async fn run_daily_loop(&self, engine: Arc<dyn DomainEngine>) {
        let job = format!("rollup.{}.daily", engine.domain());
        let schedule = match parse_schedule(self.config.daily_cron(engine.domain())) {
            Ok(s) => s,
            Err(e) => {
                error!(job = %job, error = %e, "invalid cron expression, job disabled");
                return;
            }
        };

        loop {
            if !wait_for_next(&schedule).await {
                return;
            }
            let date = (Utc::now() - chrono::Duration::days(1)).date_naive();
            self.run_job(&job, || async {
                self.runner.run_for_date(engine.as_ref(), date).await?;
                Ok(())
            })
            .await;
        }
    }

    async fn run_hourly_loop(&self) {
        let schedule = match parse_schedule(&self.config.hourly_merge) {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "invalid hourly cron expression, job disabled");
                return;
            }
        };

        loop {
            if !wait_for_next(&schedule).await {
                return;
            }
            self.run_job("rollup.hourly", || async {
                let now = Utc::now();
                for engine in &self.engines {
                    if let Err(e) = self.runner.run_previous_hour(engine.as_ref(), now).await {
                        // One domain's failure must not starve the others.
                        error!(
                            domain = engine.domain(),
                            error = %e,
                            "hourly merge failed for domain"
                        );
                    }
                }
                Ok(())
            })
            .await;
        }
    }

    async fn run_sync_loop(&self) {
        let schedule = match parse_schedule(&self.config.sync_cycle) {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "invalid sync cron expression, job disabled");
                return;
            }
        };

        loop {
            if !wait_for_next(&schedule).await {
                return;
            }
            self.run_job("sync.cycle", || async {
                self.sync.run_cycle().await?;
                Ok(())
            })
            .await;
        }
    }

    async fn run_job<F, Fut>(&self, job: &str, body: F)
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<()>> + Send,
    {
        let start = Instant::now();
        match run_exclusive(self.lock.as_ref(), job, body).await {
            Ok(LockOutcome::Ran) => {
                metrics().jobs_run.inc();
                metrics()
                    .job_duration_ms
                    .observe(start.elapsed().as_millis() as u64);
                log_run_summary(job);
            }
            Ok(LockOutcome::Skipped) => {
                metrics().jobs_skipped_lock.inc();
            }
            Err(e) => {
                metrics().jobs_failed.inc();
                error!(job = job, error = %e, "job run failed");
                log_run_summary(job);
            }
        }
    }
}

/// Structured telemetry summary after each run that held the lock.
fn log_run_summary(job: &str) {
    let report = health().report();
    let snapshot = metrics().snapshot();
    info!(
        job = job,
        health = ?report.status,
        jobs_run = snapshot.jobs_run,
        jobs_failed = snapshot.jobs_failed,
        rollup_rows_written = snapshot.rollup_rows_written,
        games_failed = snapshot.games_failed,
        facts_skipped = snapshot.facts_skipped,
        sync_rows = snapshot.sync_rows,
        sync_errors = snapshot.sync_errors,
        job_duration_mean_ms = snapshot.job_duration_mean_ms,
        "run summary"
    );
}

/// Sleep until the schedule's next fire. `false` when the schedule has no
/// future fires.
async fn wait_for_next(schedule: &Schedule) -> bool {
    let Some(next) = schedule.upcoming(Utc).next() else {
        return false;
    };
    let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
    tokio::time::sleep(wait).await;
    true
}
