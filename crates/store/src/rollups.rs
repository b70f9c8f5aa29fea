//! Per-domain rollup state: user-fact merges and rollup replacement.
//!
//! Merge semantics, shared by all domains:
//! - counters add (`starts = starts + EXCLUDED.starts`);
//! - dimension columns are set on insert and never updated, so the
//!   first-seen tuple is canonical for the rest of the day;
//! - the canonical (stored) group keys are collected from `RETURNING` so
//!   callers rebuild exactly the rollup groups the merge touched.
//!
//! Rollup rows are replaced per group (targeted delete + insert in one
//! transaction), with `ON CONFLICT DO UPDATE` on the insert covering
//! concurrent writers for the same key.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use engine_core::{
    ActiveRollup, ActiveStore, ActiveUserFact, DimensionTuple, LevelKey, LevelRollup,
    LevelUserFact, ProgressionStore, Result, RetentionRollup, RetentionStore, RetentionUserFact,
    RevenueRollup, RevenueStore, RevenueUserFact, SketchRecord,
};

use crate::db_err;
use crate::pool::PgStore;

// ============================================================================
// Level progression
// ============================================================================

#[derive(FromRow)]
struct LevelUserFactRow {
    game_id: Uuid,
    date: NaiveDate,
    user_id: Uuid,
    level: i32,
    funnel_tag: String,
    funnel_version: i32,
    platform: String,
    country: String,
    app_version: String,
    starts: i64,
    completes: i64,
    fails: i64,
    duration_ms: i64,
    duration_samples: i64,
    last_start_at: Option<DateTime<Utc>>,
}

impl From<LevelUserFactRow> for LevelUserFact {
    fn from(row: LevelUserFactRow) -> Self {
        Self {
            game_id: row.game_id,
            date: row.date,
            user_id: row.user_id,
            level: LevelKey {
                level: row.level,
                funnel_tag: row.funnel_tag,
                funnel_version: row.funnel_version,
            },
            dims: DimensionTuple {
                platform: row.platform,
                country: row.country,
                app_version: row.app_version,
            },
            starts: row.starts,
            completes: row.completes,
            fails: row.fails,
            duration_ms: row.duration_ms,
            duration_samples: row.duration_samples,
            last_start_at: row.last_start_at,
        }
    }
}

#[async_trait]
impl ProgressionStore for PgStore {
    async fn clear_day(&self, game_id: Uuid, date: NaiveDate) -> Result<()> {
        let mut tx = self.pool().begin().await.map_err(db_err)?;
        sqlx::query("DELETE FROM rollup_level_user_daily WHERE game_id = $1 AND date = $2")
            .bind(game_id)
            .bind(date)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        sqlx::query("DELETE FROM rollup_level_daily WHERE game_id = $1 AND date = $2")
            .bind(game_id)
            .bind(date)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)
    }

    async fn open_starts(
        &self,
        game_id: Uuid,
        date: NaiveDate,
    ) -> Result<HashMap<(Uuid, LevelKey), DateTime<Utc>>> {
        let rows: Vec<(Uuid, i32, String, i32, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT user_id, level, funnel_tag, funnel_version, last_start_at
            FROM rollup_level_user_daily
            WHERE game_id = $1 AND date = $2 AND last_start_at IS NOT NULL
            "#,
        )
        .bind(game_id)
        .bind(date)
        .fetch_all(self.pool())
        .await
        .map_err(db_err)?;

        Ok(rows
            .into_iter()
            .map(|(user_id, level, funnel_tag, funnel_version, started)| {
                (
                    (
                        user_id,
                        LevelKey {
                            level,
                            funnel_tag,
                            funnel_version,
                        },
                    ),
                    started,
                )
            })
            .collect())
    }

    async fn merge_user_facts(
        &self,
        deltas: Vec<LevelUserFact>,
    ) -> Result<Vec<(LevelKey, DimensionTuple)>> {
        let mut tx = self.pool().begin().await.map_err(db_err)?;
        let mut touched = HashSet::new();

        for d in deltas {
            let (platform, country, app_version): (String, String, String) = sqlx::query_as(
                r#"
                INSERT INTO rollup_level_user_daily
                    (game_id, date, user_id, level, funnel_tag, funnel_version,
                     platform, country, app_version,
                     starts, completes, fails, duration_ms, duration_samples, last_start_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
                ON CONFLICT (game_id, date, user_id, level, funnel_tag, funnel_version)
                DO UPDATE SET
                    starts = rollup_level_user_daily.starts + EXCLUDED.starts,
                    completes = rollup_level_user_daily.completes + EXCLUDED.completes,
                    fails = rollup_level_user_daily.fails + EXCLUDED.fails,
                    duration_ms = rollup_level_user_daily.duration_ms + EXCLUDED.duration_ms,
                    duration_samples = rollup_level_user_daily.duration_samples + EXCLUDED.duration_samples,
                    last_start_at = GREATEST(rollup_level_user_daily.last_start_at, EXCLUDED.last_start_at)
                RETURNING platform, country, app_version
                "#,
            )
            .bind(d.game_id)
            .bind(d.date)
            .bind(d.user_id)
            .bind(d.level.level)
            .bind(&d.level.funnel_tag)
            .bind(d.level.funnel_version)
            .bind(&d.dims.platform)
            .bind(&d.dims.country)
            .bind(&d.dims.app_version)
            .bind(d.starts)
            .bind(d.completes)
            .bind(d.fails)
            .bind(d.duration_ms)
            .bind(d.duration_samples)
            .bind(d.last_start_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(db_err)?;

            touched.insert((
                d.level.clone(),
                DimensionTuple {
                    platform,
                    country,
                    app_version,
                },
            ));
        }

        tx.commit().await.map_err(db_err)?;
        Ok(touched.into_iter().collect())
    }

    async fn user_facts(
        &self,
        game_id: Uuid,
        date: NaiveDate,
        groups: &[(LevelKey, DimensionTuple)],
    ) -> Result<Vec<LevelUserFact>> {
        let mut facts = Vec::new();

        for (level, dims) in groups {
            let rows: Vec<LevelUserFactRow> = sqlx::query_as(
                r#"
                SELECT game_id, date, user_id, level, funnel_tag, funnel_version,
                       platform, country, app_version,
                       starts, completes, fails, duration_ms, duration_samples, last_start_at
                FROM rollup_level_user_daily
                WHERE game_id = $1 AND date = $2
                  AND level = $3 AND funnel_tag = $4 AND funnel_version = $5
                  AND platform = $6 AND country = $7 AND app_version = $8
                "#,
            )
            .bind(game_id)
            .bind(date)
            .bind(level.level)
            .bind(&level.funnel_tag)
            .bind(level.funnel_version)
            .bind(&dims.platform)
            .bind(&dims.country)
            .bind(&dims.app_version)
            .fetch_all(self.pool())
            .await
            .map_err(db_err)?;

            facts.extend(rows.into_iter().map(LevelUserFact::from));
        }

        Ok(facts)
    }

    async fn replace_rollups(
        &self,
        game_id: Uuid,
        date: NaiveDate,
        groups: &[(LevelKey, DimensionTuple)],
        rows: Vec<LevelRollup>,
    ) -> Result<()> {
        let mut tx = self.pool().begin().await.map_err(db_err)?;

        for (level, dims) in groups {
            sqlx::query(
                r#"
                DELETE FROM rollup_level_daily
                WHERE game_id = $1 AND date = $2
                  AND level = $3 AND funnel_tag = $4 AND funnel_version = $5
                  AND platform = $6 AND country = $7 AND app_version = $8
                "#,
            )
            .bind(game_id)
            .bind(date)
            .bind(level.level)
            .bind(&level.funnel_tag)
            .bind(level.funnel_version)
            .bind(&dims.platform)
            .bind(&dims.country)
            .bind(&dims.app_version)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        for r in rows {
            sqlx::query(
                r#"
                INSERT INTO rollup_level_daily
                    (game_id, date, level, funnel_tag, funnel_version,
                     platform, country, app_version,
                     starts, completes, fails,
                     started_players, completed_players, failed_players,
                     duration_ms, duration_samples, computed_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, now())
                ON CONFLICT (game_id, date, level, funnel_tag, funnel_version, platform, country, app_version)
                DO UPDATE SET
                    starts = EXCLUDED.starts,
                    completes = EXCLUDED.completes,
                    fails = EXCLUDED.fails,
                    started_players = EXCLUDED.started_players,
                    completed_players = EXCLUDED.completed_players,
                    failed_players = EXCLUDED.failed_players,
                    duration_ms = EXCLUDED.duration_ms,
                    duration_samples = EXCLUDED.duration_samples,
                    computed_at = now()
                "#,
            )
            .bind(r.game_id)
            .bind(r.date)
            .bind(r.level.level)
            .bind(&r.level.funnel_tag)
            .bind(r.level.funnel_version)
            .bind(&r.dims.platform)
            .bind(&r.dims.country)
            .bind(&r.dims.app_version)
            .bind(r.starts)
            .bind(r.completes)
            .bind(r.fails)
            .bind(r.started_players)
            .bind(r.completed_players)
            .bind(r.failed_players)
            .bind(r.duration_ms)
            .bind(r.duration_samples)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)
    }
}

// ============================================================================
// Active users
// ============================================================================

#[async_trait]
impl ActiveStore for PgStore {
    async fn clear_day(&self, game_id: Uuid, date: NaiveDate) -> Result<()> {
        let mut tx = self.pool().begin().await.map_err(db_err)?;
        for table in [
            "rollup_active_user_daily",
            "rollup_active_daily",
            "rollup_active_sketch_daily",
        ] {
            sqlx::query(&format!(
                "DELETE FROM {table} WHERE game_id = $1 AND date = $2"
            ))
            .bind(game_id)
            .bind(date)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)
    }

    async fn merge_user_facts(&self, deltas: Vec<ActiveUserFact>) -> Result<Vec<DimensionTuple>> {
        let mut tx = self.pool().begin().await.map_err(db_err)?;
        let mut touched = HashSet::new();

        for d in deltas {
            let (platform, country, app_version): (String, String, String) = sqlx::query_as(
                r#"
                INSERT INTO rollup_active_user_daily
                    (game_id, date, user_id, platform, country, app_version, sessions, session_ms)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (game_id, date, user_id)
                DO UPDATE SET
                    sessions = rollup_active_user_daily.sessions + EXCLUDED.sessions,
                    session_ms = rollup_active_user_daily.session_ms + EXCLUDED.session_ms
                RETURNING platform, country, app_version
                "#,
            )
            .bind(d.game_id)
            .bind(d.date)
            .bind(d.user_id)
            .bind(&d.dims.platform)
            .bind(&d.dims.country)
            .bind(&d.dims.app_version)
            .bind(d.sessions)
            .bind(d.session_ms)
            .fetch_one(&mut *tx)
            .await
            .map_err(db_err)?;

            touched.insert(DimensionTuple {
                platform,
                country,
                app_version,
            });
        }

        tx.commit().await.map_err(db_err)?;
        Ok(touched.into_iter().collect())
    }

    async fn user_facts(
        &self,
        game_id: Uuid,
        date: NaiveDate,
        groups: &[DimensionTuple],
    ) -> Result<Vec<ActiveUserFact>> {
        let mut facts = Vec::new();

        for dims in groups {
            let rows: Vec<(Uuid, i64, i64)> = sqlx::query_as(
                r#"
                SELECT user_id, sessions, session_ms
                FROM rollup_active_user_daily
                WHERE game_id = $1 AND date = $2
                  AND platform = $3 AND country = $4 AND app_version = $5
                "#,
            )
            .bind(game_id)
            .bind(date)
            .bind(&dims.platform)
            .bind(&dims.country)
            .bind(&dims.app_version)
            .fetch_all(self.pool())
            .await
            .map_err(db_err)?;

            facts.extend(rows.into_iter().map(|(user_id, sessions, session_ms)| {
                ActiveUserFact {
                    game_id,
                    date,
                    user_id,
                    dims: dims.clone(),
                    sessions,
                    session_ms,
                }
            }));
        }

        Ok(facts)
    }

    async fn replace_rollups(
        &self,
        game_id: Uuid,
        date: NaiveDate,
        groups: &[DimensionTuple],
        rows: Vec<ActiveRollup>,
    ) -> Result<()> {
        let mut tx = self.pool().begin().await.map_err(db_err)?;

        for dims in groups {
            sqlx::query(
                r#"
                DELETE FROM rollup_active_daily
                WHERE game_id = $1 AND date = $2
                  AND platform = $3 AND country = $4 AND app_version = $5
                "#,
            )
            .bind(game_id)
            .bind(date)
            .bind(&dims.platform)
            .bind(&dims.country)
            .bind(&dims.app_version)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        for r in rows {
            sqlx::query(
                r#"
                INSERT INTO rollup_active_daily
                    (game_id, date, platform, country, app_version,
                     dau, sessions, session_ms, computed_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now())
                ON CONFLICT (game_id, date, platform, country, app_version)
                DO UPDATE SET
                    dau = EXCLUDED.dau,
                    sessions = EXCLUDED.sessions,
                    session_ms = EXCLUDED.session_ms,
                    computed_at = now()
                "#,
            )
            .bind(r.game_id)
            .bind(r.date)
            .bind(&r.dims.platform)
            .bind(&r.dims.country)
            .bind(&r.dims.app_version)
            .bind(r.dau)
            .bind(r.sessions)
            .bind(r.session_ms)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)
    }

    async fn put_sketches(&self, records: Vec<SketchRecord>) -> Result<()> {
        let mut tx = self.pool().begin().await.map_err(db_err)?;

        for rec in records {
            sqlx::query(
                r#"
                INSERT INTO rollup_active_sketch_daily
                    (game_id, date, platform, country, app_version, sketch, computed_at)
                VALUES ($1, $2, $3, $4, $5, $6, now())
                ON CONFLICT (game_id, date, platform, country, app_version)
                DO UPDATE SET sketch = EXCLUDED.sketch, computed_at = now()
                "#,
            )
            .bind(rec.game_id)
            .bind(rec.date)
            .bind(&rec.dims.platform)
            .bind(&rec.dims.country)
            .bind(&rec.dims.app_version)
            .bind(&rec.bytes)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)
    }

    async fn sketches_in_range(
        &self,
        game_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<SketchRecord>> {
        let rows: Vec<(NaiveDate, String, String, String, Vec<u8>)> = sqlx::query_as(
            r#"
            SELECT date, platform, country, app_version, sketch
            FROM rollup_active_sketch_daily
            WHERE game_id = $1 AND date >= $2 AND date <= $3
            ORDER BY date
            "#,
        )
        .bind(game_id)
        .bind(from)
        .bind(to)
        .fetch_all(self.pool())
        .await
        .map_err(db_err)?;

        Ok(rows
            .into_iter()
            .map(|(date, platform, country, app_version, bytes)| SketchRecord {
                game_id,
                date,
                dims: DimensionTuple {
                    platform,
                    country,
                    app_version,
                },
                bytes,
            })
            .collect())
    }
}

// ============================================================================
// Cohort retention
// ============================================================================

#[async_trait]
impl RetentionStore for PgStore {
    async fn clear_day(&self, game_id: Uuid, date: NaiveDate) -> Result<()> {
        let mut tx = self.pool().begin().await.map_err(db_err)?;
        sqlx::query("DELETE FROM rollup_retention_user_daily WHERE game_id = $1 AND date = $2")
            .bind(game_id)
            .bind(date)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        sqlx::query("DELETE FROM rollup_retention_daily WHERE game_id = $1 AND date = $2")
            .bind(game_id)
            .bind(date)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)
    }

    async fn merge_user_facts(
        &self,
        deltas: Vec<RetentionUserFact>,
    ) -> Result<Vec<(NaiveDate, DimensionTuple)>> {
        let mut tx = self.pool().begin().await.map_err(db_err)?;
        let mut touched = HashSet::new();

        for d in deltas {
            let (cohort_date, platform, country, app_version): (
                NaiveDate,
                String,
                String,
                String,
            ) = sqlx::query_as(
                r#"
                INSERT INTO rollup_retention_user_daily
                    (game_id, date, user_id, cohort_date, platform, country, app_version)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (game_id, date, user_id) DO UPDATE SET user_id = EXCLUDED.user_id
                RETURNING cohort_date, platform, country, app_version
                "#,
            )
            .bind(d.game_id)
            .bind(d.date)
            .bind(d.user_id)
            .bind(d.cohort_date)
            .bind(&d.dims.platform)
            .bind(&d.dims.country)
            .bind(&d.dims.app_version)
            .fetch_one(&mut *tx)
            .await
            .map_err(db_err)?;

            touched.insert((
                cohort_date,
                DimensionTuple {
                    platform,
                    country,
                    app_version,
                },
            ));
        }

        tx.commit().await.map_err(db_err)?;
        Ok(touched.into_iter().collect())
    }

    async fn user_facts(
        &self,
        game_id: Uuid,
        date: NaiveDate,
        groups: &[(NaiveDate, DimensionTuple)],
    ) -> Result<Vec<RetentionUserFact>> {
        let mut facts = Vec::new();

        for (cohort_date, dims) in groups {
            let rows: Vec<(Uuid,)> = sqlx::query_as(
                r#"
                SELECT user_id
                FROM rollup_retention_user_daily
                WHERE game_id = $1 AND date = $2 AND cohort_date = $3
                  AND platform = $4 AND country = $5 AND app_version = $6
                "#,
            )
            .bind(game_id)
            .bind(date)
            .bind(cohort_date)
            .bind(&dims.platform)
            .bind(&dims.country)
            .bind(&dims.app_version)
            .fetch_all(self.pool())
            .await
            .map_err(db_err)?;

            facts.extend(rows.into_iter().map(|(user_id,)| RetentionUserFact {
                game_id,
                date,
                user_id,
                cohort_date: *cohort_date,
                dims: dims.clone(),
            }));
        }

        Ok(facts)
    }

    async fn replace_rollups(
        &self,
        game_id: Uuid,
        date: NaiveDate,
        groups: &[(NaiveDate, DimensionTuple)],
        rows: Vec<RetentionRollup>,
    ) -> Result<()> {
        let mut tx = self.pool().begin().await.map_err(db_err)?;

        for (cohort_date, dims) in groups {
            sqlx::query(
                r#"
                DELETE FROM rollup_retention_daily
                WHERE game_id = $1 AND date = $2 AND cohort_date = $3
                  AND platform = $4 AND country = $5 AND app_version = $6
                "#,
            )
            .bind(game_id)
            .bind(date)
            .bind(cohort_date)
            .bind(&dims.platform)
            .bind(&dims.country)
            .bind(&dims.app_version)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        for r in rows {
            sqlx::query(
                r#"
                INSERT INTO rollup_retention_daily
                    (game_id, date, cohort_date, platform, country, app_version,
                     day_number, retained_users, computed_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now())
                ON CONFLICT (game_id, date, cohort_date, platform, country, app_version)
                DO UPDATE SET
                    day_number = EXCLUDED.day_number,
                    retained_users = EXCLUDED.retained_users,
                    computed_at = now()
                "#,
            )
            .bind(r.game_id)
            .bind(r.date)
            .bind(r.cohort_date)
            .bind(&r.dims.platform)
            .bind(&r.dims.country)
            .bind(&r.dims.app_version)
            .bind(r.day_number)
            .bind(r.retained_users)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)
    }
}

// ============================================================================
// Monetization
// ============================================================================

#[async_trait]
impl RevenueStore for PgStore {
    async fn clear_day(&self, game_id: Uuid, date: NaiveDate) -> Result<()> {
        let mut tx = self.pool().begin().await.map_err(db_err)?;
        sqlx::query("DELETE FROM rollup_revenue_user_daily WHERE game_id = $1 AND date = $2")
            .bind(game_id)
            .bind(date)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        sqlx::query("DELETE FROM rollup_revenue_daily WHERE game_id = $1 AND date = $2")
            .bind(game_id)
            .bind(date)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)
    }

    async fn merge_user_facts(&self, deltas: Vec<RevenueUserFact>) -> Result<Vec<DimensionTuple>> {
        let mut tx = self.pool().begin().await.map_err(db_err)?;
        let mut touched = HashSet::new();

        for d in deltas {
            let (platform, country, app_version): (String, String, String) = sqlx::query_as(
                r#"
                INSERT INTO rollup_revenue_user_daily
                    (game_id, date, user_id, platform, country, app_version,
                     revenue_cents, purchases)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (game_id, date, user_id)
                DO UPDATE SET
                    revenue_cents = rollup_revenue_user_daily.revenue_cents + EXCLUDED.revenue_cents,
                    purchases = rollup_revenue_user_daily.purchases + EXCLUDED.purchases
                RETURNING platform, country, app_version
                "#,
            )
            .bind(d.game_id)
            .bind(d.date)
            .bind(d.user_id)
            .bind(&d.dims.platform)
            .bind(&d.dims.country)
            .bind(&d.dims.app_version)
            .bind(d.revenue_cents)
            .bind(d.purchases)
            .fetch_one(&mut *tx)
            .await
            .map_err(db_err)?;

            touched.insert(DimensionTuple {
                platform,
                country,
                app_version,
            });
        }

        tx.commit().await.map_err(db_err)?;
        Ok(touched.into_iter().collect())
    }

    async fn user_facts(
        &self,
        game_id: Uuid,
        date: NaiveDate,
        groups: &[DimensionTuple],
    ) -> Result<Vec<RevenueUserFact>> {
        let mut facts = Vec::new();

        for dims in groups {
            let rows: Vec<(Uuid, i64, i64)> = sqlx::query_as(
                r#"
                SELECT user_id, revenue_cents, purchases
                FROM rollup_revenue_user_daily
                WHERE game_id = $1 AND date = $2
                  AND platform = $3 AND country = $4 AND app_version = $5
                "#,
            )
            .bind(game_id)
            .bind(date)
            .bind(&dims.platform)
            .bind(&dims.country)
            .bind(&dims.app_version)
            .fetch_all(self.pool())
            .await
            .map_err(db_err)?;

            facts.extend(rows.into_iter().map(|(user_id, revenue_cents, purchases)| {
                RevenueUserFact {
                    game_id,
                    date,
                    user_id,
                    dims: dims.clone(),
                    revenue_cents,
                    purchases,
                }
            }));
        }

        Ok(facts)
    }

    async fn replace_rollups(
        &self,
        game_id: Uuid,
        date: NaiveDate,
        groups: &[DimensionTuple],
        rows: Vec<RevenueRollup>,
    ) -> Result<()> {
        let mut tx = self.pool().begin().await.map_err(db_err)?;

        for dims in groups {
            sqlx::query(
                r#"
                DELETE FROM rollup_revenue_daily
                WHERE game_id = $1 AND date = $2
                  AND platform = $3 AND country = $4 AND app_version = $5
                "#,
            )
            .bind(game_id)
            .bind(date)
            .bind(&dims.platform)
            .bind(&dims.country)
            .bind(&dims.app_version)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        for r in rows {
            sqlx::query(
                r#"
                INSERT INTO rollup_revenue_daily
                    (game_id, date, platform, country, app_version,
                     revenue_cents, purchases, payers, computed_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now())
                ON CONFLICT (game_id, date, platform, country, app_version)
                DO UPDATE SET
                    revenue_cents = EXCLUDED.revenue_cents,
                    purchases = EXCLUDED.purchases,
                    payers = EXCLUDED.payers,
                    computed_at = now()
                "#,
            )
            .bind(r.game_id)
            .bind(r.date)
            .bind(&r.dims.platform)
            .bind(&r.dims.country)
            .bind(&r.dims.app_version)
            .bind(r.revenue_cents)
            .bind(r.purchases)
            .bind(r.payers)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)
    }
}
