//! Raw fact reads: window scans for the rollup engines and keyset batches
//! for the sync pipeline.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use engine_core::{
    event_names, EventFact, FactStore, InstallFact, Result, RevenueFact, SessionFact, SourceBatch,
    SourceTable, SyncSource, TimeWindow, Watermark,
};

use crate::db_err;
use crate::pool::PgStore;

// Cursor used when a pipeline has no watermark yet: the Unix epoch sorts
// strictly before any real telemetry row.
fn cursor_of(after: Option<&Watermark>) -> (DateTime<Utc>, Uuid) {
    match after {
        Some(wm) => (wm.last_timestamp, wm.last_id),
        None => (
            DateTime::from_timestamp(0, 0).unwrap_or_default(),
            Uuid::nil(),
        ),
    }
}

#[derive(FromRow)]
struct EventRow {
    id: Uuid,
    game_id: Uuid,
    user_id: Option<Uuid>,
    session_id: Option<Uuid>,
    name: String,
    occurred_at: DateTime<Utc>,
    platform: Option<String>,
    country: Option<String>,
    app_version: Option<String>,
    level: Option<i32>,
    funnel_tag: Option<String>,
    funnel_version: Option<i32>,
    properties: serde_json::Value,
}

impl From<EventRow> for EventFact {
    fn from(row: EventRow) -> Self {
        Self {
            id: row.id,
            game_id: row.game_id,
            user_id: row.user_id,
            session_id: row.session_id,
            name: row.name,
            occurred_at: row.occurred_at,
            platform: row.platform,
            country: row.country,
            app_version: row.app_version,
            level: row.level,
            funnel_tag: row.funnel_tag,
            funnel_version: row.funnel_version,
            properties: row.properties,
        }
    }
}

#[derive(FromRow)]
struct SessionRow {
    id: Uuid,
    game_id: Uuid,
    user_id: Uuid,
    started_at: DateTime<Utc>,
    duration_ms: i64,
    platform: Option<String>,
    country: Option<String>,
    app_version: Option<String>,
}

impl From<SessionRow> for SessionFact {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.id,
            game_id: row.game_id,
            user_id: row.user_id,
            started_at: row.started_at,
            duration_ms: row.duration_ms,
            platform: row.platform,
            country: row.country,
            app_version: row.app_version,
        }
    }
}

#[derive(FromRow)]
struct RevenueRow {
    id: Uuid,
    game_id: Uuid,
    user_id: Uuid,
    occurred_at: DateTime<Utc>,
    product_id: String,
    amount_cents: i64,
    currency: String,
    platform: Option<String>,
    country: Option<String>,
    app_version: Option<String>,
}

impl From<RevenueRow> for RevenueFact {
    fn from(row: RevenueRow) -> Self {
        Self {
            id: row.id,
            game_id: row.game_id,
            user_id: row.user_id,
            occurred_at: row.occurred_at,
            product_id: row.product_id,
            amount_cents: row.amount_cents,
            currency: row.currency,
            platform: row.platform,
            country: row.country,
            app_version: row.app_version,
        }
    }
}

#[derive(FromRow)]
struct InstallRow {
    id: Uuid,
    game_id: Uuid,
    user_id: Uuid,
    installed_at: DateTime<Utc>,
    platform: Option<String>,
    country: Option<String>,
    app_version: Option<String>,
}

impl From<InstallRow> for InstallFact {
    fn from(row: InstallRow) -> Self {
        Self {
            id: row.id,
            game_id: row.game_id,
            user_id: row.user_id,
            installed_at: row.installed_at,
            platform: row.platform,
            country: row.country,
            app_version: row.app_version,
        }
    }
}

#[async_trait]
impl FactStore for PgStore {
    async fn games_with_activity(&self, window: &TimeWindow) -> Result<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT game_id FROM events WHERE occurred_at >= $1 AND occurred_at < $2
            UNION
            SELECT DISTINCT game_id FROM sessions WHERE started_at >= $1 AND started_at < $2
            UNION
            SELECT DISTINCT game_id FROM revenue WHERE occurred_at >= $1 AND occurred_at < $2
            "#,
        )
        .bind(window.start)
        .bind(window.end)
        .fetch_all(self.pool())
        .await
        .map_err(db_err)?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn level_events(&self, game_id: Uuid, window: &TimeWindow) -> Result<Vec<EventFact>> {
        let names: Vec<String> = event_names::PROGRESSION
            .iter()
            .map(|s| s.to_string())
            .collect();

        let rows: Vec<EventRow> = sqlx::query_as(
            r#"
            SELECT id, game_id, user_id, session_id, name, occurred_at,
                   platform, country, app_version, level, funnel_tag, funnel_version, properties
            FROM events
            WHERE game_id = $1 AND occurred_at >= $2 AND occurred_at < $3 AND name = ANY($4)
            ORDER BY occurred_at, id
            "#,
        )
        .bind(game_id)
        .bind(window.start)
        .bind(window.end)
        .bind(&names)
        .fetch_all(self.pool())
        .await
        .map_err(db_err)?;

        Ok(rows.into_iter().map(EventFact::from).collect())
    }

    async fn sessions_in(&self, game_id: Uuid, window: &TimeWindow) -> Result<Vec<SessionFact>> {
        let rows: Vec<SessionRow> = sqlx::query_as(
            r#"
            SELECT id, game_id, user_id, started_at, duration_ms, platform, country, app_version
            FROM sessions
            WHERE game_id = $1 AND started_at >= $2 AND started_at < $3
            ORDER BY started_at, id
            "#,
        )
        .bind(game_id)
        .bind(window.start)
        .bind(window.end)
        .fetch_all(self.pool())
        .await
        .map_err(db_err)?;

        Ok(rows.into_iter().map(SessionFact::from).collect())
    }

    async fn revenue_in(&self, game_id: Uuid, window: &TimeWindow) -> Result<Vec<RevenueFact>> {
        let rows: Vec<RevenueRow> = sqlx::query_as(
            r#"
            SELECT id, game_id, user_id, occurred_at, product_id, amount_cents, currency,
                   platform, country, app_version
            FROM revenue
            WHERE game_id = $1 AND occurred_at >= $2 AND occurred_at < $3
            ORDER BY occurred_at, id
            "#,
        )
        .bind(game_id)
        .bind(window.start)
        .bind(window.end)
        .fetch_all(self.pool())
        .await
        .map_err(db_err)?;

        Ok(rows.into_iter().map(RevenueFact::from).collect())
    }

    async fn installs_for_users(
        &self,
        game_id: Uuid,
        users: &[Uuid],
    ) -> Result<Vec<InstallFact>> {
        if users.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<InstallRow> = sqlx::query_as(
            r#"
            SELECT id, game_id, user_id, installed_at, platform, country, app_version
            FROM installs
            WHERE game_id = $1 AND user_id = ANY($2)
            "#,
        )
        .bind(game_id)
        .bind(users)
        .fetch_all(self.pool())
        .await
        .map_err(db_err)?;

        Ok(rows.into_iter().map(InstallFact::from).collect())
    }
}

#[async_trait]
impl SyncSource for PgStore {
    async fn fetch_after(
        &self,
        table: SourceTable,
        after: Option<&Watermark>,
        limit: u32,
    ) -> Result<SourceBatch> {
        let (ts, id) = cursor_of(after);
        let limit = i64::from(limit);

        // Composite (timestamp, id) tie-break keyset: strictly after the
        // watermark, never revisiting a delivered row.
        let batch = match table {
            SourceTable::Events => {
                let rows: Vec<EventRow> = sqlx::query_as(
                    r#"
                    SELECT id, game_id, user_id, session_id, name, occurred_at,
                           platform, country, app_version, level, funnel_tag,
                           funnel_version, properties
                    FROM events
                    WHERE (occurred_at, id) > ($1, $2)
                    ORDER BY occurred_at, id
                    LIMIT $3
                    "#,
                )
                .bind(ts)
                .bind(id)
                .bind(limit)
                .fetch_all(self.pool())
                .await
                .map_err(db_err)?;
                SourceBatch::Events(rows.into_iter().map(EventFact::from).collect())
            }
            SourceTable::Sessions => {
                let rows: Vec<SessionRow> = sqlx::query_as(
                    r#"
                    SELECT id, game_id, user_id, started_at, duration_ms,
                           platform, country, app_version
                    FROM sessions
                    WHERE (started_at, id) > ($1, $2)
                    ORDER BY started_at, id
                    LIMIT $3
                    "#,
                )
                .bind(ts)
                .bind(id)
                .bind(limit)
                .fetch_all(self.pool())
                .await
                .map_err(db_err)?;
                SourceBatch::Sessions(rows.into_iter().map(SessionFact::from).collect())
            }
            SourceTable::Revenue => {
                let rows: Vec<RevenueRow> = sqlx::query_as(
                    r#"
                    SELECT id, game_id, user_id, occurred_at, product_id, amount_cents,
                           currency, platform, country, app_version
                    FROM revenue
                    WHERE (occurred_at, id) > ($1, $2)
                    ORDER BY occurred_at, id
                    LIMIT $3
                    "#,
                )
                .bind(ts)
                .bind(id)
                .bind(limit)
                .fetch_all(self.pool())
                .await
                .map_err(db_err)?;
                SourceBatch::Revenue(rows.into_iter().map(RevenueFact::from).collect())
            }
            SourceTable::Installs => {
                let rows: Vec<InstallRow> = sqlx::query_as(
                    r#"
                    SELECT id, game_id, user_id, installed_at, platform, country, app_version
                    FROM installs
                    WHERE (installed_at, id) > ($1, $2)
                    ORDER BY installed_at, id
                    LIMIT $3
                    "#,
                )
                .bind(ts)
                .bind(id)
                .bind(limit)
                .fetch_all(self.pool())
                .await
                .map_err(db_err)?;
                SourceBatch::Installs(rows.into_iter().map(InstallFact::from).collect())
            }
        };

        Ok(batch)
    }
}
