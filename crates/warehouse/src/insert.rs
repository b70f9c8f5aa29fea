//! Batch insert helpers for ClickHouse.

use clickhouse::Row;
use serde::{Deserialize, Serialize};
use tracing::debug;

use engine_core::{Error, EventFact, InstallFact, Result, RevenueFact, SessionFact};
use telemetry::metrics::metrics;

use crate::client::ClickHouseClient;

/// Flattened event row for ClickHouse insertion.
#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct EventRow {
    pub id: String,
    pub game_id: String,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub name: String,
    pub timestamp: i64, // DateTime64(3) as milliseconds
    pub platform: Option<String>,
    pub country: Option<String>,
    pub app_version: Option<String>,
    pub level: Option<i32>,
    pub funnel_tag: Option<String>,
    pub funnel_version: Option<i32>,
    pub properties: String, // JSON blob
}

impl From<EventFact> for EventRow {
    fn from(fact: EventFact) -> Self {
        Self {
            id: fact.id.to_string(),
            game_id: fact.game_id.to_string(),
            user_id: fact.user_id.map(|u| u.to_string()),
            session_id: fact.session_id.map(|s| s.to_string()),
            name: fact.name,
            timestamp: fact.occurred_at.timestamp_millis(),
            platform: fact.platform,
            country: fact.country,
            app_version: fact.app_version,
            level: fact.level,
            funnel_tag: fact.funnel_tag,
            funnel_version: fact.funnel_version,
            properties: fact.properties.to_string(),
        }
    }
}

/// Row for gamepulse.sessions.
#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct SessionRow {
    pub id: String,
    pub game_id: String,
    pub user_id: String,
    pub timestamp: i64,
    pub duration_ms: i64,
    pub platform: Option<String>,
    pub country: Option<String>,
    pub app_version: Option<String>,
}

impl From<SessionFact> for SessionRow {
    fn from(fact: SessionFact) -> Self {
        Self {
            id: fact.id.to_string(),
            game_id: fact.game_id.to_string(),
            user_id: fact.user_id.to_string(),
            timestamp: fact.started_at.timestamp_millis(),
            duration_ms: fact.duration_ms,
            platform: fact.platform,
            country: fact.country,
            app_version: fact.app_version,
        }
    }
}

/// Row for gamepulse.revenue.
#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct RevenueRow {
    pub id: String,
    pub game_id: String,
    pub user_id: String,
    pub timestamp: i64,
    pub product_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub platform: Option<String>,
    pub country: Option<String>,
    pub app_version: Option<String>,
}

impl From<RevenueFact> for RevenueRow {
    fn from(fact: RevenueFact) -> Self {
        Self {
            id: fact.id.to_string(),
            game_id: fact.game_id.to_string(),
            user_id: fact.user_id.to_string(),
            timestamp: fact.occurred_at.timestamp_millis(),
            product_id: fact.product_id,
            amount_cents: fact.amount_cents,
            currency: fact.currency,
            platform: fact.platform,
            country: fact.country,
            app_version: fact.app_version,
        }
    }
}

/// Row for gamepulse.installs.
#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct InstallRow {
    pub id: String,
    pub game_id: String,
    pub user_id: String,
    pub timestamp: i64,
    pub platform: Option<String>,
    pub country: Option<String>,
    pub app_version: Option<String>,
}

impl From<InstallFact> for InstallRow {
    fn from(fact: InstallFact) -> Self {
        Self {
            id: fact.id.to_string(),
            game_id: fact.game_id.to_string(),
            user_id: fact.user_id.to_string(),
            timestamp: fact.installed_at.timestamp_millis(),
            platform: fact.platform,
            country: fact.country,
            app_version: fact.app_version,
        }
    }
}

async fn insert_rows<R: Row + Serialize>(
    client: &ClickHouseClient,
    table: &str,
    rows: &[R],
) -> Result<usize> {
    if rows.is_empty() {
        return Ok(0);
    }

    let start = std::time::Instant::now();

    let mut insert = client
        .inner()
        .insert(table)
        .map_err(|e| Error::destination(format!("insert {}: {}", table, e)))?;

    for row in rows {
        insert
            .write(row)
            .await
            .map_err(|e| Error::destination(format!("write {}: {}", table, e)))?;
    }

    insert
        .end()
        .await
        .map_err(|e| Error::destination(format!("end {}: {}", table, e)))?;

    let elapsed = start.elapsed();
    metrics().sync_batch_latency_ms.observe(elapsed.as_millis() as u64);

    debug!(
        table = table,
        count = rows.len(),
        latency_ms = %elapsed.as_millis(),
        "Inserted rows to ClickHouse"
    );

    Ok(rows.len())
}

/// Insert replicated event facts.
pub async fn insert_events(client: &ClickHouseClient, facts: Vec<EventFact>) -> Result<usize> {
    let rows: Vec<EventRow> = facts.into_iter().map(EventRow::from).collect();
    insert_rows(client, "gamepulse.events", &rows).await
}

/// Insert replicated session facts.
pub async fn insert_sessions(client: &ClickHouseClient, facts: Vec<SessionFact>) -> Result<usize> {
    let rows: Vec<SessionRow> = facts.into_iter().map(SessionRow::from).collect();
    insert_rows(client, "gamepulse.sessions", &rows).await
}

/// Insert replicated revenue facts.
pub async fn insert_revenue(client: &ClickHouseClient, facts: Vec<RevenueFact>) -> Result<usize> {
    let rows: Vec<RevenueRow> = facts.into_iter().map(RevenueRow::from).collect();
    insert_rows(client, "gamepulse.revenue", &rows).await
}

/// Insert replicated install facts.
pub async fn insert_installs(client: &ClickHouseClient, facts: Vec<InstallFact>) -> Result<usize> {
    let rows: Vec<InstallRow> = facts.into_iter().map(InstallRow::from).collect();
    insert_rows(client, "gamepulse.installs", &rows).await
}
