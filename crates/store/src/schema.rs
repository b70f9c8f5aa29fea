//! Row store schema owned by the aggregation engine.
//!
//! Raw fact tables (`events`, `sessions`, `revenue`, `installs`) are owned
//! and written by the ingestion service; their DDL is included here only so
//! local development and tests can stand up a complete database. The engine
//! exclusively owns the `rollup_*` and `sync_watermarks` tables.
//!
//! Every rollup table's unique key is the full dimension tuple plus date,
//! and writes use insert-or-on-conflict-update semantics.

/// Raw gameplay events (ingestion-owned).
pub const CREATE_EVENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS events (
    id UUID PRIMARY KEY,
    game_id UUID NOT NULL,
    user_id UUID,
    session_id UUID,
    name TEXT NOT NULL,
    occurred_at TIMESTAMPTZ NOT NULL,
    platform TEXT,
    country TEXT,
    app_version TEXT,
    level INT,
    funnel_tag TEXT,
    funnel_version INT,
    properties JSONB NOT NULL DEFAULT '{}'::jsonb
);
CREATE INDEX IF NOT EXISTS idx_events_game_time ON events (game_id, occurred_at, id);
CREATE INDEX IF NOT EXISTS idx_events_sync ON events (occurred_at, id)
"#;

/// Completed play sessions (ingestion-owned).
pub const CREATE_SESSIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    id UUID PRIMARY KEY,
    game_id UUID NOT NULL,
    user_id UUID NOT NULL,
    started_at TIMESTAMPTZ NOT NULL,
    duration_ms BIGINT NOT NULL DEFAULT 0,
    platform TEXT,
    country TEXT,
    app_version TEXT
);
CREATE INDEX IF NOT EXISTS idx_sessions_game_time ON sessions (game_id, started_at, id);
CREATE INDEX IF NOT EXISTS idx_sessions_sync ON sessions (started_at, id)
"#;

/// Verified purchases (ingestion-owned).
pub const CREATE_REVENUE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS revenue (
    id UUID PRIMARY KEY,
    game_id UUID NOT NULL,
    user_id UUID NOT NULL,
    occurred_at TIMESTAMPTZ NOT NULL,
    product_id TEXT NOT NULL,
    amount_cents BIGINT NOT NULL,
    currency TEXT NOT NULL DEFAULT 'USD',
    platform TEXT,
    country TEXT,
    app_version TEXT
);
CREATE INDEX IF NOT EXISTS idx_revenue_game_time ON revenue (game_id, occurred_at, id);
CREATE INDEX IF NOT EXISTS idx_revenue_sync ON revenue (occurred_at, id)
"#;

/// User creation records (ingestion-owned). The install date defines the
/// user's cohort.
pub const CREATE_INSTALLS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS installs (
    id UUID PRIMARY KEY,
    game_id UUID NOT NULL,
    user_id UUID NOT NULL,
    installed_at TIMESTAMPTZ NOT NULL,
    platform TEXT,
    country TEXT,
    app_version TEXT,
    UNIQUE (game_id, user_id)
);
CREATE INDEX IF NOT EXISTS idx_installs_sync ON installs (installed_at, id)
"#;

/// Per-(user, level, day) progression facts: the exact dedup unit for the
/// level funnel rollup. The primary key excludes the dimension columns so
/// the first-seen tuple sticks for the whole day.
pub const CREATE_LEVEL_USER_FACTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS rollup_level_user_daily (
    game_id UUID NOT NULL,
    date DATE NOT NULL,
    user_id UUID NOT NULL,
    level INT NOT NULL,
    funnel_tag TEXT NOT NULL,
    funnel_version INT NOT NULL,
    platform TEXT NOT NULL,
    country TEXT NOT NULL,
    app_version TEXT NOT NULL,
    starts BIGINT NOT NULL DEFAULT 0,
    completes BIGINT NOT NULL DEFAULT 0,
    fails BIGINT NOT NULL DEFAULT 0,
    duration_ms BIGINT NOT NULL DEFAULT 0,
    duration_samples BIGINT NOT NULL DEFAULT 0,
    last_start_at TIMESTAMPTZ,
    PRIMARY KEY (game_id, date, user_id, level, funnel_tag, funnel_version)
)
"#;

/// Daily level funnel rollups, read by dashboards.
pub const CREATE_LEVEL_ROLLUP_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS rollup_level_daily (
    game_id UUID NOT NULL,
    date DATE NOT NULL,
    level INT NOT NULL,
    funnel_tag TEXT NOT NULL,
    funnel_version INT NOT NULL,
    platform TEXT NOT NULL,
    country TEXT NOT NULL,
    app_version TEXT NOT NULL,
    starts BIGINT NOT NULL DEFAULT 0,
    completes BIGINT NOT NULL DEFAULT 0,
    fails BIGINT NOT NULL DEFAULT 0,
    started_players BIGINT NOT NULL DEFAULT 0,
    completed_players BIGINT NOT NULL DEFAULT 0,
    failed_players BIGINT NOT NULL DEFAULT 0,
    duration_ms BIGINT NOT NULL DEFAULT 0,
    duration_samples BIGINT NOT NULL DEFAULT 0,
    computed_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (game_id, date, level, funnel_tag, funnel_version, platform, country, app_version)
)
"#;

/// Per-(user, day) activity facts.
pub const CREATE_ACTIVE_USER_FACTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS rollup_active_user_daily (
    game_id UUID NOT NULL,
    date DATE NOT NULL,
    user_id UUID NOT NULL,
    platform TEXT NOT NULL,
    country TEXT NOT NULL,
    app_version TEXT NOT NULL,
    sessions BIGINT NOT NULL DEFAULT 0,
    session_ms BIGINT NOT NULL DEFAULT 0,
    PRIMARY KEY (game_id, date, user_id)
)
"#;

/// Daily active-users rollups. `dau` is exact; multi-day windows merge the
/// sketches in `rollup_active_sketch_daily` instead.
pub const CREATE_ACTIVE_ROLLUP_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS rollup_active_daily (
    game_id UUID NOT NULL,
    date DATE NOT NULL,
    platform TEXT NOT NULL,
    country TEXT NOT NULL,
    app_version TEXT NOT NULL,
    dau BIGINT NOT NULL DEFAULT 0,
    sessions BIGINT NOT NULL DEFAULT 0,
    session_ms BIGINT NOT NULL DEFAULT 0,
    computed_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (game_id, date, platform, country, app_version)
)
"#;

/// Serialized per-day cardinality sketches, replaced wholesale on re-run.
pub const CREATE_ACTIVE_SKETCH_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS rollup_active_sketch_daily (
    game_id UUID NOT NULL,
    date DATE NOT NULL,
    platform TEXT NOT NULL,
    country TEXT NOT NULL,
    app_version TEXT NOT NULL,
    sketch BYTEA NOT NULL,
    computed_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (game_id, date, platform, country, app_version)
)
"#;

/// Per-(user, activity day) retention facts with the user's cohort.
pub const CREATE_RETENTION_USER_FACTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS rollup_retention_user_daily (
    game_id UUID NOT NULL,
    date DATE NOT NULL,
    user_id UUID NOT NULL,
    cohort_date DATE NOT NULL,
    platform TEXT NOT NULL,
    country TEXT NOT NULL,
    app_version TEXT NOT NULL,
    PRIMARY KEY (game_id, date, user_id)
)
"#;

/// Daily retention rollups keyed by activity date and cohort date.
pub const CREATE_RETENTION_ROLLUP_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS rollup_retention_daily (
    game_id UUID NOT NULL,
    date DATE NOT NULL,
    cohort_date DATE NOT NULL,
    platform TEXT NOT NULL,
    country TEXT NOT NULL,
    app_version TEXT NOT NULL,
    day_number INT NOT NULL,
    retained_users BIGINT NOT NULL DEFAULT 0,
    computed_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (game_id, date, cohort_date, platform, country, app_version)
)
"#;

/// Per-(user, day) revenue facts.
pub const CREATE_REVENUE_USER_FACTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS rollup_revenue_user_daily (
    game_id UUID NOT NULL,
    date DATE NOT NULL,
    user_id UUID NOT NULL,
    platform TEXT NOT NULL,
    country TEXT NOT NULL,
    app_version TEXT NOT NULL,
    revenue_cents BIGINT NOT NULL DEFAULT 0,
    purchases BIGINT NOT NULL DEFAULT 0,
    PRIMARY KEY (game_id, date, user_id)
)
"#;

/// Daily monetization rollups.
pub const CREATE_REVENUE_ROLLUP_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS rollup_revenue_daily (
    game_id UUID NOT NULL,
    date DATE NOT NULL,
    platform TEXT NOT NULL,
    country TEXT NOT NULL,
    app_version TEXT NOT NULL,
    revenue_cents BIGINT NOT NULL DEFAULT 0,
    purchases BIGINT NOT NULL DEFAULT 0,
    payers BIGINT NOT NULL DEFAULT 0,
    computed_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (game_id, date, platform, country, app_version)
)
"#;

/// Replication cursors, one row per pipeline.
pub const CREATE_WATERMARKS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS sync_watermarks (
    pipeline TEXT PRIMARY KEY,
    last_timestamp TIMESTAMPTZ NOT NULL,
    last_id UUID NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

/// All table creation statements.
pub fn all_tables() -> Vec<&'static str> {
    vec![
        // Raw fact tables (ingestion-owned; dev/test convenience)
        CREATE_EVENTS_TABLE,
        CREATE_SESSIONS_TABLE,
        CREATE_REVENUE_TABLE,
        CREATE_INSTALLS_TABLE,
        // Engine-owned rollup state
        CREATE_LEVEL_USER_FACTS_TABLE,
        CREATE_LEVEL_ROLLUP_TABLE,
        CREATE_ACTIVE_USER_FACTS_TABLE,
        CREATE_ACTIVE_ROLLUP_TABLE,
        CREATE_ACTIVE_SKETCH_TABLE,
        CREATE_RETENTION_USER_FACTS_TABLE,
        CREATE_RETENTION_ROLLUP_TABLE,
        CREATE_REVENUE_USER_FACTS_TABLE,
        CREATE_REVENUE_ROLLUP_TABLE,
        CREATE_WATERMARKS_TABLE,
    ]
}

use crate::db_err;
use crate::pool::PgStore;
use engine_core::Result;

/// Initialize the database schema.
///
/// Creates all tables if they don't exist.
pub async fn init_schema(store: &PgStore) -> Result<()> {
    for ddl in all_tables() {
        sqlx::raw_sql(ddl)
            .execute(store.pool())
            .await
            .map_err(db_err)?;
    }
    Ok(())
}
