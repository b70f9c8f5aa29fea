//! ClickHouse table schemas.
//!
//! One denormalized table per replicated fact table, all ordered by
//! `(game_id, timestamp, id)` to match the sync cursor so re-delivered
//! rows after a crash land on the same key.

/// SQL for creating the events table.
pub const CREATE_EVENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS gamepulse.events (
    id String,
    game_id String,
    user_id Nullable(String),
    session_id Nullable(String),
    name LowCardinality(String),
    timestamp DateTime64(3),

    platform LowCardinality(Nullable(String)),
    country LowCardinality(Nullable(String)),
    app_version Nullable(String),

    level Nullable(Int32),
    funnel_tag Nullable(String),
    funnel_version Nullable(Int32),

    -- Extensible JSON blob for event-specific fields
    properties String,

    created_at DateTime DEFAULT now()
)
ENGINE = MergeTree()
PARTITION BY toYYYYMM(timestamp)
ORDER BY (game_id, timestamp, id)
SETTINGS index_granularity = 8192
"#;

/// SQL for creating the sessions table.
pub const CREATE_SESSIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS gamepulse.sessions (
    id String,
    game_id String,
    user_id String,
    timestamp DateTime64(3),
    duration_ms Int64,

    platform LowCardinality(Nullable(String)),
    country LowCardinality(Nullable(String)),
    app_version Nullable(String),

    created_at DateTime DEFAULT now()
)
ENGINE = MergeTree()
PARTITION BY toYYYYMM(timestamp)
ORDER BY (game_id, timestamp, id)
SETTINGS index_granularity = 8192
"#;

/// SQL for creating the revenue table.
pub const CREATE_REVENUE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS gamepulse.revenue (
    id String,
    game_id String,
    user_id String,
    timestamp DateTime64(3),
    product_id String,
    amount_cents Int64,
    currency LowCardinality(String),

    platform LowCardinality(Nullable(String)),
    country LowCardinality(Nullable(String)),
    app_version Nullable(String),

    created_at DateTime DEFAULT now()
)
ENGINE = MergeTree()
PARTITION BY toYYYYMM(timestamp)
ORDER BY (game_id, timestamp, id)
SETTINGS index_granularity = 8192
"#;

/// SQL for creating the installs table.
pub const CREATE_INSTALLS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS gamepulse.installs (
    id String,
    game_id String,
    user_id String,
    timestamp DateTime64(3),

    platform LowCardinality(Nullable(String)),
    country LowCardinality(Nullable(String)),
    app_version Nullable(String),

    created_at DateTime DEFAULT now()
)
ENGINE = MergeTree()
PARTITION BY toYYYYMM(timestamp)
ORDER BY (game_id, timestamp, id)
SETTINGS index_granularity = 8192
"#;

/// SQL for creating the database.
pub const CREATE_DATABASE: &str = r#"
CREATE DATABASE IF NOT EXISTS gamepulse
"#;

/// All statements in execution order, database first.
pub fn all_tables() -> Vec<&'static str> {
    vec![
        CREATE_DATABASE,
        CREATE_EVENTS_TABLE,
        CREATE_SESSIONS_TABLE,
        CREATE_REVENUE_TABLE,
        CREATE_INSTALLS_TABLE,
    ]
}
