//! Fact builders for tests.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use uuid::Uuid;

use engine_core::{EventFact, InstallFact, RevenueFact, SessionFact};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub fn at(date: NaiveDate, h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(h, m, s).expect("valid time"))
}

pub fn level_event(
    game_id: Uuid,
    user_id: Uuid,
    name: &str,
    level: i32,
    occurred_at: DateTime<Utc>,
) -> EventFact {
    EventFact {
        id: Uuid::new_v4(),
        game_id,
        user_id: Some(user_id),
        session_id: None,
        name: name.to_string(),
        occurred_at,
        platform: Some("ios".to_string()),
        country: Some("US".to_string()),
        app_version: Some("1.0.0".to_string()),
        level: Some(level),
        funnel_tag: None,
        funnel_version: None,
        properties: serde_json::json!({}),
    }
}

pub fn session(
    game_id: Uuid,
    user_id: Uuid,
    started_at: DateTime<Utc>,
    duration_ms: i64,
) -> SessionFact {
    SessionFact {
        id: Uuid::new_v4(),
        game_id,
        user_id,
        started_at,
        duration_ms,
        platform: Some("ios".to_string()),
        country: Some("US".to_string()),
        app_version: Some("1.0.0".to_string()),
    }
}

pub fn purchase(
    game_id: Uuid,
    user_id: Uuid,
    occurred_at: DateTime<Utc>,
    amount_cents: i64,
) -> RevenueFact {
    RevenueFact {
        id: Uuid::new_v4(),
        game_id,
        user_id,
        occurred_at,
        product_id: "gem_pack_small".to_string(),
        amount_cents,
        currency: "USD".to_string(),
        platform: Some("ios".to_string()),
        country: Some("US".to_string()),
        app_version: Some("1.0.0".to_string()),
    }
}

pub fn install(game_id: Uuid, user_id: Uuid, installed_at: DateTime<Utc>) -> InstallFact {
    InstallFact {
        id: Uuid::new_v4(),
        game_id,
        user_id,
        installed_at,
        platform: Some("ios".to_string()),
        country: Some("US".to_string()),
        app_version: Some("1.0.0".to_string()),
    }
}
