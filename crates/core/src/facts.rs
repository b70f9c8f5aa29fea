//! Raw fact types read from the row store.
//!
//! Facts are immutable and written by the ingestion service; the engine only
//! ever reads them. Rollups are derived state and always reproducible by
//! rerunning aggregation over these rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dimensions::{DimensionTuple, LevelKey};
use crate::error::{Error, Result};

/// Gameplay event names that drive the level-funnel rollup.
pub mod event_names {
    pub const LEVEL_START: &str = "level_start";
    pub const LEVEL_COMPLETE: &str = "level_complete";
    pub const LEVEL_FAIL: &str = "level_fail";

    pub const PROGRESSION: &[&str] = &[LEVEL_START, LEVEL_COMPLETE, LEVEL_FAIL];
}

/// What a progression event does to the funnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressionKind {
    Start,
    Complete,
    Fail,
}

/// A raw gameplay event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFact {
    pub id: Uuid,
    pub game_id: Uuid,
    pub user_id: Option<Uuid>,
    pub session_id: Option<Uuid>,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
    pub platform: Option<String>,
    pub country: Option<String>,
    pub app_version: Option<String>,
    pub level: Option<i32>,
    pub funnel_tag: Option<String>,
    pub funnel_version: Option<i32>,
    pub properties: serde_json::Value,
}

impl EventFact {
    /// The progression kind, if this is a level funnel event.
    pub fn progression_kind(&self) -> Option<ProgressionKind> {
        match self.name.as_str() {
            event_names::LEVEL_START => Some(ProgressionKind::Start),
            event_names::LEVEL_COMPLETE => Some(ProgressionKind::Complete),
            event_names::LEVEL_FAIL => Some(ProgressionKind::Fail),
            _ => None,
        }
    }

    /// The user this event attributes to, or a malformed-fact error.
    pub fn require_user(&self) -> Result<Uuid> {
        self.user_id
            .ok_or_else(|| Error::malformed_fact(self.id, "missing user_id"))
    }

    /// The level entity key, or a malformed-fact error for progression
    /// events without a level.
    pub fn require_level(&self) -> Result<LevelKey> {
        let level = self
            .level
            .ok_or_else(|| Error::malformed_fact(self.id, "progression event without level"))?;
        Ok(LevelKey::new(
            level,
            self.funnel_tag.as_deref(),
            self.funnel_version,
        ))
    }

    pub fn dims(&self) -> DimensionTuple {
        DimensionTuple::normalized(
            self.platform.as_deref(),
            self.country.as_deref(),
            self.app_version.as_deref(),
        )
    }
}

/// A completed play session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionFact {
    pub id: Uuid,
    pub game_id: Uuid,
    pub user_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub platform: Option<String>,
    pub country: Option<String>,
    pub app_version: Option<String>,
}

impl SessionFact {
    pub fn dims(&self) -> DimensionTuple {
        DimensionTuple::normalized(
            self.platform.as_deref(),
            self.country.as_deref(),
            self.app_version.as_deref(),
        )
    }
}

/// A verified purchase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevenueFact {
    pub id: Uuid,
    pub game_id: Uuid,
    pub user_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub product_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub platform: Option<String>,
    pub country: Option<String>,
    pub app_version: Option<String>,
}

impl RevenueFact {
    pub fn dims(&self) -> DimensionTuple {
        DimensionTuple::normalized(
            self.platform.as_deref(),
            self.country.as_deref(),
            self.app_version.as_deref(),
        )
    }
}

/// A user-creation record; the install date defines the user's cohort.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallFact {
    pub id: Uuid,
    pub game_id: Uuid,
    pub user_id: Uuid,
    pub installed_at: DateTime<Utc>,
    pub platform: Option<String>,
    pub country: Option<String>,
    pub app_version: Option<String>,
}

impl InstallFact {
    pub fn dims(&self) -> DimensionTuple {
        DimensionTuple::normalized(
            self.platform.as_deref(),
            self.country.as_deref(),
            self.app_version.as_deref(),
        )
    }
}
