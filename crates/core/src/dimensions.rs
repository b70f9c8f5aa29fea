//! Dimension tuples for rollup grouping.
//!
//! Every rollup row is keyed by the full dimension tuple plus date. A user
//! may ship slightly different dimension values across events within one day
//! (a mid-day app update, flaky geo tagging); the engines attribute all of a
//! user's activity for an entity to the *first-seen* tuple so one user never
//! fragments across buckets.

use serde::{Deserialize, Serialize};

/// Sentinel value for missing dimension attributes.
pub const UNKNOWN: &str = "unknown";

/// The common dimension tuple shared by all rollup domains.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DimensionTuple {
    pub platform: String,
    pub country: String,
    pub app_version: String,
}

impl DimensionTuple {
    /// Build a tuple from optional raw attributes, normalizing missing or
    /// empty values to [`UNKNOWN`].
    pub fn normalized(
        platform: Option<&str>,
        country: Option<&str>,
        app_version: Option<&str>,
    ) -> Self {
        Self {
            platform: normalize(platform),
            country: normalize(country),
            app_version: normalize(app_version),
        }
    }

    /// An all-unknown tuple.
    pub fn unknown() -> Self {
        Self::normalized(None, None, None)
    }
}

fn normalize(value: Option<&str>) -> String {
    match value {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => UNKNOWN.to_string(),
    }
}

/// Level-funnel entity key: which level of which funnel version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LevelKey {
    pub level: i32,
    pub funnel_tag: String,
    pub funnel_version: i32,
}

impl LevelKey {
    pub fn new(level: i32, funnel_tag: Option<&str>, funnel_version: Option<i32>) -> Self {
        Self {
            level,
            funnel_tag: normalize(funnel_tag),
            funnel_version: funnel_version.unwrap_or(0),
        }
    }
}
