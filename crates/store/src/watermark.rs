//! Durable replication cursors, one row per pipeline.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use engine_core::{Result, Watermark, WatermarkStore};

use crate::db_err;
use crate::pool::PgStore;

#[async_trait]
impl WatermarkStore for PgStore {
    async fn load(&self, pipeline: &str) -> Result<Option<Watermark>> {
        let row: Option<(DateTime<Utc>, Uuid)> = sqlx::query_as(
            "SELECT last_timestamp, last_id FROM sync_watermarks WHERE pipeline = $1",
        )
        .bind(pipeline)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        Ok(row.map(|(last_timestamp, last_id)| Watermark {
            pipeline: pipeline.to_string(),
            last_timestamp,
            last_id,
        }))
    }

    async fn save(&self, watermark: &Watermark) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_watermarks (pipeline, last_timestamp, last_id, updated_at)
            VALUES ($1, $2, $3, now())
            ON CONFLICT (pipeline)
            DO UPDATE SET
                last_timestamp = EXCLUDED.last_timestamp,
                last_id = EXCLUDED.last_id,
                updated_at = now()
            "#,
        )
        .bind(&watermark.pipeline)
        .bind(watermark.last_timestamp)
        .bind(watermark.last_id)
        .execute(self.pool())
        .await
        .map_err(db_err)?;

        Ok(())
    }
}
