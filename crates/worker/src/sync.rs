//! Watermark-driven replication from the row store to the warehouse.
//!
//! Each cycle walks the fixed list of source tables, reading up to
//! `max_batches` keyset batches per table. The watermark is re-read before
//! every batch and persisted only after the batch is delivered, so a crash
//! between deliver and persist redelivers the same batch next cycle:
//! at-least-once into append-only destination tables, which downstream
//! queries already tolerate.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use engine_core::{CycleSummary, Result, SourceTable, SyncSource, Watermark, WatermarkStore};
use telemetry::metrics::metrics;
use warehouse::Warehouse;

/// Sync pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Disabling turns every cycle into a no-op.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Rows fetched per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// Batches per table per cycle; bounds one cycle's work.
    #[serde(default = "default_max_batches")]
    pub max_batches: u32,
}

fn default_enabled() -> bool {
    true
}

fn default_batch_size() -> u32 {
    1000
}

fn default_max_batches() -> u32 {
    10
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            batch_size: default_batch_size(),
            max_batches: default_max_batches(),
        }
    }
}

/// Replicates raw fact tables to the analytical store.
pub struct SyncEngine {
    source: Arc<dyn SyncSource>,
    watermarks: Arc<dyn WatermarkStore>,
    destination: Arc<dyn Warehouse>,
    config: SyncConfig,
}

impl SyncEngine {
    pub fn new(
        source: Arc<dyn SyncSource>,
        watermarks: Arc<dyn WatermarkStore>,
        destination: Arc<dyn Warehouse>,
        config: SyncConfig,
    ) -> Self {
        Self {
            source,
            watermarks,
            destination,
            config,
        }
    }

    /// One bounded replication pass over all source tables. Skipped wholesale
    /// when the pipeline is disabled or the destination fails its liveness
    /// probe; delivery errors abort the cycle with the watermark still at the
    /// last delivered batch, and the next cycle retries from there.
    pub async fn run_cycle(&self) -> Result<CycleSummary> {
        if !self.config.enabled {
            debug!("sync pipeline disabled, skipping cycle");
            return Ok(CycleSummary {
                skipped: true,
                ..Default::default()
            });
        }

        if !self.destination.is_live().await {
            warn!("sync destination unreachable, skipping cycle");
            metrics().sync_cycles_skipped.inc();
            return Ok(CycleSummary {
                skipped: true,
                ..Default::default()
            });
        }

        let mut summary = CycleSummary::default();
        for table in SourceTable::ALL {
            let (batches, rows) = self.sync_table(*table).await.inspect_err(|_| {
                metrics().sync_errors.inc();
            })?;
            summary.batches += batches;
            summary.rows += rows;
        }

        info!(
            batches = summary.batches,
            rows = summary.rows,
            "sync cycle complete"
        );
        Ok(summary)
    }

    async fn sync_table(&self, table: SourceTable) -> Result<(u64, u64)> {
        let mut batches = 0u64;
        let mut rows = 0u64;

        for _ in 0..self.config.max_batches {
            let watermark = self.watermarks.load(table.pipeline()).await?;
            let batch = self
                .source
                .fetch_after(table, watermark.as_ref(), self.config.batch_size)
                .await?;
            if batch.is_empty() {
                break;
            }
            // Non-empty, so the cursor exists.
            let Some((last_timestamp, last_id)) = batch.last_cursor() else {
                break;
            };

            let count = batch.len();
            self.destination.insert_batch(batch).await?;
            self.watermarks
                .save(&Watermark {
                    pipeline: table.pipeline().to_string(),
                    last_timestamp,
                    last_id,
                })
                .await?;

            metrics().sync_batches.inc();
            metrics().sync_rows.inc_by(count as u64);
            batches += 1;
            rows += count as u64;

            if count < self.config.batch_size as usize {
                break;
            }
        }

        if batches > 0 {
            debug!(
                pipeline = table.pipeline(),
                batches = batches,
                rows = rows,
                "table synced"
            );
        }
        Ok((batches, rows))
    }
}
