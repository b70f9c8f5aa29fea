//! The destination seam the sync worker writes through.

use async_trait::async_trait;

use engine_core::{Result, SourceBatch};

use crate::client::ClickHouseClient;
use crate::health::check_connection;
use crate::insert;

/// Write side of the analytical store. The sync worker probes liveness once
/// per cycle and delivers each batch through `insert_batch`; delivery is
/// at-least-once, so the destination must tolerate duplicate rows.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Cheap liveness probe; a `false` skips the whole sync cycle.
    async fn is_live(&self) -> bool;

    /// Insert one batch, returning the number of rows written.
    async fn insert_batch(&self, batch: SourceBatch) -> Result<usize>;
}

/// Production destination backed by ClickHouse.
#[derive(Clone)]
pub struct ClickHouseWarehouse {
    client: ClickHouseClient,
}

impl ClickHouseWarehouse {
    pub fn new(client: ClickHouseClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ClickHouseClient {
        &self.client
    }
}

#[async_trait]
impl Warehouse for ClickHouseWarehouse {
    async fn is_live(&self) -> bool {
        check_connection(&self.client).await
    }

    async fn insert_batch(&self, batch: SourceBatch) -> Result<usize> {
        match batch {
            SourceBatch::Events(facts) => insert::insert_events(&self.client, facts).await,
            SourceBatch::Sessions(facts) => insert::insert_sessions(&self.client, facts).await,
            SourceBatch::Revenue(facts) => insert::insert_revenue(&self.client, facts).await,
            SourceBatch::Installs(facts) => insert::insert_installs(&self.client, facts).await,
        }
    }
}
