//! ClickHouse health checks and schema bootstrap.

use tracing::{debug, error};

use engine_core::{Error, Result};
use telemetry::health::health;

use crate::client::ClickHouseClient;
use crate::schema::all_tables;

/// Check ClickHouse connection health and update the global registry.
pub async fn check_connection(client: &ClickHouseClient) -> bool {
    match client.inner().query("SELECT 1").fetch_one::<u8>().await {
        Ok(_) => {
            debug!("ClickHouse connection healthy");
            health().clickhouse.set_healthy();
            true
        }
        Err(e) => {
            error!("ClickHouse health check failed: {}", e);
            health().clickhouse.set_unhealthy(e.to_string());
            false
        }
    }
}

/// Initialize database schema.
pub async fn init_schema(client: &ClickHouseClient) -> Result<()> {
    for ddl in all_tables() {
        client
            .inner()
            .query(ddl)
            .execute()
            .await
            .map_err(|e| Error::destination(format!("failed to execute DDL: {}", e)))?;
    }

    debug!("ClickHouse schema initialized");
    Ok(())
}
