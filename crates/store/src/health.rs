//! Postgres liveness probe.

use tracing::warn;

use engine_core::Result;
use telemetry::health::health;

use crate::db_err;
use crate::pool::PgStore;

impl PgStore {
    /// Round-trip a trivial query and update the global health registry.
    pub async fn check_health(&self) -> Result<()> {
        match sqlx::query("SELECT 1").execute(self.pool()).await {
            Ok(_) => {
                health().postgres.set_healthy();
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "postgres health check failed");
                health().postgres.set_unhealthy(e.to_string());
                Err(db_err(e))
            }
        }
    }
}
