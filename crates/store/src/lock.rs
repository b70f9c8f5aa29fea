//! Distributed job locks on Postgres session advisory locks.
//!
//! The lock key is the pair `(fnv1a(namespace), fnv1a("job:" + name))`
//! passed to `pg_try_advisory_lock(int, int)`. The lock is scoped to the
//! session that acquired it, so the guard pins its pooled connection and
//! unlocks on that same connection. A guard dropped without `release`
//! detaches the connection from the pool so the session closes and
//! Postgres frees the lock, instead of the pool recycling a still-locked
//! session.

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres};
use tracing::{debug, warn};

use engine_core::{LockGuard, LockManager, Result};

use crate::db_err;

/// Fixed namespace; all job locks of this engine live under it.
const LOCK_NAMESPACE: &str = "gamepulse.jobs";

/// FNV-1a 32-bit. Part of the lock-key contract: every instance must derive
/// the same pair of integers for the same job name.
pub(crate) fn fnv1a_32(input: &str) -> i32 {
    const OFFSET: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;

    let mut hash = OFFSET;
    for byte in input.as_bytes() {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash as i32
}

fn lock_key(job: &str) -> (i32, i32) {
    (fnv1a_32(LOCK_NAMESPACE), fnv1a_32(&format!("job:{job}")))
}

/// Advisory-lock manager sharing the store's pool.
#[derive(Clone)]
pub struct PgLockManager {
    pool: PgPool,
}

impl PgLockManager {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

struct PgLockGuard {
    // None once the lock has been unlocked and the connection returned.
    conn: Option<PoolConnection<Postgres>>,
    namespace: i32,
    key: i32,
}

#[async_trait]
impl LockGuard for PgLockGuard {
    async fn release(mut self: Box<Self>) -> Result<()> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };

        let unlocked = sqlx::query_scalar::<_, bool>("SELECT pg_advisory_unlock($1, $2)")
            .bind(self.namespace)
            .bind(self.key)
            .fetch_one(&mut *conn)
            .await;

        match unlocked {
            Ok(released) => {
                debug!(released = released, "advisory lock release");
                Ok(())
            }
            Err(e) => {
                // The session may still hold the lock. Close it rather than
                // hand a locked connection back to the pool.
                drop(conn.detach());
                Err(db_err(e))
            }
        }
    }
}

impl Drop for PgLockGuard {
    fn drop(&mut self) {
        // Dropped without release, e.g. a panicking or cancelled job. The
        // session still holds the lock, so keep it out of the pool and let
        // the close free the lock server-side.
        if let Some(conn) = self.conn.take() {
            warn!(
                namespace = self.namespace,
                key = self.key,
                "lock guard dropped without release, closing its session"
            );
            drop(conn.detach());
        }
    }
}

#[async_trait]
impl LockManager for PgLockManager {
    async fn try_acquire(&self, job: &str) -> Result<Option<Box<dyn LockGuard>>> {
        let (namespace, key) = lock_key(job);

        // Dedicated connection: the lock lives and dies with this session.
        let mut conn = self.pool.acquire().await.map_err(db_err)?;

        let acquired: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock($1, $2)")
            .bind(namespace)
            .bind(key)
            .fetch_one(&mut *conn)
            .await
            .map_err(db_err)?;

        if !acquired {
            return Ok(None);
        }

        debug!(job = job, namespace, key, "advisory lock acquired");
        Ok(Some(Box::new(PgLockGuard {
            conn: Some(conn),
            namespace,
            key,
        })))
    }
}
