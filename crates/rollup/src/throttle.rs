//! Inter-chunk pacing.
//!
//! Purely advisory: never required for correctness, only to smooth resource
//! usage between heavy sub-windows. The allocator reclaims freed chunk
//! buffers on its own, so the gc hint only logs that a reclaim point was
//! reached.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::trace;

/// Pacing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Emit a trace marker at each reclaim point.
    #[serde(default)]
    pub gc_hint: bool,
    /// Sleep between chunks, milliseconds. Zero disables the pause.
    #[serde(default)]
    pub pause_ms: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            gc_hint: false,
            pause_ms: 0,
        }
    }
}

/// The single hook called between chunks.
#[derive(Debug, Clone, Default)]
pub struct ThrottleController {
    config: ThrottleConfig,
}

impl ThrottleController {
    pub fn new(config: ThrottleConfig) -> Self {
        Self { config }
    }

    pub async fn pause(&self) {
        if self.config.gc_hint {
            trace!("chunk boundary reached, buffers released");
        }
        if self.config.pause_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.pause_ms)).await;
        }
    }
}
