use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::{now_ms, Engine};

/// Background task that cancels tentative appointments past their expiry.
pub async fn run_reaper(engine: Arc<Engine>) {
    let mut interval = tokio::time::interval(Duration::from_secs(5));
    loop {
        interval.tick().await;
        let expired = engine.collect_expired_tentative(now_ms());
        for id in expired {
            match engine.cancel_appointment(id).await {
                Ok(()) => info!("reaped expired tentative appointment {id}"),
                Err(e) => {
                    // May already have been confirmed or cancelled
                    tracing::debug!("reaper skip {id}: {e}");
                }
            }
        }
    }
}

/// Background task that compacts a tenant's WAL once enough appends
/// accumulate since the last compaction.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        let appends = engine.wal_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        match engine.compact_wal().await {
            Ok(()) => info!("compacted WAL after {appends} appends"),
            Err(e) => tracing::warn!("WAL compaction failed: {e}"),
        }
    }
}
