use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::engine::Engine;
use crate::observability::WAL_COMPACTIONS_TOTAL;
use crate::store::WalStore;

const TICK: Duration = Duration::from_secs(30);

/// Compact the log once `threshold` appends have accumulated. Returns whether it ran.
pub async fn compact_if_due(store: &WalStore, threshold: u64) -> bool {
    let pending = store.appends_since_compact().await;
    if pending == 0 || pending < threshold {
        return false;
    }
    match store.compact().await {
        Ok(()) => {
            metrics::counter!(WAL_COMPACTIONS_TOTAL, "status" => "ok").increment(1);
            info!("compacted WAL after {pending} appends: {} reservations", store.reservation_count());
            true
        }
        Err(e) => {
            metrics::counter!(WAL_COMPACTIONS_TOTAL, "status" => "error").increment(1);
            warn!("WAL compaction failed: {e}");
            false
        }
    }
}

/// Drop idle per-villa state: feed channels without subscribers and villa
/// locks nobody holds.
pub fn prune_idle(engine: &Engine) {
    engine.notify.prune();
    engine.prune_villa_locks();
    debug!(
        "idle state pruned: {} feed channels, {} villa locks remain",
        engine.notify.channel_count(),
        engine.villa_lock_count()
    );
}

/// Background task: periodic log compaction and housekeeping.
pub async fn run_compactor(store: Arc<WalStore>, engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(TICK);
    loop {
        interval.tick().await;
        compact_if_due(&store, threshold).await;
        prune_idle(&engine);
    }
}
