//! Background eviction of idle sessions.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use nudge_core::PushDispatcher;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::metrics::SESSIONS_EVICTED_TOTAL;

/// Every `period`, evict sessions idle longer than `max_idle` that have no
/// live stream. Stops when `cancel` fires.
pub fn spawn_sweeper(
    dispatcher: Arc<PushDispatcher>,
    max_idle: Duration,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        let _ = ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let evicted = dispatcher.evict_idle(max_idle);
                    if !evicted.is_empty() {
                        counter!(SESSIONS_EVICTED_TOTAL).increment(evicted.len() as u64);
                        info!(count = evicted.len(), "evicted idle sessions");
                    }
                }
                () = cancel.cancelled() => break,
            }
        }
        debug!("idle sweeper stopped");
    })
}
