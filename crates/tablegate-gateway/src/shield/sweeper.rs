//! Background sweeping of the client store.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::limiter::RateLimiter;

/// Spawn a task that sweeps the limiter's store every `interval`.
///
/// The first sweep runs one full interval after spawning. Abort the returned
/// handle to stop sweeping.
pub fn spawn_sweeper(limiter: Arc<RateLimiter>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match limiter.sweep() {
                Ok(report) => tracing::debug!(
                    pruned = report.pruned_records,
                    expired_blocks = report.expired_blocks,
                    removed = report.removed_clients,
                    "Shield sweep complete"
                ),
                Err(e) => tracing::error!("Shield sweep failed: {}", e),
            }
        }
    })
}
