//! Periodic liveness sweep task.

use crate::broker::Broker;
use crate::core::time::Clock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// Spawn the sweep loop. Every tick the broker evicts sessions that missed
/// the previous probe, then probes the survivors; the loop exits on the
/// shutdown signal.
pub fn spawn_monitor<C: Clock>(
    broker: Arc<Broker<C>>,
    clock: C,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = clock.sleep(interval) => {
                    let report = broker.sweep();
                    debug!(
                        evicted = report.evicted.len(),
                        probed = report.probed,
                        "liveness sweep"
                    );
                }
            }
        }
    })
}
