//! Periodic sync cycles.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use edgesync_sync::SyncEngine;

/// Runs a cycle immediately and then every `every` until `shutdown`
/// resolves. A cycle that is already running is allowed to finish.
pub async fn run<F>(engine: Arc<SyncEngine>, every: Duration, shutdown: F)
where
    F: Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    info!(interval_secs = every.as_secs(), "Scheduler started");

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                let result = engine.sync().await;
                let pull_success = result.pull.as_ref().is_some_and(|p| p.success);
                let push_success = result.push.as_ref().is_some_and(|p| p.success);

                if result.success {
                    info!(pull_success, push_success, "Scheduled sync: {}", result.message);
                } else {
                    warn!(pull_success, push_success, "Scheduled sync: {}", result.message);
                }
            }
        }
    }

    info!("Scheduler stopped");
}
