//! Sync beacon: publishes the countdown to the next scheduled mesh sync so
//! nodes provisioned with the same period can be woken in step.
//!
//! Once a second the seconds remaining are written to a file. When the
//! countdown reaches zero the schedule rolls forward by one period.

use std::path::Path;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior};

use meshhub_core::config::BeaconConfig;

/// Advance `next_sync` by whole periods until it lies after `now`.
fn roll_forward(mut next_sync: Instant, now: Instant, period: Duration) -> Instant {
    while next_sync <= now {
        next_sync += period;
    }
    next_sync
}

async fn publish(path: &Path, remaining: u64) {
    if let Err(e) = tokio::fs::write(path, remaining.to_string()).await {
        tracing::warn!(path = %path.display(), error = %e, "beacon write failed");
    }
}

pub async fn run(config: BeaconConfig, mut shutdown: broadcast::Receiver<()>) {
    if !config.enabled {
        tracing::info!("sync beacon disabled");
        let _ = shutdown.recv().await;
        return;
    }

    let period = Duration::from_secs(config.period_secs.max(1));
    if let Some(parent) = config.path.parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            tracing::warn!(path = %parent.display(), error = %e, "beacon directory unavailable");
        }
    }
    tracing::info!(path = %config.path.display(), ?period, "sync beacon started");

    let mut next_sync = Instant::now() + period;
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = Instant::now();
                if next_sync <= now {
                    next_sync = roll_forward(next_sync, now, period);
                    tracing::debug!("sync beacon rolled to next period");
                }
                publish(&config.path, (next_sync - now).as_secs()).await;
            }
            _ = shutdown.recv() => {
                tracing::info!("sync beacon shutting down");
                return;
            }
        }
    }
}
