//! Data sink seam and the report worker that drains decoded readings into it.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};

use crate::sensor::Reading;

/// Where telemetry goes. `thing` is derived from the node's address.
#[async_trait]
pub trait DataSink: Send + Sync {
    async fn report(&self, thing: &str, metric: &str, value: i32) -> anyhow::Result<()>;
}

/// Forward readings to the sink until the channel closes or shutdown fires.
/// Sink failures are logged and the reading dropped.
pub async fn report_loop(
    sink: Arc<dyn DataSink>,
    thing_prefix: String,
    mut readings: mpsc::Receiver<Reading>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            reading = readings.recv() => {
                let Some(reading) = reading else {
                    tracing::debug!("reading channel closed, report worker exiting");
                    return;
                };
                let thing = reading.node.thing_name(&thing_prefix);
                match sink.report(&thing, reading.metric, reading.value).await {
                    Ok(()) => tracing::info!(
                        %thing,
                        metric = reading.metric,
                        value = reading.value,
                        "reading reported"
                    ),
                    Err(e) => tracing::warn!(
                        %thing,
                        metric = reading.metric,
                        error = %e,
                        "sink report failed, reading dropped"
                    ),
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("report worker shutting down");
                return;
            }
        }
    }
}
