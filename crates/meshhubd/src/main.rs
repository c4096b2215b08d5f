//! meshhubd: sensor mesh hub daemon.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use meshhub_core::config::HubConfig;
use meshhub_services::{new_link_table, report_loop, MeshCoordinator, MeshHandle, Reading};

mod beacon;
mod link;
mod sink;

/// Readings waiting for the sink. Beyond this the coordinator drops them
/// rather than stall.
const REPORT_QUEUE: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    match HubConfig::write_default_if_missing() {
        Ok(path) => tracing::info!(path = %path.display(), "config file"),
        Err(e) => tracing::warn!(error = %e, "failed to write default config"),
    }
    let config = HubConfig::load().context("failed to load config")?;
    config.validate().context("refusing to start")?;

    let bind: SocketAddr = config
        .link
        .bind
        .parse()
        .with_context(|| format!("invalid link.bind {:?}", config.link.bind))?;
    let gateway: SocketAddr = config
        .link
        .gateway
        .parse()
        .with_context(|| format!("invalid link.gateway {:?}", config.link.gateway))?;

    tracing::info!(
        endpoint = %config.sink.endpoint_url,
        nodes = config.nodes.len(),
        deployed = config.nodes.iter().filter(|n| n.is_deployed()).count(),
        "meshhubd starting"
    );
    for node in &config.nodes {
        tracing::info!(address = %node.address, status = ?node.status, "allow-listed node");
    }

    // Shared state
    let links = new_link_table();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (readings_tx, readings_rx) = mpsc::channel::<Reading>(REPORT_QUEUE);
    let mesh = MeshHandle::new(events_tx.clone());

    let shadow = Arc::new(sink::ShadowClient::new(&config.sink)?);
    let socket = Arc::new(link::bind_gateway_socket(bind)?);

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── Spawn tasks ──────────────────────────────────────────────────────────

    let coordinator_task = tokio::spawn(
        MeshCoordinator::new(
            &config.timing,
            config.nodes.clone(),
            links.clone(),
            readings_tx,
            events_tx,
        )
        .run(events_rx, shutdown_tx.subscribe()),
    );

    let report_task = tokio::spawn(report_loop(
        shadow,
        config.sink.thing_prefix.clone(),
        readings_rx,
        shutdown_tx.subscribe(),
    ));

    let gateway_task = {
        let links = links.clone();
        let mesh = mesh.clone();
        let shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = link::gateway_loop(socket, gateway, links, mesh, shutdown).await {
                tracing::error!(error = %e, "gateway link failed");
            }
        })
    };

    let beacon_task = tokio::spawn(beacon::run(config.beacon.clone(), shutdown_tx.subscribe()));

    // Status HTTP endpoint
    let api_port = config.api.port;
    if api_port != 0 {
        let state = meshhub_api::ApiState { mesh };
        tokio::spawn(async move {
            if let Err(e) = meshhub_api::serve(state, api_port).await {
                tracing::error!(error = %e, "status server failed");
            }
        });
    }

    // ── Wait for exit ────────────────────────────────────────────────────────

    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::select! {
        _ = shutdown_rx.recv()  => tracing::info!("shutting down"),
        r = coordinator_task    => tracing::error!("coordinator exited: {:?}", r),
        r = report_task         => tracing::error!("report worker exited: {:?}", r),
        r = gateway_task        => tracing::error!("gateway link exited: {:?}", r),
        r = beacon_task         => tracing::error!("sync beacon exited: {:?}", r),
    }

    Ok(())
}
