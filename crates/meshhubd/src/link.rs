//! Radio gateway link.
//!
//! The gateway bridges the mesh radio to UDP: every datagram it sends us is
//! one frame heard on air, and every frame we send it is transmitted. The
//! first datagram from the configured gateway address is the discovery event
//! that puts the link into the link table. Empty datagrams are keep-alives.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::broadcast;

use meshhub_core::wire::MAX_DATA_LEN;
use meshhub_services::{register_link, LinkTable, MeshHandle, MeshLink};

/// Largest frame the gateway can hand us: header plus a full payload.
const MAX_FRAME: usize = meshhub_core::wire::HEADER_LEN + MAX_DATA_LEN;

/// Pause after a failed receive before trying the socket again.
const RECV_BACKOFF: Duration = Duration::from_millis(500);

pub struct GatewayLink {
    socket: Arc<UdpSocket>,
    gateway: SocketAddr,
    address: String,
}

impl GatewayLink {
    pub fn new(socket: Arc<UdpSocket>, gateway: SocketAddr) -> Self {
        Self {
            socket,
            gateway,
            address: gateway.to_string(),
        }
    }
}

#[async_trait]
impl MeshLink for GatewayLink {
    fn address(&self) -> &str {
        &self.address
    }

    async fn write(&self, frame: &[u8]) -> Result<()> {
        self.socket
            .send_to(frame, self.gateway)
            .await
            .with_context(|| format!("send to gateway {} failed", self.gateway))?;
        Ok(())
    }
}

/// Bind the local socket the gateway talks to.
pub fn bind_gateway_socket(bind: SocketAddr) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(bind), Type::DGRAM, Some(Protocol::UDP))
        .context("failed to create gateway socket")?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket
        .bind(&bind.into())
        .with_context(|| format!("failed to bind gateway socket to {bind}"))?;
    UdpSocket::from_std(socket.into()).context("failed to convert to tokio UdpSocket")
}

/// Receive datagrams from the gateway and hand them to the coordinator.
pub async fn gateway_loop(
    socket: Arc<UdpSocket>,
    gateway: SocketAddr,
    links: LinkTable,
    mesh: MeshHandle,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let mut buf = vec![0u8; MAX_FRAME + 1];
    tracing::info!(local = %socket.local_addr()?, %gateway, "waiting for radio gateway");

    loop {
        let (len, peer) = tokio::select! {
            r = socket.recv_from(&mut buf) => match r {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(error = %e, "recv_from failed");
                    if !back_off(&mut shutdown).await {
                        tracing::info!("gateway link shutting down");
                        return Ok(());
                    }
                    continue;
                }
            },
            _ = shutdown.recv() => {
                tracing::info!("gateway link shutting down");
                return Ok(());
            }
        };

        if peer != gateway {
            tracing::trace!(%peer, "ignoring datagram from unexpected address");
            continue;
        }

        if !links.contains_key(&gateway.to_string()) {
            register_link(&links, Arc::new(GatewayLink::new(socket.clone(), gateway)));
        }

        if len == 0 {
            continue;
        }
        if len > MAX_FRAME {
            tracing::warn!(len, "oversized datagram dropped");
            continue;
        }

        tracing::trace!(len, frame = %hex::encode(&buf[..len]), "frame from gateway");
        mesh.deliver_frame(buf[..len].to_vec())?;
    }
}

/// Wait out `RECV_BACKOFF`. False if shutdown arrived meanwhile.
async fn back_off(shutdown: &mut broadcast::Receiver<()>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(RECV_BACKOFF) => true,
        _ = shutdown.recv() => false,
    }
}
