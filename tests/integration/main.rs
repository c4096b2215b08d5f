//! meshhub integration test harness.
//!
//! Each test starts a real coordinator task with an in-memory link and an
//! in-memory data sink, then plays the part of the mesh: it injects frames
//! through the `MeshHandle` and inspects what the hub transmits and reports.
//!
//! Tests run on a paused clock, so the 10 s resend period and the 45 s
//! awake ceiling elapse instantly.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};

use meshhub_core::config::TimingConfig;
use meshhub_core::node::{NodeDef, NodeStatus};
use meshhub_core::wire::{Packet, PacketType, HUB_NODE_ID, PACKET_TTL, PROVISIONING_NODE_ID};
use meshhub_services::{
    new_link_table, register_link, report_loop, DataSink, MeshCoordinator, MeshHandle, MeshLink,
    MeshSnapshot,
};

mod keys;
mod lifecycle;
mod responses;

// ── Harness ───────────────────────────────────────────────────────────────────

/// Announcement payload of the deployed test node, least significant byte
/// first. Renders as `98:F4:AB:97:86`.
pub const DEPLOYED_A: [u8; 5] = [0x86, 0x97, 0xAB, 0xF4, 0x98];
/// A second deployed node, `98:F4:AB:80:97:86`.
pub const DEPLOYED_B: [u8; 6] = [0x86, 0x97, 0x80, 0xAB, 0xF4, 0x98];
/// A node that is not on the allow-list.
pub const STRANGER: [u8; 6] = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06];

pub const THING_A: &str = "Sensor_98_F4_AB_97_86";

pub fn single_node_allow_list() -> Vec<NodeDef> {
    vec![NodeDef::new("98:F4:AB:97:86", NodeStatus::Deployed)]
}

pub fn two_node_allow_list() -> Vec<NodeDef> {
    vec![
        NodeDef::new("98:F4:AB:97:86", NodeStatus::Deployed),
        NodeDef::new("98:F4:AB:80:97:86", NodeStatus::Deployed),
    ]
}

/// Link that hands every transmitted frame back to the test.
struct LoopbackLink {
    frames: mpsc::UnboundedSender<Packet>,
}

#[async_trait]
impl MeshLink for LoopbackLink {
    fn address(&self) -> &str {
        "loopback"
    }

    async fn write(&self, frame: &[u8]) -> Result<()> {
        let packet = Packet::decode(frame).context("hub transmitted an undecodable frame")?;
        let _ = self.frames.send(packet);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemorySink {
    reports: Mutex<Vec<(String, String, i32)>>,
}

impl MemorySink {
    pub fn reports(&self) -> Vec<(String, String, i32)> {
        self.reports.lock().unwrap().clone()
    }
}

#[async_trait]
impl DataSink for MemorySink {
    async fn report(&self, thing: &str, metric: &str, value: i32) -> Result<()> {
        self.reports
            .lock()
            .unwrap()
            .push((thing.to_string(), metric.to_string(), value));
        Ok(())
    }
}

pub struct Hub {
    pub mesh: MeshHandle,
    pub sink: Arc<MemorySink>,
    frames: mpsc::UnboundedReceiver<Packet>,
    shutdown: broadcast::Sender<()>,
}

impl Hub {
    pub fn start(allow_list: Vec<NodeDef>) -> Self {
        let links = new_link_table();
        let (frames_tx, frames) = mpsc::unbounded_channel();
        register_link(&links, Arc::new(LoopbackLink { frames: frames_tx }));

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (readings_tx, readings_rx) = mpsc::channel(64);
        let (shutdown, _) = broadcast::channel(1);
        let sink = Arc::new(MemorySink::default());

        let coordinator = MeshCoordinator::new(
            &TimingConfig::default(),
            allow_list,
            links,
            readings_tx,
            events_tx.clone(),
        );
        tokio::spawn(coordinator.run(events_rx, shutdown.subscribe()));
        tokio::spawn(report_loop(
            sink.clone(),
            "Sensor_".to_string(),
            readings_rx,
            shutdown.subscribe(),
        ));

        Self {
            mesh: MeshHandle::new(events_tx),
            sink,
            frames,
            shutdown,
        }
    }

    pub fn inject(&self, frame: Vec<u8>) {
        self.mesh.deliver_frame(frame).unwrap();
    }

    /// Announce a node, as the provisioning relay does when it hears one.
    pub fn announce(&self, address_le: &[u8]) {
        let packet = Packet::new(
            PROVISIONING_NODE_ID,
            HUB_NODE_ID,
            PACKET_TTL,
            0,
            PacketType::NodeConnected,
            address_le.to_vec(),
        )
        .unwrap();
        self.inject(packet.encode());
    }

    /// Answer `request` as the node it was addressed to.
    pub fn answer(&self, request: &Packet, key: u8, value: i32) {
        self.inject(answer_frame(request, key, value));
    }

    /// Wait until every event queued so far has been handled.
    pub async fn settle(&self) -> MeshSnapshot {
        self.mesh.snapshot().await.unwrap()
    }

    /// Frames transmitted since the last call, after settling.
    pub async fn sent(&mut self) -> Vec<Packet> {
        self.settle().await;
        let mut out = Vec::new();
        while let Ok(packet) = self.frames.try_recv() {
            out.push(packet);
        }
        out
    }

    /// Wait for the report worker to catch up with `n` reports.
    pub async fn reports_after(&self, n: usize) -> Vec<(String, String, i32)> {
        for _ in 0..100 {
            let reports = self.sink.reports();
            if reports.len() >= n {
                return reports;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        self.sink.reports()
    }

    /// Announce `address_le` and return the four poll requests the hub sent
    /// for it, with the acknowledgement first.
    pub async fn wake(&mut self, address_le: &[u8]) -> (Packet, Vec<Packet>) {
        self.announce(address_le);
        let mut sent = self.sent().await;
        assert!(!sent.is_empty(), "no acknowledgement sent");
        let ack = sent.remove(0);
        assert_eq!(ack.packet_type(), PacketType::NodeConnectedResp);
        (ack, sent)
    }
}

impl Drop for Hub {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
    }
}

pub fn answer_frame(request: &Packet, key: u8, value: i32) -> Vec<u8> {
    Packet::new(
        request.dest(),
        HUB_NODE_ID,
        PACKET_TTL,
        key,
        request.packet_type().response().unwrap(),
        value.to_le_bytes().to_vec(),
    )
    .unwrap()
    .encode()
}
