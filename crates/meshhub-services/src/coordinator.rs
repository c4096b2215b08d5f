//! Mesh coordinator: owns every piece of mesh state and runs as a single
//! task.
//!
//! Inbound frames, timer firings and control requests all arrive as
//! `MeshEvent`s on one queue and are handled one at a time, so a wake
//! transition, a response clearing a request and a resend tick can never
//! interleave mid-update.
//!
//! State machine:
//!
//!   Sleeping ──NodeConnected──▶ Awake   (arms the force-sleep ceiling)
//!   Awake ──all deployed awake + nothing outstanding──▶ Sleeping
//!   Awake ──force-sleep fires──▶ Sleeping

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use meshhub_core::config::TimingConfig;
use meshhub_core::node::{NodeDef, NodeStatus};
use meshhub_core::wire::{
    Packet, PacketType, HUB_NODE_ID, PACKET_TTL, PROVISIONING_NODE_ID,
};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;

use crate::delivery::DeliveryLog;
use crate::error::MeshError;
use crate::link::{LinkTable, MeshLink};
use crate::node::NodeRegistry;
use crate::sensor::{decode_response, ConfigSetting, Decoded, Reading};
use crate::timer::EventTimer;
use crate::tracker::{NodeRequest, RequestTracker};

/// Payload carried by requests that take no argument.
const EMPTY_REQUEST: [u8; 1] = [0];

/// Everything the coordinator reacts to.
#[derive(Debug)]
pub enum MeshEvent {
    /// A raw frame from any link.
    Frame(Bytes),
    ForceSleep {
        generation: u64,
    },
    ResendDue {
        generation: u64,
    },
    Snapshot(oneshot::Sender<MeshSnapshot>),
    UpdateConfig {
        address: String,
        setting: ConfigSetting,
        value: i32,
        reply: oneshot::Sender<Result<ConfigDelivery, MeshError>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MeshState {
    Sleeping,
    Awake,
}

/// What happened to a config update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigDelivery {
    /// The node is awake; the request went out now.
    Sent,
    /// Held until the node's next wake.
    Queued,
}

// ── Snapshot ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct MeshSnapshot {
    pub state: MeshState,
    pub awake_secs: Option<u64>,
    pub next_idempotency_key: u8,
    pub links: usize,
    pub nodes: Vec<NodeSummary>,
    pub outstanding: Vec<RequestSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeSummary {
    pub node_id: u8,
    pub address: String,
    pub status: NodeStatus,
    pub awake: bool,
    pub queued_config: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestSummary {
    pub node_id: u8,
    pub request: &'static str,
    pub awaiting: &'static str,
}

// ── Coordinator ──────────────────────────────────────────────────────────────

pub struct MeshCoordinator {
    state: MeshState,
    awake_since: Option<Instant>,
    next_key: u8,
    registry: NodeRegistry,
    tracker: RequestTracker,
    deliveries: DeliveryLog,
    force_sleep: EventTimer<MeshEvent>,
    links: LinkTable,
    readings: mpsc::Sender<Reading>,
    send_delay: Duration,
    max_awake: Duration,
}

impl MeshCoordinator {
    /// `events` is the sending half of the queue `run` will consume; timers
    /// post their firings into it.
    pub fn new(
        timing: &TimingConfig,
        allow_list: Vec<NodeDef>,
        links: LinkTable,
        readings: mpsc::Sender<Reading>,
        events: mpsc::UnboundedSender<MeshEvent>,
    ) -> Self {
        let resender = EventTimer::new("resender", events.clone());
        Self {
            state: MeshState::Sleeping,
            awake_since: None,
            next_key: 0,
            registry: NodeRegistry::new(allow_list),
            tracker: RequestTracker::new(resender, timing.resend_period()),
            deliveries: DeliveryLog::default(),
            force_sleep: EventTimer::new("force-sleep", events),
            links,
            readings,
            send_delay: timing.send_delay(),
            max_awake: timing.max_awake(),
        }
    }

    pub fn state(&self) -> MeshState {
        self.state
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn tracker(&self) -> &RequestTracker {
        &self.tracker
    }

    /// Consume events until shutdown.
    pub async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<MeshEvent>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        tracing::info!(allow_listed = self.registry.allow_list().len(), "mesh coordinator started");
        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else {
                        tracing::debug!("event queue closed, coordinator exiting");
                        return;
                    };
                    self.handle_event(event).await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("mesh coordinator shutting down");
                    self.force_sleep.cancel();
                    return;
                }
            }
        }
    }

    pub async fn handle_event(&mut self, event: MeshEvent) {
        match event {
            MeshEvent::Frame(frame) => self.receive_frame(&frame).await,
            MeshEvent::ForceSleep { generation } => self.force_sleep_due(generation).await,
            MeshEvent::ResendDue { generation } => self.resend_due(generation).await,
            MeshEvent::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            MeshEvent::UpdateConfig {
                address,
                setting,
                value,
                reply,
            } => {
                let result = self.update_node_config(&address, setting, value).await;
                let _ = reply.send(result);
            }
        }
    }

    // ── Inbound ──────────────────────────────────────────────────────────────

    /// Decode and dispatch one frame. A frame that fails to decode is logged
    /// and dropped without touching mesh state.
    pub async fn receive_frame(&mut self, frame: &[u8]) {
        match Packet::decode(frame) {
            Ok(packet) => self.receive_packet(packet).await,
            Err(e) => tracing::warn!(
                error = %e,
                frame = %hex::encode(frame),
                "dropping undecodable frame"
            ),
        }
    }

    pub async fn receive_packet(&mut self, packet: Packet) {
        tracing::debug!(
            %packet,
            payload = %hex::encode(packet.data()),
            "packet received"
        );

        if packet.packet_type() == PacketType::NodeConnected {
            if let Err(e) = self.handle_announcement(&packet).await {
                tracing::warn!(error = %e, %packet, "connection announcement rejected");
            }
        } else if packet.source() != HUB_NODE_ID {
            self.handle_response(&packet);
        } else {
            tracing::debug!(%packet, "ignoring frame sourced from hub id");
        }

        self.maybe_sleep().await;
    }

    async fn handle_announcement(&mut self, packet: &Packet) -> Result<(), MeshError> {
        if self.state == MeshState::Sleeping {
            self.wake_mesh();
        }

        let node_id = self.registry.resolve_or_create(packet)?;

        let mut ack = packet.data().to_vec();
        ack.push(node_id);
        self.send(PROVISIONING_NODE_ID, PacketType::NodeConnectedResp, ack, true)
            .await?;

        self.wake_node(node_id).await
    }

    fn handle_response(&mut self, packet: &Packet) {
        let node_id = packet.source();
        let Some(node) = self.registry.get(node_id) else {
            tracing::warn!(node_id, %packet, "packet from unknown node dropped");
            return;
        };

        let key = packet.delivery_key();
        if self.deliveries.contains(&key) {
            tracing::debug!(%packet, "redelivery dropped");
            return;
        }
        if !self.tracker.is_pending(node_id, packet.packet_type()) {
            tracing::debug!(%packet, "unsolicited response dropped");
            return;
        }
        self.tracker.clear(node_id, packet.packet_type());
        self.deliveries.record(key);

        let def = node.def().clone();
        match decode_response(&def, packet) {
            Ok(Decoded::Reading(reading)) => self.forward_reading(reading),
            Ok(Decoded::ConfigAck(setting)) => {
                tracing::info!(address = %def.address, ?setting, "config update acknowledged")
            }
            Ok(Decoded::Unexpected) => {
                tracing::warn!(address = %def.address, %packet, "unexpected response type")
            }
            Err(e) => tracing::warn!(address = %def.address, error = %e, "response payload malformed"),
        }
    }

    fn forward_reading(&self, reading: Reading) {
        tracing::info!(
            address = %reading.node.address,
            metric = reading.metric,
            value = reading.value,
            "telemetry received"
        );
        if let Err(e) = self.readings.try_send(reading) {
            tracing::warn!(error = %e, "report queue unavailable, reading dropped");
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    fn wake_mesh(&mut self) {
        tracing::info!(ceiling = ?self.max_awake, "mesh waking");
        self.state = MeshState::Awake;
        self.awake_since = Some(Instant::now());
        self.force_sleep
            .arm_once(self.max_awake, |generation| MeshEvent::ForceSleep { generation });
    }

    /// Mark a node awake and run its poll sequence, then push any config
    /// queued for it. No-op if the node is already awake.
    async fn wake_node(&mut self, node_id: u8) -> Result<(), MeshError> {
        let Some(node) = self.registry.get_mut(node_id) else {
            return Ok(());
        };
        if !node.mark_awake() {
            return Ok(());
        }
        let polls = node.poll_sequence();
        let updates = node.take_config_updates();

        for telemetry in polls {
            tokio::time::sleep(self.send_delay).await;
            self.send(node_id, telemetry.request, EMPTY_REQUEST.to_vec(), true)
                .await?;
        }
        for (setting, value) in updates {
            tokio::time::sleep(self.send_delay).await;
            self.send(node_id, setting.request_type(), value.to_le_bytes().to_vec(), true)
                .await?;
        }
        Ok(())
    }

    fn ready_to_sleep(&self) -> bool {
        self.state == MeshState::Awake
            && self.registry.all_deployed_awake()
            && self.tracker.is_empty()
    }

    async fn maybe_sleep(&mut self) {
        if self.ready_to_sleep() {
            self.go_to_sleep("mesh sync complete").await;
        }
    }

    async fn go_to_sleep(&mut self, reason: &'static str) {
        self.force_sleep.cancel();
        self.tracker.clear_all();
        self.deliveries.clear();
        let awake_secs = self.awake_since.take().map(|t| t.elapsed().as_secs());
        self.state = MeshState::Sleeping;
        tracing::info!(reason, ?awake_secs, "mesh going to sleep");
        self.sleep_all().await;
    }

    /// Newest nodes are told first; each command is best-effort.
    async fn sleep_all(&mut self) {
        for node_id in self.registry.ids_descending() {
            tokio::time::sleep(self.send_delay).await;
            if let Err(e) = self
                .send(node_id, PacketType::GoToSleep, EMPTY_REQUEST.to_vec(), false)
                .await
            {
                tracing::warn!(node_id, error = %e, "sleep command not sent");
            }
            if let Some(node) = self.registry.get_mut(node_id) {
                node.mark_asleep();
            }
        }
    }

    async fn force_sleep_due(&mut self, generation: u64) {
        if !self.force_sleep.is_current(generation) {
            tracing::debug!(generation, "stale force-sleep ignored");
            return;
        }
        if self.state != MeshState::Awake {
            return;
        }
        tracing::warn!(
            outstanding = self.tracker.len(),
            "awake ceiling reached, forcing mesh to sleep"
        );
        self.go_to_sleep("awake ceiling reached").await;
    }

    async fn resend_due(&mut self, generation: u64) {
        let Some(due) = self.tracker.resend_due(generation) else {
            return;
        };
        tracing::info!(count = due.len(), "resending outstanding requests");
        for request in due {
            tokio::time::sleep(self.send_delay).await;
            if let Err(e) = self
                .send(request.node_id, request.packet_type, request.data, false)
                .await
            {
                tracing::warn!(node_id = request.node_id, error = %e, "resend failed");
            }
        }
    }

    // ── Control ──────────────────────────────────────────────────────────────

    /// Push a setting to a node: immediately if it is awake, otherwise on
    /// its next wake.
    pub async fn update_node_config(
        &mut self,
        address: &str,
        setting: ConfigSetting,
        value: i32,
    ) -> Result<ConfigDelivery, MeshError> {
        let node_id = self
            .registry
            .find_by_address(address)
            .ok_or_else(|| MeshError::UnknownNode(address.to_string()))?;
        let Some(node) = self.registry.get_mut(node_id) else {
            return Err(MeshError::UnknownNode(address.to_string()));
        };

        if node.is_awake() {
            self.send(node_id, setting.request_type(), value.to_le_bytes().to_vec(), true)
                .await?;
            Ok(ConfigDelivery::Sent)
        } else {
            node.queue_config(setting, value);
            tracing::info!(%address, ?setting, value, "config update queued for next wake");
            Ok(ConfigDelivery::Queued)
        }
    }

    pub fn snapshot(&self) -> MeshSnapshot {
        MeshSnapshot {
            state: self.state,
            awake_secs: self.awake_since.map(|t| t.elapsed().as_secs()),
            next_idempotency_key: self.next_key,
            links: self.links.len(),
            nodes: self
                .registry
                .iter()
                .map(|node| NodeSummary {
                    node_id: node.node_id(),
                    address: node.def().address.clone(),
                    status: node.def().status,
                    awake: node.is_awake(),
                    queued_config: node.queued_config(),
                })
                .collect(),
            outstanding: self
                .tracker
                .outstanding()
                .into_iter()
                .map(|request| RequestSummary {
                    node_id: request.node_id,
                    request: request.packet_type.name(),
                    awaiting: request.response.name(),
                })
                .collect(),
        }
    }

    // ── Outbound ─────────────────────────────────────────────────────────────

    fn next_idempotency_key(&mut self) -> u8 {
        let key = self.next_key;
        self.next_key = self.next_key.wrapping_add(1);
        key
    }

    /// Build a packet under a fresh idempotency key and broadcast it. A new
    /// request is registered with the tracker first; resends and
    /// fire-and-forget commands pass `is_new_request = false`.
    pub async fn send(
        &mut self,
        dest: u8,
        packet_type: PacketType,
        data: impl Into<Bytes>,
        is_new_request: bool,
    ) -> Result<Packet, MeshError> {
        let key = self.next_idempotency_key();
        let packet = Packet::new(HUB_NODE_ID, dest, PACKET_TTL, key, packet_type, data)?;
        self.send_packet(&packet, is_new_request).await;
        Ok(packet)
    }

    async fn send_packet(&mut self, packet: &Packet, is_new_request: bool) {
        if is_new_request {
            if let Some(request) = NodeRequest::from_packet(packet) {
                self.tracker.register(request);
            }
        }

        let links: Vec<Arc<dyn MeshLink>> =
            self.links.iter().map(|entry| entry.value().clone()).collect();
        if links.is_empty() {
            tracing::warn!(%packet, "no link connected, frame not sent");
            return;
        }

        let frame = packet.encode();
        tracing::debug!(%packet, payload = %hex::encode(packet.data()), "sending");
        for link in links {
            if let Err(e) = link.write(&frame).await {
                tracing::warn!(link = link.address(), error = %e, "link write failed");
            }
        }
    }
}
