//! Request tracker: outstanding request/response pairs per node, and the
//! resend timer that retransmits them until answered.
//!
//! Entries are keyed by (node id, expected response type), so a node has at
//! most one outstanding request of each kind. Delivery is at-least-once:
//! there is no retry limit. The force-sleep ceiling bounds how long a lost
//! node can keep the resender busy.

use std::collections::BTreeMap;
use std::time::Duration;

use bytes::Bytes;
use meshhub_core::wire::{Packet, PacketType};

use crate::coordinator::MeshEvent;
use crate::timer::EventTimer;

/// One outstanding request, with enough to rebuild an identical resend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRequest {
    pub node_id: u8,
    /// The request type that was sent.
    pub packet_type: PacketType,
    /// The response type that clears this entry.
    pub response: PacketType,
    pub data: Bytes,
}

impl NodeRequest {
    /// `None` unless `packet` is a request type.
    pub fn from_packet(packet: &Packet) -> Option<Self> {
        let response = packet.packet_type().response()?;
        Some(Self {
            node_id: packet.dest(),
            packet_type: packet.packet_type(),
            response,
            data: packet.data().clone(),
        })
    }
}

pub struct RequestTracker {
    /// node id -> expected response type -> request
    pending: BTreeMap<u8, BTreeMap<PacketType, NodeRequest>>,
    resender: EventTimer<MeshEvent>,
    resend_period: Duration,
}

impl RequestTracker {
    pub fn new(resender: EventTimer<MeshEvent>, resend_period: Duration) -> Self {
        Self {
            pending: BTreeMap::new(),
            resender,
            resend_period,
        }
    }

    /// Insert or overwrite the entry for (node, response type) and make sure
    /// the resender is running.
    ///
    /// Registering into an empty set always starts a fresh arm: a tick queued
    /// by the previous arm may have seen the set empty and must not act on
    /// this request.
    pub fn register(&mut self, request: NodeRequest) {
        tracing::info!(
            node_id = request.node_id,
            request = %request.packet_type,
            "request registered"
        );
        let was_idle = self.pending.is_empty();
        self.pending
            .entry(request.node_id)
            .or_default()
            .insert(request.response, request);

        if was_idle || !self.resender.is_armed() {
            tracing::info!("starting resender");
            self.resender
                .arm_periodic(self.resend_period, |generation| MeshEvent::ResendDue {
                    generation,
                });
        }
    }

    /// Remove the entry a genuine response answers. No-op if absent.
    pub fn clear(&mut self, node_id: u8, response: PacketType) -> Option<NodeRequest> {
        let requests = self.pending.get_mut(&node_id)?;
        let removed = requests.remove(&response);
        if requests.is_empty() {
            self.pending.remove(&node_id);
        }
        removed
    }

    /// Admission filter for responses.
    pub fn is_pending(&self, node_id: u8, response: PacketType) -> bool {
        self.pending
            .get(&node_id)
            .is_some_and(|requests| requests.contains_key(&response))
    }

    /// Every outstanding request, ordered by node id then response type.
    pub fn outstanding(&self) -> Vec<NodeRequest> {
        self.pending
            .values()
            .flat_map(|requests| requests.values().cloned())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.values().map(|requests| requests.len()).sum()
    }

    /// Drop everything and stop the resender. Ticks already queued go stale.
    pub fn clear_all(&mut self) {
        self.pending.clear();
        if self.resender.is_armed() {
            tracing::info!("resender stopped");
        }
        self.resender.cancel();
    }

    pub fn is_resending(&self) -> bool {
        self.resender.is_armed()
    }

    /// Handle a resender tick. Returns the requests to retransmit, or `None`
    /// if the tick is stale or nothing is outstanding. An empty set stops the
    /// resender; the next `register` starts a fresh one.
    pub fn resend_due(&mut self, generation: u64) -> Option<Vec<NodeRequest>> {
        if !self.resender.is_current(generation) {
            tracing::debug!(generation, "stale resend tick ignored");
            return None;
        }
        if self.is_empty() {
            self.resender.cancel();
            tracing::info!("resender finished");
            return None;
        }
        Some(self.outstanding())
    }
}
