//! Node registry: every node the hub has admitted this process lifetime,
//! keyed by the numeric id it was assigned.

use std::collections::BTreeMap;

use meshhub_core::node::NodeDef;
use meshhub_core::wire::{format_address_le, Packet, FIRST_NODE_ID};
use tokio::time::Instant;

use crate::error::MeshError;
use crate::sensor::{telemetry_for, ConfigSetting, Telemetry};

/// One physical node. Lives for the process lifetime and is reused across
/// sleep cycles.
#[derive(Debug)]
pub struct SensorNode {
    def: NodeDef,
    node_id: u8,
    awake: bool,
    sleep_started: Option<Instant>,
    /// Settings to push on the next wake.
    config_queue: Vec<(ConfigSetting, i32)>,
}

impl SensorNode {
    pub fn new(def: NodeDef, node_id: u8) -> Self {
        Self {
            def,
            node_id,
            awake: false,
            sleep_started: None,
            config_queue: Vec::new(),
        }
    }

    pub fn def(&self) -> &NodeDef {
        &self.def
    }

    pub fn node_id(&self) -> u8 {
        self.node_id
    }

    pub fn is_awake(&self) -> bool {
        self.awake
    }

    /// Flip to awake. Returns false if the node was already awake.
    pub fn mark_awake(&mut self) -> bool {
        if self.awake {
            return false;
        }
        self.awake = true;
        if let Some(started) = self.sleep_started.take() {
            tracing::info!(
                address = %self.def.address,
                node_id = self.node_id,
                slept_secs = started.elapsed().as_secs(),
                "node woke"
            );
        }
        true
    }

    pub fn mark_asleep(&mut self) {
        self.awake = false;
        self.sleep_started = Some(Instant::now());
    }

    /// Requests issued on every wake, in send order.
    pub fn poll_sequence(&self) -> &'static [Telemetry] {
        telemetry_for(self.def.kind)
    }

    /// Queue a setting for the next wake. A newer value for the same setting
    /// replaces the queued one.
    pub fn queue_config(&mut self, setting: ConfigSetting, value: i32) {
        self.config_queue.retain(|(queued, _)| *queued != setting);
        self.config_queue.push((setting, value));
    }

    pub fn take_config_updates(&mut self) -> Vec<(ConfigSetting, i32)> {
        std::mem::take(&mut self.config_queue)
    }

    pub fn queued_config(&self) -> usize {
        self.config_queue.len()
    }
}

pub struct NodeRegistry {
    nodes: BTreeMap<u8, SensorNode>,
    allow_list: Vec<NodeDef>,
}

impl NodeRegistry {
    pub fn new(allow_list: Vec<NodeDef>) -> Self {
        Self {
            nodes: BTreeMap::new(),
            allow_list,
        }
    }

    pub fn allow_list(&self) -> &[NodeDef] {
        &self.allow_list
    }

    /// Next id to hand out: ids 0 and 1 are reserved.
    pub fn next_available_id(&self) -> Option<u8> {
        u8::try_from(self.nodes.len())
            .ok()
            .and_then(|n| n.checked_add(FIRST_NODE_ID))
    }

    /// Resolve the node a `NodeConnected` announcement came from, admitting
    /// it under the next free id if it is new. Returns the node's id.
    ///
    /// A node that announces again keeps its id and awake state.
    pub fn resolve_or_create(&mut self, announcement: &Packet) -> Result<u8, MeshError> {
        let address = format_address_le(announcement.data());
        if address.is_empty() {
            return Err(MeshError::EmptyAnnouncement);
        }
        let def = NodeDef::resolve(&address, &self.allow_list);

        if let Some(existing) = self.nodes.values().find(|node| node.def == def) {
            tracing::debug!(
                address = %def.address,
                node_id = existing.node_id,
                "known node announced again"
            );
            return Ok(existing.node_id);
        }

        let node_id = self.next_available_id().ok_or(MeshError::NodeIdsExhausted)?;
        tracing::info!(address = %def.address, status = ?def.status, node_id, "admitting node");
        self.nodes.insert(node_id, SensorNode::new(def, node_id));
        Ok(node_id)
    }

    pub fn get(&self, node_id: u8) -> Option<&SensorNode> {
        self.nodes.get(&node_id)
    }

    pub fn get_mut(&mut self, node_id: u8) -> Option<&mut SensorNode> {
        self.nodes.get_mut(&node_id)
    }

    pub fn find_by_address(&self, address: &str) -> Option<u8> {
        self.nodes
            .values()
            .find(|node| node.def.address.eq_ignore_ascii_case(address))
            .map(|node| node.node_id)
    }

    /// Newest first: the order nodes are put to sleep in.
    pub fn ids_descending(&self) -> Vec<u8> {
        self.nodes.keys().rev().copied().collect()
    }

    /// Every allow-listed deployed address has an admitted node that is awake.
    pub fn all_deployed_awake(&self) -> bool {
        self.allow_list
            .iter()
            .filter(|def| def.is_deployed())
            .all(|def| self.nodes.values().any(|node| node.def == *def && node.awake))
    }

    pub fn iter(&self) -> impl Iterator<Item = &SensorNode> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
