//! Static node identity: the allow-list record for one physical sensor.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Deployment status of an address.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// In the field. Gates the mesh sleep decision.
    Deployed,
    /// Known, on the bench. Served but never waited for.
    Testing,
    /// Not on the allow-list; admitted ad hoc.
    #[default]
    Unknown,
}

/// Which telemetry a node carries. Selects its poll sequence and decoder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    #[default]
    Moisture,
}

/// Identity of one physical node. Two nodes are the same node iff their
/// `NodeDef`s are equal, whatever numeric id they hold this session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeDef {
    /// Transport address, colon-separated upper-case hex (e.g. `98:F4:AB:80:97:86`).
    pub address: String,
    #[serde(default)]
    pub status: NodeStatus,
    #[serde(default)]
    pub kind: SensorKind,
}

impl NodeDef {
    pub fn new(address: impl Into<String>, status: NodeStatus) -> Self {
        Self {
            address: address.into(),
            status,
            kind: SensorKind::default(),
        }
    }

    /// An address seen on the air that the allow-list does not know.
    pub fn unrecognized(address: impl Into<String>) -> Self {
        Self::new(address, NodeStatus::Unknown)
    }

    /// Resolve an announced address against the allow-list.
    pub fn resolve(address: &str, allow_list: &[NodeDef]) -> Self {
        allow_list
            .iter()
            .find(|def| def.address.eq_ignore_ascii_case(address))
            .cloned()
            .unwrap_or_else(|| Self::unrecognized(address))
    }

    pub fn is_deployed(&self) -> bool {
        self.status == NodeStatus::Deployed
    }

    /// Name of this node's thing in the data sink: `<prefix><address>` with
    /// colons replaced by underscores.
    pub fn thing_name(&self, prefix: &str) -> String {
        format!("{}{}", prefix, self.address.replace(':', "_"))
    }
}

impl fmt::Display for NodeDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?})", self.address, self.status)
    }
}
