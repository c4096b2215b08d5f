//! meshhub-core: wire format, node identity, and configuration.
//! All other meshhub crates depend on this one.

pub mod config;
pub mod node;
pub mod wire;

pub use node::{NodeDef, NodeStatus, SensorKind};
pub use wire::{Packet, PacketType, WireError};
