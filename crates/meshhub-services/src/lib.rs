//! meshhub-services: the coordination core of the hub.
//!
//! The coordinator owns all mesh state and runs as a single task. Links,
//! timers and the control handle talk to it through `MeshEvent`s.

pub mod coordinator;
pub mod delivery;
pub mod error;
pub mod handle;
pub mod link;
pub mod node;
pub mod sensor;
pub mod sink;
pub mod timer;
pub mod tracker;

pub use coordinator::{ConfigDelivery, MeshCoordinator, MeshEvent, MeshSnapshot, MeshState};
pub use error::MeshError;
pub use handle::MeshHandle;
pub use link::{new_link_table, register_link, LinkTable, MeshLink};
pub use node::{NodeRegistry, SensorNode};
pub use sensor::{ConfigSetting, Reading};
pub use sink::{report_loop, DataSink};
pub use tracker::{NodeRequest, RequestTracker};
