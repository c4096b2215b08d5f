//! Cloneable front door to a running coordinator, for transports and the
//! status API.

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use crate::coordinator::{ConfigDelivery, MeshEvent, MeshSnapshot};
use crate::error::MeshError;
use crate::sensor::ConfigSetting;

#[derive(Clone)]
pub struct MeshHandle {
    events: mpsc::UnboundedSender<MeshEvent>,
}

impl MeshHandle {
    pub fn new(events: mpsc::UnboundedSender<MeshEvent>) -> Self {
        Self { events }
    }

    /// Queue an inbound frame for the coordinator.
    pub fn deliver_frame(&self, frame: impl Into<Bytes>) -> Result<(), MeshError> {
        self.events
            .send(MeshEvent::Frame(frame.into()))
            .map_err(|_| MeshError::CoordinatorStopped)
    }

    pub async fn snapshot(&self) -> Result<MeshSnapshot, MeshError> {
        let (reply, rx) = oneshot::channel();
        self.events
            .send(MeshEvent::Snapshot(reply))
            .map_err(|_| MeshError::CoordinatorStopped)?;
        rx.await.map_err(|_| MeshError::CoordinatorStopped)
    }

    pub async fn update_node_config(
        &self,
        address: &str,
        setting: ConfigSetting,
        value: i32,
    ) -> Result<ConfigDelivery, MeshError> {
        let (reply, rx) = oneshot::channel();
        self.events
            .send(MeshEvent::UpdateConfig {
                address: address.to_string(),
                setting,
                value,
                reply,
            })
            .map_err(|_| MeshError::CoordinatorStopped)?;
        rx.await.map_err(|_| MeshError::CoordinatorStopped)?
    }
}
