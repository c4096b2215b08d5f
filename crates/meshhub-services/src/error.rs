//! Errors surfaced by the coordination core.

use meshhub_core::wire::WireError;

#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    #[error(transparent)]
    Wire(#[from] WireError),

    #[error("no node with address {0}")]
    UnknownNode(String),

    #[error("connection announcement carried no address")]
    EmptyAnnouncement,

    #[error("node id space exhausted")]
    NodeIdsExhausted,

    #[error("mesh coordinator is not running")]
    CoordinatorStopped,
}
