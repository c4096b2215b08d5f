//! HTTP API handlers: exposes mesh state as JSON.

pub mod nodes;
pub mod status;

use axum::http::StatusCode;

use meshhub_services::{MeshError, MeshHandle};

#[derive(Clone)]
pub struct ApiState {
    pub mesh: MeshHandle,
}

// ── Shared helpers ────────────────────────────────────────────────────────────

fn mesh_error(e: MeshError) -> (StatusCode, String) {
    let status = match &e {
        MeshError::UnknownNode(_) => StatusCode::NOT_FOUND,
        MeshError::CoordinatorStopped => StatusCode::SERVICE_UNAVAILABLE,
        MeshError::Wire(_) => StatusCode::BAD_REQUEST,
        MeshError::EmptyAnnouncement | MeshError::NodeIdsExhausted => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, e.to_string())
}

pub use nodes::handle_node_config;
pub use status::handle_status;
