//! /status handler.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use meshhub_services::MeshSnapshot;

use super::{mesh_error, ApiState};

// ── /status ──────────────────────────────────────────────────────────────────

pub async fn handle_status(
    State(state): State<ApiState>,
) -> Result<Json<MeshSnapshot>, (StatusCode, String)> {
    let snapshot = state.mesh.snapshot().await.map_err(mesh_error)?;
    Ok(Json(snapshot))
}
