//! /nodes/{address}/config handler.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use meshhub_core::wire::parse_address;
use meshhub_services::{ConfigDelivery, ConfigSetting};

use super::{mesh_error, ApiState};

// ── /nodes/{address}/config (POST) ───────────────────────────────────────────

#[derive(Deserialize)]
pub struct NodeConfigRequest {
    pub setting: ConfigSetting,
    pub value: i32,
}

#[derive(Serialize)]
pub struct NodeConfigResponse {
    pub address: String,
    pub setting: ConfigSetting,
    pub value: i32,
    pub delivery: ConfigDelivery,
}

pub async fn handle_node_config(
    State(state): State<ApiState>,
    Path(address): Path<String>,
    Json(req): Json<NodeConfigRequest>,
) -> Result<Json<NodeConfigResponse>, (StatusCode, String)> {
    parse_address(&address).map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    let delivery = state
        .mesh
        .update_node_config(&address, req.setting, req.value)
        .await
        .map_err(mesh_error)?;
    tracing::info!(%address, setting = ?req.setting, value = req.value, ?delivery, "config update via API");

    Ok(Json(NodeConfigResponse {
        address,
        setting: req.setting,
        value: req.value,
        delivery,
    }))
}
