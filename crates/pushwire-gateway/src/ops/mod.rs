//! Operational HTTP endpoints.
//!
//! - `/healthz`     : liveness
//! - `/readyz`      : readiness (503 when draining)
//! - `/v1/stats`    : bus counters
//! - `/v1/publish`  : publish an envelope from outside the process

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use pushwire_core::Envelope;

use crate::app_state::AppState;
use crate::bus::BusStats;
use crate::error::ApiError;

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    if state.is_draining() {
        (StatusCode::SERVICE_UNAVAILABLE, "draining")
    } else {
        (StatusCode::OK, "ready")
    }
}

pub async fn stats(State(state): State<AppState>) -> Json<BusStats> {
    Json(state.bus().stats())
}

pub async fn publish(
    State(state): State<AppState>,
    Json(env): Json<Envelope>,
) -> Result<Json<Value>, ApiError> {
    if state.is_draining() {
        return Err(ApiError::bad_request("gateway is draining"));
    }
    let delivered = state.bus().publish(&env)?;
    Ok(Json(json!({ "delivered": delivered })))
}
