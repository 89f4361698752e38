//! Control channel HTTP handlers.
//!
//! - `GET  /v1/control/next?connection=<id>` : long-poll; 200 command, 204 nothing, 409 busy
//! - `POST /v1/control/respond`              : `{"commandId", "result"}`
//! - `POST /v1/control/submit`               : enqueue and wait for the result

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use pushwire_core::control::CommandResult;

use crate::app_state::AppState;
use crate::error::ApiError;

pub const DEFAULT_CONNECTION: &str = "default";

fn default_connection() -> String {
    DEFAULT_CONNECTION.to_string()
}

#[derive(Debug, Deserialize)]
pub struct NextQuery {
    #[serde(default = "default_connection")]
    pub connection: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    #[serde(default = "default_connection")]
    pub connection: String,
    pub command: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

pub async fn next(
    State(app): State<AppState>,
    Query(q): Query<NextQuery>,
) -> Result<Response, ApiError> {
    let mut shutdown = app.shutdown_signal();
    if *shutdown.borrow() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let control = app.control();
    tokio::select! {
        r = control.next(&q.connection) => match r? {
            Some(cmd) => Ok(Json(cmd).into_response()),
            None => Ok(StatusCode::NO_CONTENT.into_response()),
        },
        _ = shutdown.changed() => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

pub async fn respond(
    State(app): State<AppState>,
    Json(result): Json<CommandResult>,
) -> Result<Json<Value>, ApiError> {
    app.control().respond(result).await?;
    Ok(Json(json!({ "ok": true })))
}

pub async fn submit(
    State(app): State<AppState>,
    Json(req): Json<SubmitRequest>,
) -> Result<Json<CommandResult>, ApiError> {
    if req.command.is_empty() {
        return Err(ApiError::bad_request("command must not be empty"));
    }
    let result = app
        .control()
        .submit(&req.connection, &req.command, req.args)
        .await?;
    Ok(Json(result))
}
