//! HTTP mapping for the shared error type.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use pushwire_core::error::{ClientCode, PushwireError};

/// Handler error: a `PushwireError` rendered as `{"error", "message"}`.
#[derive(Debug)]
pub struct ApiError(pub PushwireError);

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(PushwireError::BadRequest(msg.into()))
    }
}

impl From<PushwireError> for ApiError {
    fn from(e: PushwireError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.0.client_code();
        let status = match code {
            ClientCode::BadRequest
            | ClientCode::MalformedFrame
            | ClientCode::UnsupportedVersion => StatusCode::BAD_REQUEST,
            ClientCode::NotFound => StatusCode::NOT_FOUND,
            ClientCode::Conflict => StatusCode::CONFLICT,
            ClientCode::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ClientCode::Transport => StatusCode::BAD_GATEWAY,
            ClientCode::HandlerFailed | ClientCode::CommandFailed | ClientCode::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            tracing::warn!(code = code.as_str(), error = %self.0, "request failed");
        }
        let body = Json(json!({
            "error": code.as_str(),
            "message": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}
