//! Axum router wiring.

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::{app_state::AppState, control, ops, transport};

pub fn build_router(state: AppState) -> Router {
    let max_publish = state.cfg().gateway.max_publish_bytes;

    Router::new()
        .route("/v1/event", get(transport::event_stream::event_stream))
        .route(
            "/v1/publish",
            post(ops::publish).layer(DefaultBodyLimit::max(max_publish)),
        )
        .route("/v1/control/next", get(control::routes::next))
        .route("/v1/control/respond", post(control::routes::respond))
        .route("/v1/control/submit", post(control::routes::submit))
        .route("/v1/stats", get(ops::stats))
        .route("/healthz", get(ops::healthz))
        .route("/readyz", get(ops::readyz))
        .with_state(state)
}
