//! Event stream endpoint (`GET /v1/event`).
//!
//! Responsibilities:
//! - Subscribe to the bus before the response starts, so nothing published
//!   after the request arrives is missed
//! - First frame is always `server.connected`
//! - Heartbeat after `heartbeat_interval_ms` of silence
//! - End the stream on bus eviction or server shutdown
//!
//! The subscription lives inside the response body stream. Hyper drops the
//! body when the peer goes away or a write fails, which drops the
//! subscription and unregisters it from the bus. The subscription is linked
//! to the connection's [`ConnectionAbort`], so eviction closes the socket
//! even while hyper is blocked writing to a peer that stopped reading.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    Extension,
    http::header::{HeaderName, CACHE_CONTROL, CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures_util::{stream, Stream};
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use pushwire_core::error::Result;
use pushwire_core::frame::encode_frame;
use pushwire_core::Envelope;

use crate::app_state::AppState;
use crate::bus::{Subscription, SubscriptionId};
use crate::error::ApiError;
use crate::server::ConnectionAbort;

const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

// --------------------
// Entry
// --------------------
pub async fn event_stream(
    State(app): State<AppState>,
    abort: Option<Extension<ConnectionAbort>>,
) -> std::result::Result<Response, ApiError> {
    let abort = abort.map(|Extension(a)| a);
    let conn = EventConnection::open(
        app.bus().subscribe_linked(abort),
        app.cfg().gateway.heartbeat_interval(),
        app.shutdown_signal(),
    )?;
    tracing::info!(sub = %conn.id(), "event stream opened");

    let headers = [
        (CONTENT_TYPE, "text/event-stream"),
        (CACHE_CONTROL, "no-cache"),
        (X_ACCEL_BUFFERING, "no"),
    ];
    Ok((headers, Body::from_stream(conn.into_stream())).into_response())
}

// --------------------
// Per-connection state
// --------------------
struct EventConnection {
    sub: Subscription,
    heartbeat: Interval,
    shutdown: watch::Receiver<bool>,
    connected_frame: Option<Bytes>,
    heartbeat_frame: Bytes,
    frames: u64,
}

impl EventConnection {
    fn open(
        sub: Subscription,
        heartbeat_every: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self> {
        let mut heartbeat = interval_at(Instant::now() + heartbeat_every, heartbeat_every);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Ok(Self {
            sub,
            heartbeat,
            shutdown,
            connected_frame: Some(encode_frame(&Envelope::connected())?),
            heartbeat_frame: encode_frame(&Envelope::heartbeat())?,
            frames: 0,
        })
    }

    fn id(&self) -> SubscriptionId {
        self.sub.id()
    }

    /// Next frame to write; `None` ends the response.
    async fn next_frame(&mut self) -> Option<Bytes> {
        if let Some(hello) = self.connected_frame.take() {
            return Some(hello);
        }
        if *self.shutdown.borrow() {
            return None;
        }

        tokio::select! {
            frame = self.sub.recv() => {
                // None: evicted or bus closed
                self.heartbeat.reset();
                frame
            }
            _ = self.heartbeat.tick() => Some(self.heartbeat_frame.clone()),
            _ = self.shutdown.changed() => None,
        }
    }

    fn into_stream(self) -> impl Stream<Item = std::result::Result<Bytes, Infallible>> + Send {
        stream::unfold(self, |mut conn| async move {
            let frame = conn.next_frame().await?;
            conn.frames += 1;
            Some((Ok(frame), conn))
        })
    }
}

impl Drop for EventConnection {
    fn drop(&mut self) {
        tracing::info!(sub = %self.sub.id(), frames = self.frames, "event stream closed");
    }
}
