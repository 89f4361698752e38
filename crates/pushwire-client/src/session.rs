//! Event stream session: a decode task feeding a dispatch task.
//!
//! The decode task owns the connection and the [`StreamDecoder`]; it never
//! touches [`LocalState`] except through the resync hook. Decoded envelopes
//! cross to the dispatch task over a bounded channel, which preserves order.
//! On a transport failure, a malformed frame, or a stream that stays silent
//! longer than `idle_timeout_ms` the decode task drops the connection, backs
//! off, reconnects, and asks the [`Recovery`] hook to resynchronize.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use pushwire_core::error::{PushwireError, Result};
use pushwire_core::Envelope;

use crate::backoff::Backoff;
use crate::config::ClientConfig;
use crate::decoder::StreamDecoder;
use crate::dispatcher::Dispatcher;
use crate::state::LocalState;

pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Opens the raw event stream.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<ByteStream>;
}

/// `GET {base_url}/v1/event` over reqwest.
pub struct HttpConnector {
    client: reqwest::Client,
    url: String,
}

impl HttpConnector {
    pub fn new(cfg: &ClientConfig) -> Result<Self> {
        // No overall request timeout: the body is meant to stay open.
        let client = reqwest::Client::builder()
            .connect_timeout(cfg.request_timeout())
            .build()
            .map_err(|e| PushwireError::Internal(format!("http client: {e}")))?;
        Ok(Self {
            client,
            url: cfg.url("/v1/event"),
        })
    }
}

#[async_trait]
impl Connector for HttpConnector {
    async fn connect(&self) -> Result<ByteStream> {
        let resp = self
            .client
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| PushwireError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(PushwireError::Transport(format!(
                "event stream rejected: {status}"
            )));
        }
        Ok(Box::pin(resp.bytes_stream().map(|r| r.map_err(io::Error::other))))
    }
}

/// Rebuilds local state after a gap in the stream. Missed events are not
/// replayed, so implementations fetch current state through ordinary
/// idempotent reads.
#[async_trait]
pub trait Recovery: Send + Sync {
    async fn resync(&self, state: &LocalState) -> Result<()>;
}

/// Keeps whatever state survived the gap.
pub struct NoRecovery;

#[async_trait]
impl Recovery for NoRecovery {
    async fn resync(&self, _state: &LocalState) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    Connecting,
    Connected,
    /// Waiting out the backoff before reconnect attempt `attempt`.
    Reconnecting { attempt: u32 },
    Closed,
}

/// Handle to the running decode and dispatch tasks.
///
/// Dropping it stops both tasks; [`close`](Self::close) does the same and
/// waits for the connection to be released.
pub struct EventStreamSession {
    stop: watch::Sender<bool>,
    status: watch::Receiver<StreamStatus>,
    decode: JoinHandle<()>,
    dispatch: JoinHandle<()>,
}

impl EventStreamSession {
    /// Start the session. Must be called inside a tokio runtime.
    pub fn spawn(
        cfg: &ClientConfig,
        connector: Arc<dyn Connector>,
        dispatcher: Arc<Dispatcher>,
        state: LocalState,
        recovery: Arc<dyn Recovery>,
    ) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (status_tx, status_rx) = watch::channel(StreamStatus::Connecting);
        let (env_tx, env_rx) = mpsc::channel(cfg.dispatch_queue.max(1));

        let decode = tokio::spawn(
            DecodeLoop {
                connector,
                recovery,
                state: state.clone(),
                tx: env_tx,
                stop: stop_rx,
                status: status_tx,
                backoff: Backoff::from_config(cfg),
                idle_timeout: cfg.idle_timeout(),
            }
            .run(),
        );
        let dispatch = tokio::spawn(run_dispatch(env_rx, dispatcher, state));

        Self {
            stop: stop_tx,
            status: status_rx,
            decode,
            dispatch,
        }
    }

    pub fn status(&self) -> StreamStatus {
        *self.status.borrow()
    }

    /// Watch status transitions (e.g. to wait for `Connected`).
    pub fn subscribe_status(&self) -> watch::Receiver<StreamStatus> {
        self.status.clone()
    }

    /// Stop decoding, release the connection, discard undispatched envelopes.
    pub async fn close(&mut self) {
        self.stop.send_replace(true);
        if let Err(e) = (&mut self.decode).await {
            if !e.is_cancelled() {
                tracing::warn!(error = %e, "decode task ended abnormally");
            }
        }
        self.dispatch.abort();
        let _ = (&mut self.dispatch).await;
    }
}

impl Drop for EventStreamSession {
    fn drop(&mut self) {
        self.stop.send_replace(true);
        self.decode.abort();
        self.dispatch.abort();
    }
}

async fn run_dispatch(
    mut rx: mpsc::Receiver<Envelope>,
    dispatcher: Arc<Dispatcher>,
    state: LocalState,
) {
    while let Some(env) = rx.recv().await {
        dispatcher.dispatch(&state, &env).await;
    }
    tracing::debug!("dispatch task finished");
}

enum PumpEnd {
    Stopped,
    DispatchGone,
    Ended,
    Failed(PushwireError),
}

struct DecodeLoop {
    connector: Arc<dyn Connector>,
    recovery: Arc<dyn Recovery>,
    state: LocalState,
    tx: mpsc::Sender<Envelope>,
    stop: watch::Receiver<bool>,
    status: watch::Sender<StreamStatus>,
    backoff: Backoff,
    /// Longest gap between chunks; the gateway heartbeats well inside it.
    idle_timeout: Duration,
}

impl DecodeLoop {
    async fn run(mut self) {
        let mut attempt: u32 = 0;
        let mut after_gap = false;

        loop {
            if *self.stop.borrow() {
                break;
            }

            let connected = tokio::select! {
                _ = self.stop.changed() => break,
                r = self.connector.connect() => r,
            };

            match connected {
                Ok(stream) => {
                    if after_gap {
                        if let Err(e) = self.recovery.resync(&self.state).await {
                            tracing::warn!(error = %e, "resync after reconnect failed");
                        }
                    }
                    self.status.send_replace(StreamStatus::Connected);
                    tracing::info!("event stream connected");

                    let mut decoder = StreamDecoder::new(stream).with_idle_timeout(self.idle_timeout);
                    match self.pump(&mut decoder, &mut attempt).await {
                        PumpEnd::Stopped | PumpEnd::DispatchGone => break,
                        PumpEnd::Ended => tracing::info!("event stream ended by server"),
                        PumpEnd::Failed(e) => tracing::warn!(error = %e, "event stream failed"),
                    }
                }
                Err(e) => tracing::warn!(error = %e, attempt, "event stream connect failed"),
            }

            after_gap = true;
            let delay = self.backoff.delay(attempt);
            self.status
                .send_replace(StreamStatus::Reconnecting { attempt });
            tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "reconnecting event stream");
            attempt = attempt.saturating_add(1);

            tokio::select! {
                _ = self.stop.changed() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.status.send_replace(StreamStatus::Closed);
        tracing::info!("event stream session closed");
    }

    /// Forward envelopes until the stream ends, fails, or we are told to stop.
    async fn pump<S>(&mut self, decoder: &mut StreamDecoder<S>, attempt: &mut u32) -> PumpEnd
    where
        S: Stream<Item = io::Result<Bytes>> + Unpin,
    {
        loop {
            let advanced = tokio::select! {
                _ = self.stop.changed() => return PumpEnd::Stopped,
                r = decoder.advance() => r,
            };

            match advanced {
                Ok(true) => {
                    // a frame got through, so the connection is healthy
                    *attempt = 0;
                    let Some(env) = decoder.take_current() else {
                        continue;
                    };
                    tokio::select! {
                        _ = self.stop.changed() => return PumpEnd::Stopped,
                        sent = self.tx.send(env) => {
                            if sent.is_err() {
                                return PumpEnd::DispatchGone;
                            }
                        }
                    }
                }
                Ok(false) => return PumpEnd::Ended,
                Err(e) => return PumpEnd::Failed(e),
            }
        }
    }
}
