//! Control channel loop.
//!
//! ```text
//! Idle -> AwaitingCommand -> Executing -> Responding -> AwaitingCommand ...
//!                 \-> Idle (backoff) -> AwaitingCommand
//! any -> Closed
//! ```
//!
//! One command is in flight at a time: the next poll is issued only after
//! the previous result has been posted (or the post has failed).

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use pushwire_core::control::{Command, CommandResult};
use pushwire_core::error::{PushwireError, Result};

use crate::backoff::Backoff;
use crate::config::ClientConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    Idle,
    AwaitingCommand,
    Executing,
    Responding,
    Closed,
}

/// The two calls of the control channel.
#[async_trait]
pub trait ControlTransport: Send + Sync {
    /// Long-poll for the next command. `Ok(None)` when the poll times out
    /// empty.
    async fn next_command(&self) -> Result<Option<Command>>;
    async fn respond(&self, result: &CommandResult) -> Result<()>;
}

/// Runs a command locally.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, command: &Command) -> Result<Value>;
}

/// Executor backed by a synchronous closure.
pub struct FnExecutor<F>(pub F);

#[async_trait]
impl<F> CommandExecutor for FnExecutor<F>
where
    F: Fn(&Command) -> Result<Value> + Send + Sync,
{
    async fn execute(&self, command: &Command) -> Result<Value> {
        (self.0)(command)
    }
}

pub struct ControlLoop {
    transport: Arc<dyn ControlTransport>,
    executor: Arc<dyn CommandExecutor>,
    backoff: Backoff,
    state: watch::Sender<ControlState>,
}

impl ControlLoop {
    pub fn new(
        transport: Arc<dyn ControlTransport>,
        executor: Arc<dyn CommandExecutor>,
        backoff: Backoff,
    ) -> Self {
        let (state, _) = watch::channel(ControlState::Idle);
        Self {
            transport,
            executor,
            backoff,
            state,
        }
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ControlState> {
        self.state.subscribe()
    }

    /// Run on its own task.
    pub fn spawn(self) -> ControlHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let state = self.subscribe_state();
        let task = tokio::spawn(self.run(stop_rx));
        ControlHandle {
            stop: stop_tx,
            state,
            task,
        }
    }

    fn set(&self, next: ControlState) {
        self.state.send_replace(next);
    }

    /// Drive the loop until `stop` flips or the transport fails fatally.
    ///
    /// A poll that fails for any other reason (gateway down, one command
    /// that does not decode, a rejected request) is skipped with backoff.
    ///
    /// A command already executing is finished and answered before the stop
    /// takes effect.
    pub async fn run(self, mut stop: watch::Receiver<bool>) {
        let mut failures: u32 = 0;

        loop {
            if *stop.borrow() {
                break;
            }

            self.set(ControlState::AwaitingCommand);
            let polled = tokio::select! {
                _ = stop.changed() => break,
                r = self.transport.next_command() => r,
            };

            let command = match polled {
                Ok(Some(cmd)) => {
                    failures = 0;
                    cmd
                }
                Ok(None) => {
                    failures = 0;
                    continue;
                }
                Err(e) if e.is_fatal() => {
                    tracing::error!(error = %e, "control channel failed");
                    break;
                }
                Err(e) => {
                    let delay = self.backoff.delay(failures);
                    failures = failures.saturating_add(1);
                    if e.is_retryable() {
                        tracing::warn!(error = %e, attempt = failures, delay_ms = delay.as_millis() as u64, "control poll failed, backing off");
                    } else {
                        tracing::warn!(error = %e, attempt = failures, delay_ms = delay.as_millis() as u64, "control poll rejected, skipping");
                    }
                    self.set(ControlState::Idle);
                    tokio::select! {
                        _ = stop.changed() => break,
                        _ = tokio::time::sleep(delay) => continue,
                    }
                }
            };

            self.set(ControlState::Executing);
            tracing::debug!(id = %command.id, command = %command.name, "executing control command");
            let result = match self.executor.execute(&command).await {
                Ok(value) => CommandResult::ok(command.id.clone(), value),
                Err(e) => {
                    tracing::warn!(id = %command.id, command = %command.name, error = %e, "control command failed");
                    CommandResult::failed(command.id.clone(), e.to_string())
                }
            };

            self.set(ControlState::Responding);
            if let Err(e) = self.transport.respond(&result).await {
                // the command is lost; the session is not
                tracing::warn!(id = %command.id, error = %e, "posting control result failed");
            }
        }

        self.set(ControlState::Closed);
        tracing::info!("control loop closed");
    }
}

pub struct ControlHandle {
    stop: watch::Sender<bool>,
    state: watch::Receiver<ControlState>,
    task: JoinHandle<()>,
}

impl ControlHandle {
    pub fn state(&self) -> ControlState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ControlState> {
        self.state.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn close(mut self) {
        self.stop.send_replace(true);
        if let Err(e) = (&mut self.task).await {
            tracing::warn!(error = %e, "control task ended abnormally");
        }
    }
}

/// reqwest-backed transport for `/v1/control/{next,respond}`.
pub struct HttpControlTransport {
    client: reqwest::Client,
    next_url: String,
    respond_url: String,
    connection: String,
}

impl HttpControlTransport {
    pub fn new(cfg: &ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(cfg.request_timeout())
            .build()
            .map_err(|e| PushwireError::Internal(format!("http client: {e}")))?;
        Ok(Self {
            client,
            next_url: cfg.url("/v1/control/next"),
            respond_url: cfg.url("/v1/control/respond"),
            connection: cfg.connection_id.clone(),
        })
    }
}

fn request_error(e: reqwest::Error) -> PushwireError {
    if e.is_timeout() {
        PushwireError::Timeout
    } else if e.is_decode() {
        PushwireError::MalformedFrame(e.to_string())
    } else {
        PushwireError::Transport(e.to_string())
    }
}

async fn status_error(resp: reqwest::Response, what: &str) -> PushwireError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    let msg = format!("{what}: {status} {body}");
    match status {
        reqwest::StatusCode::CONFLICT => PushwireError::Conflict(msg),
        reqwest::StatusCode::NOT_FOUND => PushwireError::NotFound(msg),
        reqwest::StatusCode::GATEWAY_TIMEOUT => PushwireError::Timeout,
        s if s.is_server_error() => PushwireError::Transport(msg),
        _ => PushwireError::BadRequest(msg),
    }
}

#[async_trait]
impl ControlTransport for HttpControlTransport {
    async fn next_command(&self) -> Result<Option<Command>> {
        let resp = self
            .client
            .get(&self.next_url)
            .query(&[("connection", self.connection.as_str())])
            .send()
            .await
            .map_err(request_error)?;

        match resp.status() {
            reqwest::StatusCode::NO_CONTENT => Ok(None),
            s if s.is_success() => {
                let cmd = resp.json::<Command>().await.map_err(request_error)?;
                Ok(Some(cmd))
            }
            _ => Err(status_error(resp, "control next").await),
        }
    }

    async fn respond(&self, result: &CommandResult) -> Result<()> {
        let resp = self
            .client
            .post(&self.respond_url)
            .json(result)
            .send()
            .await
            .map_err(request_error)?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(status_error(resp, "control respond").await)
        }
    }
}
