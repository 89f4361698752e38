use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::{Map, Value};
use tokio::sync::{oneshot, Mutex, Notify};
use tokio::time::{timeout, timeout_at, Instant};
use uuid::Uuid;

use pushwire_core::control::{Command, CommandResult};
use pushwire_core::error::{Result, PushwireError};

/// Per-connection command lane.
#[derive(Default)]
struct Lane {
    state: Mutex<LaneState>,
    notify: Notify,
}

#[derive(Default)]
struct LaneState {
    queue: VecDeque<Command>,
    /// Handed to the consumer, result not yet posted.
    in_flight: Option<String>,
}

impl Lane {
    /// No queued or outstanding command. A locked lane counts as busy.
    fn is_idle(&self) -> bool {
        self.state
            .try_lock()
            .map(|st| st.queue.is_empty() && st.in_flight.is_none())
            .unwrap_or(false)
    }
}

/// Removes a connection's lane from the map on drop, if no other handle to
/// it is alive and it is idle. Must be declared before the `Arc<Lane>` it
/// covers so that handle is released first.
struct PruneLane<'a> {
    lanes: &'a DashMap<String, Arc<Lane>>,
    connection: &'a str,
}

impl Drop for PruneLane<'_> {
    fn drop(&mut self) {
        let removed = self
            .lanes
            .remove_if(self.connection, |_, lane| {
                Arc::strong_count(lane) == 1 && lane.is_idle()
            })
            .is_some();
        if removed {
            tracing::trace!(connection = self.connection, "control lane pruned");
        }
    }
}

struct Waiter {
    connection: String,
    tx: oneshot::Sender<CommandResult>,
}

/// Command queues plus result rendezvous, keyed by consumer connection id.
///
/// At most one command per connection is in flight: `next` refuses with
/// `Conflict` until the outstanding command's result is posted or its
/// submitter gives up.
pub struct ControlHub {
    lanes: DashMap<String, Arc<Lane>>,
    waiters: DashMap<String, Waiter>,
    poll_timeout: Duration,
    response_timeout: Duration,
}

impl ControlHub {
    pub fn new(poll_timeout: Duration, response_timeout: Duration) -> Self {
        Self {
            lanes: DashMap::new(),
            waiters: DashMap::new(),
            poll_timeout,
            response_timeout,
        }
    }

    fn prune_on_drop<'a>(&'a self, connection: &'a str) -> PruneLane<'a> {
        PruneLane {
            lanes: &self.lanes,
            connection,
        }
    }

    fn lane(&self, connection: &str) -> Arc<Lane> {
        Arc::clone(
            self.lanes
                .entry(connection.to_string())
                .or_insert_with(|| Arc::new(Lane::default()))
                .value(),
        )
    }

    /// Queue a command and wait for its result.
    pub async fn submit(
        &self,
        connection: &str,
        name: &str,
        args: Map<String, Value>,
    ) -> Result<CommandResult> {
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.waiters.insert(
            id.clone(),
            Waiter {
                connection: connection.to_string(),
                tx,
            },
        );

        let _prune = self.prune_on_drop(connection);
        let lane = self.lane(connection);
        lane.state
            .lock()
            .await
            .queue
            .push_back(Command::new(id.clone(), name, args));
        lane.notify.notify_one();
        tracing::debug!(connection, command = name, id = %id, "control command queued");

        match timeout(self.response_timeout, rx).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(_)) => Err(PushwireError::Internal("control waiter dropped".into())),
            Err(_) => {
                self.abandon(connection, &id).await;
                Err(PushwireError::Timeout)
            }
        }
    }

    /// Forget a command whose submitter stopped waiting, freeing the lane.
    async fn abandon(&self, connection: &str, id: &str) {
        self.waiters.remove(id);
        let _prune = self.prune_on_drop(connection);
        let lane = self.lane(connection);
        let mut st = lane.state.lock().await;
        st.queue.retain(|c| c.id != id);
        if st.in_flight.as_deref() == Some(id) {
            st.in_flight = None;
        }
        tracing::warn!(connection, id, "control command timed out waiting for result");
    }

    /// Long-poll for the next command, up to the configured poll timeout.
    pub async fn next(&self, connection: &str) -> Result<Option<Command>> {
        self.next_until(connection, Instant::now() + self.poll_timeout)
            .await
    }

    /// `Ok(None)` when the deadline passes with nothing queued.
    pub async fn next_until(&self, connection: &str, deadline: Instant) -> Result<Option<Command>> {
        let _prune = self.prune_on_drop(connection);
        let lane = self.lane(connection);
        loop {
            let notified = lane.notify.notified();
            {
                let mut st = lane.state.lock().await;
                if let Some(busy) = &st.in_flight {
                    return Err(PushwireError::Conflict(format!(
                        "command {busy} is still awaiting its result"
                    )));
                }
                if let Some(cmd) = st.queue.pop_front() {
                    st.in_flight = Some(cmd.id.clone());
                    tracing::debug!(connection, command = %cmd.name, id = %cmd.id, "control command handed out");
                    return Ok(Some(cmd));
                }
            }
            if timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    /// Complete a command. Unknown ids (never issued, already answered, or
    /// abandoned) are `NotFound`.
    pub async fn respond(&self, result: CommandResult) -> Result<()> {
        let (_, waiter) = self
            .waiters
            .remove(&result.command_id)
            .ok_or_else(|| PushwireError::NotFound(format!("command {}", result.command_id)))?;

        let _prune = self.prune_on_drop(&waiter.connection);
        let lane = self.lane(&waiter.connection);
        {
            let mut st = lane.state.lock().await;
            if st.in_flight.as_deref() == Some(result.command_id.as_str()) {
                st.in_flight = None;
            } else {
                st.queue.retain(|c| c.id != result.command_id);
            }
        }

        tracing::debug!(connection = %waiter.connection, id = %result.command_id, ok = result.is_ok(), "control command answered");
        // submitter may have timed out in the meantime
        let _ = waiter.tx.send(result);
        Ok(())
    }

    /// Connections currently holding a lane (queued work, a command in
    /// flight, or a poller waiting).
    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    /// Commands queued (not yet handed out) for a connection.
    pub async fn pending(&self, connection: &str) -> usize {
        let lane = self.lanes.get(connection).map(|l| Arc::clone(l.value()));
        match lane {
            Some(lane) => lane.state.lock().await.queue.len(),
            None => 0,
        }
    }
}
