#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{stream, StreamExt};
use serde_json::{json, Value};

use pushwire_client::session::{ByteStream, Connector, NoRecovery, Recovery, StreamStatus};
use pushwire_client::state::{LocalState, SessionStatus, StateSnapshot};
use pushwire_client::{ClientConfig, Dispatcher, EventStreamSession};
use pushwire_core::error::Result;
use pushwire_core::PushwireError;

enum Script {
    /// Deliver the frames, then end the stream.
    Close(Vec<io::Result<Bytes>>),
    /// Deliver the frames, then stay open.
    Hold(Vec<io::Result<Bytes>>),
}

struct ReleaseFlag(Arc<AtomicBool>);

impl Drop for ReleaseFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct Scripted {
    scripts: Mutex<VecDeque<Script>>,
    connects: AtomicUsize,
    released: Arc<AtomicBool>,
}

impl Scripted {
    fn new(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            ..Self::default()
        })
    }
}

#[async_trait]
impl Connector for Scripted {
    async fn connect(&self) -> Result<ByteStream> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let next = self.scripts.lock().unwrap().pop_front();
        match next {
            Some(Script::Close(items)) => Ok(Box::pin(stream::iter(items))),
            Some(Script::Hold(items)) => {
                let flag = ReleaseFlag(Arc::clone(&self.released));
                Ok(Box::pin(stream::iter(items).chain(stream::pending()).map(
                    move |item| {
                        let _held = &flag;
                        item
                    },
                )))
            }
            None => Err(PushwireError::Transport("connection refused".into())),
        }
    }
}

#[derive(Default)]
struct CountingRecovery {
    calls: AtomicUsize,
}

#[async_trait]
impl Recovery for CountingRecovery {
    async fn resync(&self, _state: &LocalState) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn frame(t: &str, props: Value) -> io::Result<Bytes> {
    Ok(Bytes::from(format!(
        "data: {}\n\n",
        json!({ "type": t, "properties": props })
    )))
}

fn connected() -> io::Result<Bytes> {
    frame("server.connected", json!({}))
}

fn fast_config() -> ClientConfig {
    ClientConfig {
        backoff_initial_ms: 10,
        backoff_max_ms: 50,
        dispatch_queue: 8,
        ..ClientConfig::default()
    }
}

async fn wait_until(state: &LocalState, cond: impl Fn(&StateSnapshot) -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if cond(&*state.read().await) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("state condition not reached");
}

fn idle(snap: &StateSnapshot, session: &str) -> bool {
    snap.session_status.get(session) == Some(&SessionStatus::Idle)
}

#[tokio::test]
async fn reconnects_after_stream_end_and_resyncs() {
    let connector = Scripted::new(vec![
        Script::Close(vec![
            connected(),
            frame("session.updated", json!({"info": {"id": "s1"}})),
            frame("message.updated", json!({"info": {"id": "m1", "sessionID": "s1"}})),
        ]),
        Script::Hold(vec![
            connected(),
            frame("message.part.updated", json!({"part": {"id": "p1", "messageID": "m1", "sessionID": "s1"}})),
            frame("session.idle", json!({"sessionID": "s1"})),
        ]),
    ]);
    let recovery = Arc::new(CountingRecovery::default());
    let state = LocalState::new();

    let mut session = EventStreamSession::spawn(
        &fast_config(),
        connector.clone(),
        Arc::new(Dispatcher::with_defaults()),
        state.clone(),
        recovery.clone(),
    );

    wait_until(&state, |s| idle(s, "s1")).await;

    let snap = state.snapshot().await;
    assert_eq!(snap.connects, 2);
    assert!(snap.part("m1", "p1").is_some());
    assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
    assert_eq!(recovery.calls.load(Ordering::SeqCst), 1);
    assert_eq!(session.status(), StreamStatus::Connected);

    session.close().await;
    assert_eq!(session.status(), StreamStatus::Closed);
}

#[tokio::test]
async fn malformed_frame_forces_reconnect() {
    let connector = Scripted::new(vec![
        Script::Hold(vec![
            connected(),
            Ok(Bytes::from_static(b"data: {oops\n\n")),
            frame("session.idle", json!({"sessionID": "never"})),
        ]),
        Script::Hold(vec![connected(), frame("session.idle", json!({"sessionID": "s2"}))]),
    ]);
    let state = LocalState::new();
    let mut session = EventStreamSession::spawn(
        &fast_config(),
        connector.clone(),
        Arc::new(Dispatcher::with_defaults()),
        state.clone(),
        Arc::new(NoRecovery),
    );

    wait_until(&state, |s| idle(s, "s2")).await;
    assert!(!state.read().await.session_status.contains_key("never"));
    assert_eq!(connector.connects.load(Ordering::SeqCst), 2);

    session.close().await;
}

#[tokio::test]
async fn failing_handler_does_not_stop_the_stream() {
    let connector = Scripted::new(vec![Script::Hold(vec![
        connected(),
        frame("message.part.updated", json!({"part": {"id": "p1", "messageID": "ghost", "sessionID": "s1"}})),
        frame("brand.new.event", json!({"anything": true})),
        frame("session.idle", json!({"sessionID": "s1"})),
    ])]);
    let state = LocalState::new();
    let mut session = EventStreamSession::spawn(
        &fast_config(),
        connector.clone(),
        Arc::new(Dispatcher::with_defaults()),
        state.clone(),
        Arc::new(NoRecovery),
    );

    wait_until(&state, |s| idle(s, "s1")).await;
    assert!(state.read().await.parts.is_empty());
    assert_eq!(connector.connects.load(Ordering::SeqCst), 1);

    session.close().await;
}

#[tokio::test]
async fn close_releases_the_connection() {
    let connector = Scripted::new(vec![Script::Hold(vec![connected()])]);
    let state = LocalState::new();
    let mut session = EventStreamSession::spawn(
        &fast_config(),
        connector.clone(),
        Arc::new(Dispatcher::with_defaults()),
        state.clone(),
        Arc::new(NoRecovery),
    );

    wait_until(&state, |s| s.connects == 1).await;
    assert!(!connector.released.load(Ordering::SeqCst));

    tokio::time::timeout(Duration::from_secs(1), session.close())
        .await
        .expect("close must not hang");
    assert!(connector.released.load(Ordering::SeqCst));
    assert_eq!(session.status(), StreamStatus::Closed);
}

#[tokio::test]
async fn keeps_retrying_while_unreachable() {
    let connector = Scripted::new(vec![]);
    let state = LocalState::new();
    let mut session = EventStreamSession::spawn(
        &fast_config(),
        connector.clone(),
        Arc::new(Dispatcher::with_defaults()),
        state,
        Arc::new(NoRecovery),
    );

    let mut status = session.subscribe_status();
    tokio::time::timeout(
        Duration::from_secs(5),
        status.wait_for(|s| matches!(s, StreamStatus::Reconnecting { attempt } if *attempt >= 3)),
    )
    .await
    .expect("should keep reconnecting")
    .unwrap();
    assert!(connector.connects.load(Ordering::SeqCst) >= 3);

    session.close().await;
}

#[tokio::test]
async fn silent_stream_is_dropped_and_resynced() {
    // first connection goes quiet after the connected frame
    let connector = Scripted::new(vec![
        Script::Hold(vec![connected()]),
        Script::Hold(vec![connected(), frame("session.idle", json!({"sessionID": "s1"}))]),
    ]);
    let recovery = Arc::new(CountingRecovery::default());
    let state = LocalState::new();
    let cfg = ClientConfig {
        idle_timeout_ms: 200,
        ..fast_config()
    };
    let mut session = EventStreamSession::spawn(
        &cfg,
        connector.clone(),
        Arc::new(Dispatcher::with_defaults()),
        state.clone(),
        recovery.clone(),
    );

    wait_until(&state, |s| idle(s, "s1")).await;
    assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
    assert_eq!(recovery.calls.load(Ordering::SeqCst), 1);
    assert_eq!(state.read().await.connects, 2);

    session.close().await;
}

#[tokio::test]
async fn first_backoff_reports_attempt_zero() {
    let connector = Scripted::new(vec![]);
    let cfg = ClientConfig {
        backoff_initial_ms: 2_000,
        backoff_max_ms: 2_000,
        ..fast_config()
    };
    let mut session = EventStreamSession::spawn(
        &cfg,
        connector.clone(),
        Arc::new(Dispatcher::with_defaults()),
        LocalState::new(),
        Arc::new(NoRecovery),
    );

    let mut status = session.subscribe_status();
    let seen = tokio::time::timeout(
        Duration::from_secs(1),
        status.wait_for(|s| matches!(s, StreamStatus::Reconnecting { .. })),
    )
    .await
    .expect("first connect should fail fast")
    .map(|s| *s)
    .unwrap();
    assert_eq!(seen, StreamStatus::Reconnecting { attempt: 0 });
    assert_eq!(connector.connects.load(Ordering::SeqCst), 1);

    session.close().await;
}
