//! Client-local mirror of server state, written by the dispatcher.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Clone, PartialEq)]
pub enum SessionStatus {
    Idle,
    Compacted,
    Error(Value),
}

/// Everything the dispatcher knows. Payloads are kept as raw JSON.
#[derive(Debug, Clone, Default)]
pub struct StateSnapshot {
    /// session id -> session info
    pub sessions: BTreeMap<String, Value>,
    /// session id -> message id -> message info
    pub messages: BTreeMap<String, BTreeMap<String, Value>>,
    /// message id -> part id -> part
    pub parts: BTreeMap<String, BTreeMap<String, Value>>,
    /// permission id -> pending permission request
    pub permissions: BTreeMap<String, Value>,
    /// session id -> todo list
    pub todos: BTreeMap<String, Value>,
    pub session_status: BTreeMap<String, SessionStatus>,
    pub edited_files: BTreeSet<String>,
    /// file -> last watcher event
    pub watched_files: BTreeMap<String, String>,
    /// file path -> language server id
    pub diagnostics: BTreeMap<String, String>,
    pub storage: BTreeMap<String, Value>,
    pub installation_version: Option<String>,
    pub ide: Option<String>,
    /// Number of `server.connected` frames seen (one per stream).
    pub connects: u64,
    pub last_heartbeat: Option<Instant>,
}

impl StateSnapshot {
    pub fn message(&self, session: &str, message: &str) -> Option<&Value> {
        self.messages.get(session)?.get(message)
    }

    pub fn part(&self, message: &str, part: &str) -> Option<&Value> {
        self.parts.get(message)?.get(part)
    }

    /// Drop a session and everything hanging off it.
    pub fn remove_session(&mut self, session: &str) {
        self.sessions.remove(session);
        if let Some(messages) = self.messages.remove(session) {
            for id in messages.keys() {
                self.parts.remove(id);
            }
        }
        self.todos.remove(session);
        self.session_status.remove(session);
        self.permissions
            .retain(|_, p| p.get("sessionID").and_then(Value::as_str) != Some(session));
    }
}

/// Shared handle; clones point at the same store.
#[derive(Debug, Clone, Default)]
pub struct LocalState {
    inner: Arc<RwLock<StateSnapshot>>,
}

impl LocalState {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, StateSnapshot> {
        self.inner.read().await
    }

    pub async fn write(&self) -> RwLockWriteGuard<'_, StateSnapshot> {
        self.inner.write().await
    }

    pub async fn snapshot(&self) -> StateSnapshot {
        self.inner.read().await.clone()
    }

    /// Swap in a freshly fetched snapshot (resync after a gap).
    pub async fn replace(&self, snapshot: StateSnapshot) {
        *self.inner.write().await = snapshot;
    }
}
