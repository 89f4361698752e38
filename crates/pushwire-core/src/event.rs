//! Event envelope: a closed set of type tags plus an opaque property bag.
//!
//! The core never interprets `properties`; it only routes on the tag. Tags
//! outside the agreed set decode to [`EventType::Unknown`] so that a newer
//! server cannot break an older consumer.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Event type tag (field name is `type` on the wire).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EventType {
    ServerConnected,
    ServerHeartbeat,
    InstallationUpdated,
    LspClientDiagnostics,
    MessageUpdated,
    MessageRemoved,
    MessagePartUpdated,
    MessagePartRemoved,
    StorageWrite,
    PermissionUpdated,
    PermissionReplied,
    FileEdited,
    FileWatcherUpdated,
    SessionUpdated,
    SessionDeleted,
    SessionIdle,
    SessionError,
    SessionCompacted,
    TodoUpdated,
    IdeInstalled,
    /// Tag not in the agreed set; carried through verbatim.
    Unknown(String),
}

impl EventType {
    /// Every tag the server and client agree on.
    pub const KNOWN: [EventType; 20] = [
        EventType::ServerConnected,
        EventType::ServerHeartbeat,
        EventType::InstallationUpdated,
        EventType::LspClientDiagnostics,
        EventType::MessageUpdated,
        EventType::MessageRemoved,
        EventType::MessagePartUpdated,
        EventType::MessagePartRemoved,
        EventType::StorageWrite,
        EventType::PermissionUpdated,
        EventType::PermissionReplied,
        EventType::FileEdited,
        EventType::FileWatcherUpdated,
        EventType::SessionUpdated,
        EventType::SessionDeleted,
        EventType::SessionIdle,
        EventType::SessionError,
        EventType::SessionCompacted,
        EventType::TodoUpdated,
        EventType::IdeInstalled,
    ];

    /// Dotted wire name.
    pub fn as_str(&self) -> &str {
        match self {
            EventType::ServerConnected => "server.connected",
            EventType::ServerHeartbeat => "server.heartbeat",
            EventType::InstallationUpdated => "installation.updated",
            EventType::LspClientDiagnostics => "lsp.client.diagnostics",
            EventType::MessageUpdated => "message.updated",
            EventType::MessageRemoved => "message.removed",
            EventType::MessagePartUpdated => "message.part.updated",
            EventType::MessagePartRemoved => "message.part.removed",
            EventType::StorageWrite => "storage.write",
            EventType::PermissionUpdated => "permission.updated",
            EventType::PermissionReplied => "permission.replied",
            EventType::FileEdited => "file.edited",
            EventType::FileWatcherUpdated => "file.watcher.updated",
            EventType::SessionUpdated => "session.updated",
            EventType::SessionDeleted => "session.deleted",
            EventType::SessionIdle => "session.idle",
            EventType::SessionError => "session.error",
            EventType::SessionCompacted => "session.compacted",
            EventType::TodoUpdated => "todo.updated",
            EventType::IdeInstalled => "ide.installed",
            EventType::Unknown(tag) => tag,
        }
    }

    /// Resolve a wire name. Never fails: unrecognised names become `Unknown`.
    pub fn parse(tag: &str) -> Self {
        Self::KNOWN
            .iter()
            .find(|t| t.as_str() == tag)
            .cloned()
            .unwrap_or_else(|| EventType::Unknown(tag.to_string()))
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, EventType::Unknown(_))
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for EventType {
    type Error = String;

    fn try_from(tag: String) -> std::result::Result<Self, Self::Error> {
        if tag.is_empty() {
            return Err("event type must not be empty".into());
        }
        Ok(EventType::parse(&tag))
    }
}

impl From<EventType> for String {
    fn from(t: EventType) -> Self {
        match t {
            EventType::Unknown(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

/// One typed notification unit carried on the push channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(default = "empty_properties")]
    pub properties: Value,
}

fn empty_properties() -> Value {
    Value::Object(Map::new())
}

impl Envelope {
    pub fn new(event_type: EventType, properties: Value) -> Self {
        Self {
            event_type,
            properties,
        }
    }

    /// Synthetic first frame of every stream.
    pub fn connected() -> Self {
        Self::new(EventType::ServerConnected, empty_properties())
    }

    /// Idle keep-alive frame.
    pub fn heartbeat() -> Self {
        Self::new(EventType::ServerHeartbeat, empty_properties())
    }
}
