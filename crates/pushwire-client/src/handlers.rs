//! Built-in handlers, one per known event type.
//!
//! Every handler is an upsert or a removal keyed by ids carried in the
//! payload, so re-delivery is harmless. Required fields are validated
//! before anything is written.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;

use pushwire_core::error::{PushwireError, Result};
use pushwire_core::EventType;

use crate::dispatcher::{Dispatcher, EventHandler};
use crate::state::{SessionStatus, StateSnapshot};

pub type ApplyFn = fn(&mut StateSnapshot, &Value) -> Result<()>;

/// Adapts a plain function into an [`EventHandler`].
pub struct FnHandler {
    event_type: EventType,
    apply: ApplyFn,
}

impl FnHandler {
    pub fn new(event_type: EventType, apply: ApplyFn) -> Self {
        Self { event_type, apply }
    }
}

impl EventHandler for FnHandler {
    fn event_type(&self) -> EventType {
        self.event_type.clone()
    }

    fn apply(&self, state: &mut StateSnapshot, properties: &Value) -> Result<()> {
        (self.apply)(state, properties)
    }
}

pub fn register_defaults(dispatcher: &Dispatcher) {
    let table: [(EventType, ApplyFn); 20] = [
        (EventType::ServerConnected, on_server_connected),
        (EventType::ServerHeartbeat, on_server_heartbeat),
        (EventType::InstallationUpdated, on_installation_updated),
        (EventType::LspClientDiagnostics, on_lsp_diagnostics),
        (EventType::MessageUpdated, on_message_updated),
        (EventType::MessageRemoved, on_message_removed),
        (EventType::MessagePartUpdated, on_part_updated),
        (EventType::MessagePartRemoved, on_part_removed),
        (EventType::StorageWrite, on_storage_write),
        (EventType::PermissionUpdated, on_permission_updated),
        (EventType::PermissionReplied, on_permission_replied),
        (EventType::FileEdited, on_file_edited),
        (EventType::FileWatcherUpdated, on_file_watcher_updated),
        (EventType::SessionUpdated, on_session_updated),
        (EventType::SessionDeleted, on_session_deleted),
        (EventType::SessionIdle, on_session_idle),
        (EventType::SessionError, on_session_error),
        (EventType::SessionCompacted, on_session_compacted),
        (EventType::TodoUpdated, on_todo_updated),
        (EventType::IdeInstalled, on_ide_installed),
    ];
    for (event_type, apply) in table {
        dispatcher.register(Arc::new(FnHandler::new(event_type, apply)));
    }
}

fn field<'a>(v: &'a Value, key: &str) -> Result<&'a Value> {
    v.get(key)
        .ok_or_else(|| PushwireError::Handler(format!("missing field `{key}`")))
}

fn str_field<'a>(v: &'a Value, key: &str) -> Result<&'a str> {
    field(v, key)?
        .as_str()
        .ok_or_else(|| PushwireError::Handler(format!("field `{key}` must be a string")))
}

fn on_server_connected(state: &mut StateSnapshot, _: &Value) -> Result<()> {
    state.connects += 1;
    Ok(())
}

fn on_server_heartbeat(state: &mut StateSnapshot, _: &Value) -> Result<()> {
    state.last_heartbeat = Some(Instant::now());
    Ok(())
}

fn on_installation_updated(state: &mut StateSnapshot, p: &Value) -> Result<()> {
    state.installation_version = Some(str_field(p, "version")?.to_string());
    Ok(())
}

fn on_lsp_diagnostics(state: &mut StateSnapshot, p: &Value) -> Result<()> {
    let path = str_field(p, "path")?;
    let server = str_field(p, "serverID")?;
    state.diagnostics.insert(path.to_string(), server.to_string());
    Ok(())
}

fn on_message_updated(state: &mut StateSnapshot, p: &Value) -> Result<()> {
    let info = field(p, "info")?;
    let id = str_field(info, "id")?;
    let session = str_field(info, "sessionID")?;
    state
        .messages
        .entry(session.to_string())
        .or_default()
        .insert(id.to_string(), info.clone());
    Ok(())
}

fn on_message_removed(state: &mut StateSnapshot, p: &Value) -> Result<()> {
    let session = str_field(p, "sessionID")?;
    let message = str_field(p, "messageID")?;
    if let Some(messages) = state.messages.get_mut(session) {
        messages.remove(message);
    }
    state.parts.remove(message);
    Ok(())
}

/// Parts hang off a message that an earlier `message.updated` created.
fn on_part_updated(state: &mut StateSnapshot, p: &Value) -> Result<()> {
    let part = field(p, "part")?;
    let id = str_field(part, "id")?;
    let message = str_field(part, "messageID")?;
    let session = str_field(part, "sessionID")?;
    if state.message(session, message).is_none() {
        return Err(PushwireError::Handler(format!(
            "part {id} references unknown message {message}"
        )));
    }
    state
        .parts
        .entry(message.to_string())
        .or_default()
        .insert(id.to_string(), part.clone());
    Ok(())
}

fn on_part_removed(state: &mut StateSnapshot, p: &Value) -> Result<()> {
    let message = str_field(p, "messageID")?;
    let part = str_field(p, "partID")?;
    if let Some(parts) = state.parts.get_mut(message) {
        parts.remove(part);
    }
    Ok(())
}

fn on_storage_write(state: &mut StateSnapshot, p: &Value) -> Result<()> {
    let key = str_field(p, "key")?;
    let content = p.get("content").cloned().unwrap_or(Value::Null);
    state.storage.insert(key.to_string(), content);
    Ok(())
}

fn on_permission_updated(state: &mut StateSnapshot, p: &Value) -> Result<()> {
    let id = str_field(p, "id")?;
    state.permissions.insert(id.to_string(), p.clone());
    Ok(())
}

fn on_permission_replied(state: &mut StateSnapshot, p: &Value) -> Result<()> {
    let id = str_field(p, "permissionID")?;
    state.permissions.remove(id);
    Ok(())
}

fn on_file_edited(state: &mut StateSnapshot, p: &Value) -> Result<()> {
    state.edited_files.insert(str_field(p, "file")?.to_string());
    Ok(())
}

fn on_file_watcher_updated(state: &mut StateSnapshot, p: &Value) -> Result<()> {
    let file = str_field(p, "file")?;
    let event = str_field(p, "event")?;
    state.watched_files.insert(file.to_string(), event.to_string());
    Ok(())
}

fn on_session_updated(state: &mut StateSnapshot, p: &Value) -> Result<()> {
    let info = field(p, "info")?;
    let id = str_field(info, "id")?;
    state.sessions.insert(id.to_string(), info.clone());
    Ok(())
}

fn on_session_deleted(state: &mut StateSnapshot, p: &Value) -> Result<()> {
    let id = str_field(field(p, "info")?, "id")?;
    state.remove_session(id);
    Ok(())
}

fn on_session_idle(state: &mut StateSnapshot, p: &Value) -> Result<()> {
    let session = str_field(p, "sessionID")?;
    state
        .session_status
        .insert(session.to_string(), SessionStatus::Idle);
    Ok(())
}

/// `sessionID` is optional: errors outside a session have nowhere to land.
fn on_session_error(state: &mut StateSnapshot, p: &Value) -> Result<()> {
    let Some(session) = p.get("sessionID").and_then(Value::as_str) else {
        tracing::debug!("session.error without sessionID");
        return Ok(());
    };
    let error = p.get("error").cloned().unwrap_or(Value::Null);
    state
        .session_status
        .insert(session.to_string(), SessionStatus::Error(error));
    Ok(())
}

fn on_session_compacted(state: &mut StateSnapshot, p: &Value) -> Result<()> {
    let session = str_field(p, "sessionID")?;
    state
        .session_status
        .insert(session.to_string(), SessionStatus::Compacted);
    Ok(())
}

fn on_todo_updated(state: &mut StateSnapshot, p: &Value) -> Result<()> {
    let session = str_field(p, "sessionID")?;
    let todos = field(p, "todos")?;
    state.todos.insert(session.to_string(), todos.clone());
    Ok(())
}

fn on_ide_installed(state: &mut StateSnapshot, p: &Value) -> Result<()> {
    state.ide = Some(str_field(p, "ide")?.to_string());
    Ok(())
}
