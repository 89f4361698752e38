//! Control channel wire types.
//!
//! A command travels server -> consumer as `{"id", "command", ...args}`;
//! its result travels back as `{"commandId", "status", "result"}`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Externally issued command awaiting local execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub id: String,
    /// Command name (field name is `command` on the wire).
    #[serde(rename = "command")]
    pub name: String,
    /// Remaining fields are the command arguments.
    #[serde(flatten)]
    pub args: Map<String, Value>,
}

impl Command {
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
        }
    }

    pub fn arg(&self, key: &str) -> Option<&Value> {
        self.args.get(key)
    }
}

/// Outcome of local execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    #[default]
    Ok,
    Error,
}

/// Exactly one per command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    #[serde(rename = "commandId")]
    pub command_id: String,
    #[serde(default)]
    pub status: CommandStatus,
    #[serde(default)]
    pub result: Value,
}

impl CommandResult {
    pub fn ok(command_id: impl Into<String>, result: Value) -> Self {
        Self {
            command_id: command_id.into(),
            status: CommandStatus::Ok,
            result,
        }
    }

    /// Failure captured as data; it is sent back, never thrown.
    pub fn failed(command_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            command_id: command_id.into(),
            status: CommandStatus::Error,
            result: json!({ "error": reason.into() }),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == CommandStatus::Ok
    }
}
