//! Shared error type across pushwire crates.

use thiserror::Error;

/// Stable error codes surfaced to HTTP callers and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCode {
    /// Invalid input.
    BadRequest,
    /// Protocol violation on the event stream.
    MalformedFrame,
    /// Connection dropped or could not be established.
    Transport,
    /// Deadline elapsed.
    Timeout,
    /// A dispatch handler rejected an envelope.
    HandlerFailed,
    /// A control command failed while executing locally.
    CommandFailed,
    /// Referenced entity does not exist.
    NotFound,
    /// Request conflicts with in-flight work.
    Conflict,
    /// Unsupported protocol or config version.
    UnsupportedVersion,
    /// Internal error.
    Internal,
}

impl ClientCode {
    /// String representation used in JSON responses.
    pub fn as_str(self) -> &'static str {
        match self {
            ClientCode::BadRequest => "BAD_REQUEST",
            ClientCode::MalformedFrame => "MALFORMED_FRAME",
            ClientCode::Transport => "TRANSPORT",
            ClientCode::Timeout => "TIMEOUT",
            ClientCode::HandlerFailed => "HANDLER_FAILED",
            ClientCode::CommandFailed => "COMMAND_FAILED",
            ClientCode::NotFound => "NOT_FOUND",
            ClientCode::Conflict => "CONFLICT",
            ClientCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ClientCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, PushwireError>;

/// Unified error type used by core, gateway, and client.
///
/// An unrecognised event tag is not an error: it decodes to
/// `EventType::Unknown` and is dropped by the dispatcher.
#[derive(Debug, Error)]
pub enum PushwireError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    #[error("transport: {0}")]
    Transport(String),
    #[error("timeout")]
    Timeout,
    #[error("handler failed: {0}")]
    Handler(String),
    #[error("command failed: {0}")]
    CommandExecution(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("unsupported version")]
    UnsupportedVersion,
    #[error("internal: {0}")]
    Internal(String),
}

impl PushwireError {
    /// Map internal error to a stable client-facing code.
    pub fn client_code(&self) -> ClientCode {
        match self {
            PushwireError::BadRequest(_) => ClientCode::BadRequest,
            PushwireError::MalformedFrame(_) => ClientCode::MalformedFrame,
            PushwireError::Transport(_) => ClientCode::Transport,
            PushwireError::Timeout => ClientCode::Timeout,
            PushwireError::Handler(_) => ClientCode::HandlerFailed,
            PushwireError::CommandExecution(_) => ClientCode::CommandFailed,
            PushwireError::NotFound(_) => ClientCode::NotFound,
            PushwireError::Conflict(_) => ClientCode::Conflict,
            PushwireError::UnsupportedVersion => ClientCode::UnsupportedVersion,
            PushwireError::Internal(_) => ClientCode::Internal,
        }
    }

    /// Whether the failing operation may succeed if retried on a fresh
    /// connection.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PushwireError::Transport(_) | PushwireError::Timeout | PushwireError::Conflict(_)
        )
    }

    /// Whether the local side is broken or speaks another protocol version,
    /// so no later request can succeed either.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PushwireError::Internal(_) | PushwireError::UnsupportedVersion
        )
    }
}
