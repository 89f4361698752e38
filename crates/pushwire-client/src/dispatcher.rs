use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;

use pushwire_core::error::{PushwireError, Result};
use pushwire_core::{Envelope, EventType};

use crate::handlers;
use crate::state::{LocalState, StateSnapshot};

/// Applies one event type to local state.
///
/// Must tolerate duplicate delivery: applying the same payload twice leaves
/// the state as applying it once. On error the handler must not have
/// mutated anything.
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> EventType;
    fn apply(&self, state: &mut StateSnapshot, properties: &Value) -> Result<()>;
}

#[derive(Debug)]
pub enum DispatchOutcome {
    Applied,
    /// Unknown tag or no handler registered: no state change.
    Ignored,
    /// Handler rejected the payload; logged and contained.
    Failed(PushwireError),
}

impl DispatchOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, DispatchOutcome::Applied)
    }
}

/// Registry of handlers keyed by event type.
#[derive(Default)]
pub struct Dispatcher {
    handlers: DashMap<EventType, Arc<dyn EventHandler>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }

    /// Dispatcher with a handler for every known tag.
    pub fn with_defaults() -> Self {
        let d = Self::new();
        handlers::register_defaults(&d);
        d
    }

    /// Returns the handler previously registered for the same tag.
    pub fn register(&self, handler: Arc<dyn EventHandler>) -> Option<Arc<dyn EventHandler>> {
        self.handlers.insert(handler.event_type(), handler)
    }

    pub fn registered(&self) -> Vec<EventType> {
        let mut tags: Vec<EventType> = self.handlers.iter().map(|e| e.key().clone()).collect();
        tags.sort();
        tags
    }

    /// Apply one envelope. Never fails: handler errors are logged and
    /// reported in the outcome so the stream keeps flowing.
    pub async fn dispatch(&self, state: &LocalState, env: &Envelope) -> DispatchOutcome {
        if !env.event_type.is_known() {
            tracing::trace!(event_type = %env.event_type, "ignoring unknown event type");
            return DispatchOutcome::Ignored;
        }
        let Some(handler) = self
            .handlers
            .get(&env.event_type)
            .map(|h| Arc::clone(h.value()))
        else {
            return DispatchOutcome::Ignored;
        };

        let mut snapshot = state.write().await;
        match handler.apply(&mut snapshot, &env.properties) {
            Ok(()) => DispatchOutcome::Applied,
            Err(e) => {
                tracing::warn!(event_type = %env.event_type, error = %e, "event handler failed");
                DispatchOutcome::Failed(e)
            }
        }
    }
}
