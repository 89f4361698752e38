//! pushwire client: the consumer side of the push channel and the control
//! channel.
//!
//! - [`decoder::StreamDecoder`] turns a byte stream into envelopes (pull API).
//! - [`dispatcher::Dispatcher`] routes envelopes by tag into [`state::LocalState`].
//! - [`session::EventStreamSession`] runs decode and dispatch as two tasks
//!   and reconnects with backoff.
//! - [`control::ControlLoop`] drives the long-poll command cycle.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod backoff;
pub mod config;
pub mod control;
pub mod decoder;
pub mod dispatcher;
pub mod handlers;
pub mod session;
pub mod state;

pub use config::ClientConfig;
pub use control::{ControlHandle, ControlLoop, ControlState};
pub use decoder::StreamDecoder;
pub use dispatcher::{DispatchOutcome, Dispatcher, EventHandler};
pub use session::EventStreamSession;
pub use state::LocalState;
