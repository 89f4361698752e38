//! pushwire core: transport-agnostic event envelopes, stream framing,
//! control-channel wire types, and the shared error type.
//!
//! This crate defines the wire-level contracts shared by the gateway (which
//! encodes and fans out frames) and the client (which parses them back). It
//! carries no transport or runtime dependencies so both sides and test
//! tooling can reuse it as-is.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here. Malformed input
//! surfaces as `PushwireError::MalformedFrame`, never as a crash.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod control;
pub mod error;
pub mod event;
pub mod frame;

/// Shared result type.
pub use error::{Result, PushwireError};
pub use event::{Envelope, EventType};
