//! pushwire gateway library entry.
//!
//! This crate wires the event bus, the per-connection event stream, the
//! control hub, and ops endpoints into one axum router, served by the
//! accept loop in [`server`]. It is consumed by the binary (`main.rs`) and
//! by integration tests.

pub mod app_state;
pub mod bus;
pub mod config;
pub mod control;
pub mod error;
pub mod ops;
pub mod router;
pub mod server;
pub mod transport;
