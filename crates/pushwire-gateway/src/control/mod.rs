//! Control channel (server side).
//!
//! External tools submit commands for a consumer connection; the consumer
//! long-polls for the next one, executes it, and posts the result back.

pub mod hub;
pub mod routes;

pub use hub::ControlHub;
