//! Transport layer (push stream).
//!
//! Exposes the long-lived event stream endpoint. Frames are encoded once by
//! the bus and written here unchanged.

pub mod event_stream;
