//! Top-level facade crate for pushwire.
//!
//! Re-exports the core types, the gateway, and the client so users can depend
//! on a single crate.

pub mod core {
    pub use pushwire_core::*;
}

pub mod gateway {
    pub use pushwire_gateway::*;
}

pub mod client {
    pub use pushwire_client::*;
}
