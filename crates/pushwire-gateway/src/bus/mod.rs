//! In-process event bus.
//!
//! Publishers encode an envelope once; the bus fans the frame out to every
//! live subscription's bounded queue without awaiting any of them.

mod event_bus;
mod registry;

pub use event_bus::{BusStats, EventBus, Subscription};
pub use registry::{Sink, SubscriberRegistry, SubscriptionId};
