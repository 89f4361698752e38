use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};

use pushwire_core::error::Result;
use pushwire_core::frame::encode_frame;
use pushwire_core::Envelope;

use crate::server::ConnectionAbort;

use super::registry::{Sink, SubscriberRegistry, SubscriptionId};

/// Process-wide publish/subscribe registry.
///
/// Overflow policy: each subscriber owns a bounded queue. `publish` never
/// waits; a subscriber whose queue is full is evicted. Its queued frames are
/// discarded, its stream ends, and the connection it is linked to (if any)
/// is aborted. Other subscribers are unaffected.
pub struct EventBus {
    registry: SubscriberRegistry,
    queue: usize,
    published: AtomicU64,
    evicted: AtomicU64,
}

/// Point-in-time counters (served by `/v1/stats`).
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BusStats {
    pub subscribers: usize,
    pub published: u64,
    pub evicted: u64,
}

impl EventBus {
    pub fn new(subscriber_queue: usize) -> Self {
        Self {
            registry: SubscriberRegistry::new(),
            queue: subscriber_queue.max(1),
            published: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
        }
    }

    /// Register a new sink. Dropping the returned `Subscription` unsubscribes.
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        self.subscribe_linked(None)
    }

    /// Like [`subscribe`](Self::subscribe), and eviction also fires `abort`.
    pub fn subscribe_linked(self: &Arc<Self>, abort: Option<ConnectionAbort>) -> Subscription {
        let (tx, rx) = mpsc::channel(self.queue);
        let id = self.registry.insert(Sink { tx, abort });
        tracing::debug!(sub = %id, subscribers = self.registry.len(), "subscribed");
        Subscription {
            id,
            rx,
            bus: Arc::clone(self),
        }
    }

    /// Remove a sink. Unknown or already-removed handles are a no-op.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.registry.remove(id).is_some();
        if removed {
            tracing::debug!(sub = %id, subscribers = self.registry.len(), "unsubscribed");
        }
        removed
    }

    pub fn is_subscribed(&self, id: SubscriptionId) -> bool {
        self.registry.contains(id)
    }

    /// Encode once, then deliver to every current subscriber.
    /// Returns how many subscribers accepted the frame.
    pub fn publish(&self, env: &Envelope) -> Result<usize> {
        let frame = encode_frame(env)?;
        tracing::trace!(event = %env.event_type, bytes = frame.len(), "publish");
        Ok(self.publish_frame(frame))
    }

    /// Deliver a pre-encoded frame.
    pub fn publish_frame(&self, frame: Bytes) -> usize {
        self.published.fetch_add(1, Ordering::Relaxed);

        let mut delivered = 0;
        for (id, sink) in self.registry.snapshot() {
            match sink.tx.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    if self.registry.remove(id).is_some() {
                        self.evicted.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(sub = %id, queue = self.queue, "subscriber queue full, evicting");
                        if let Some(abort) = &sink.abort {
                            abort.abort();
                        }
                    }
                }
                Err(TrySendError::Closed(_)) => {
                    // Receiver already gone; its guard may not have run yet.
                    self.registry.remove(id);
                }
            }
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.len()
    }

    pub fn stats(&self) -> BusStats {
        BusStats {
            subscribers: self.registry.len(),
            published: self.published.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
        }
    }

    /// Drop every subscription so open streams finish (shutdown path).
    pub fn close_all(&self) -> usize {
        let n = self.registry.clear();
        if n > 0 {
            tracing::info!(subscribers = n, "bus closed all subscriptions");
        }
        n
    }
}

/// A live registration. Frames arrive in publish order.
///
/// Unsubscribes on drop, so a connection that dies mid-write still releases
/// its slot.
pub struct Subscription {
    id: SubscriptionId,
    rx: mpsc::Receiver<Bytes>,
    bus: Arc<EventBus>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Next frame; `None` once the bus dropped this subscription. Frames
    /// still queued at that point are discarded.
    pub async fn recv(&mut self) -> Option<Bytes> {
        if !self.bus.is_subscribed(self.id) {
            return None;
        }
        self.rx.recv().await
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<Bytes> {
        if !self.bus.is_subscribed(self.id) {
            return None;
        }
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.id);
    }
}
