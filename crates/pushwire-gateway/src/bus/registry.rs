use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::server::ConnectionAbort;

/// Opaque subscription handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// One subscriber's outbound frame queue sender.
#[derive(Clone)]
pub struct Sink {
    pub tx: mpsc::Sender<Bytes>,
    /// Fired on eviction to drop the underlying connection.
    pub abort: Option<ConnectionAbort>,
}

/// Subscriber registry: `subscription_id -> Sink`.
#[derive(Default)]
pub struct SubscriberRegistry {
    subs: DashMap<SubscriptionId, Sink>,
    seq: AtomicU64,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self {
            subs: DashMap::new(),
            seq: AtomicU64::new(1),
        }
    }

    pub fn insert(&self, sink: Sink) -> SubscriptionId {
        let id = SubscriptionId(self.seq.fetch_add(1, Ordering::Relaxed));
        self.subs.insert(id, sink);
        id
    }

    pub fn remove(&self, id: SubscriptionId) -> Option<Sink> {
        self.subs.remove(&id).map(|(_, sink)| sink)
    }

    pub fn contains(&self, id: SubscriptionId) -> bool {
        self.subs.contains_key(&id)
    }

    /// Copy out the current sinks so delivery happens without holding shard locks.
    pub fn snapshot(&self) -> Vec<(SubscriptionId, Sink)> {
        self.subs
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.subs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subs.is_empty()
    }

    /// Drop every sink. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let n = self.subs.len();
        self.subs.clear();
        n
    }
}
