//! Channel-keyed publish/subscribe for read-path refreshes.
//!
//! Each subscriber owns an unbounded receiver; `publish` hands every live
//! subscriber of the key one copy of the event. Dropping the
//! [`Subscription`] (or calling `unsubscribe`) removes it.

use serde::Serialize;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::mpsc;

use stl_schemas::Party;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RefreshReason {
    LockConfirmed,
    OrderPlaced,
    OrderUnconfirmed,
    AllocationReleased,
    OrderCancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshEvent {
    pub reason: RefreshReason,
    pub contract_id: Option<String>,
}

pub fn holdings_channel(party: &Party) -> String {
    format!("holdings:{party}")
}

pub fn orders_channel(party: &Party) -> String {
    format!("orders:{party}")
}

type Subscribers<K, E> = HashMap<K, Vec<(u64, mpsc::UnboundedSender<E>)>>;

struct Inner<K, E> {
    next_id: AtomicU64,
    subscribers: Mutex<Subscribers<K, E>>,
}

impl<K, E> Inner<K, E> {
    fn lock(&self) -> MutexGuard<'_, Subscribers<K, E>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct RefreshBus<K, E = RefreshEvent> {
    inner: Arc<Inner<K, E>>,
}

impl<K, E> Clone for RefreshBus<K, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K, E> Default for RefreshBus<K, E> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Inner {
                next_id: AtomicU64::new(0),
                subscribers: Mutex::new(HashMap::new()),
            }),
        }
    }
}

impl<K, E> std::fmt::Debug for RefreshBus<K, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshBus").finish_non_exhaustive()
    }
}

impl<K: Eq + Hash + Clone, E: Clone> RefreshBus<K, E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, key: K) -> Subscription<K, E> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.lock().entry(key.clone()).or_default().push((id, tx));
        Subscription {
            id,
            key: Some(key),
            rx,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Number of subscribers the event was delivered to.
    pub fn publish(&self, key: &K, event: E) -> usize {
        let mut subs = self.inner.lock();
        let Some(list) = subs.get_mut(key) else {
            return 0;
        };
        list.retain(|(_, tx)| tx.send(event.clone()).is_ok());
        let delivered = list.len();
        if list.is_empty() {
            subs.remove(key);
        }
        delivered
    }

    pub fn subscriber_count(&self, key: &K) -> usize {
        self.inner.lock().get(key).map_or(0, Vec::len)
    }
}

pub struct Subscription<K: Eq + Hash, E = RefreshEvent> {
    id: u64,
    key: Option<K>,
    rx: mpsc::UnboundedReceiver<E>,
    bus: Weak<Inner<K, E>>,
}

impl<K: Eq + Hash, E> Subscription<K, E> {
    pub async fn recv(&mut self) -> Option<E> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<E> {
        self.rx.try_recv().ok()
    }

    pub fn unsubscribe(self) {}

    fn detach(&mut self) {
        let (Some(key), Some(bus)) = (self.key.take(), self.bus.upgrade()) else {
            return;
        };
        let mut subs = bus.lock();
        if let Some(list) = subs.get_mut(&key) {
            list.retain(|(id, _)| *id != self.id);
            if list.is_empty() {
                subs.remove(&key);
            }
        }
    }
}

impl<K: Eq + Hash, E> Drop for Subscription<K, E> {
    fn drop(&mut self) {
        self.detach();
    }
}
