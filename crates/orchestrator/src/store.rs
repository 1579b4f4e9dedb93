//! Observable snapshot store.

use std::{
    ops::Deref,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use tokio::sync::mpsc;

/// Immutable point-in-time copy of the state mapping. Cloning is cheap.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateSnapshot(Arc<Map<String, Value>>);

impl StateSnapshot {
    /// Returns a new snapshot equal to `self` with `key` set to `value`.
    pub fn with(&self, key: &str, value: Value) -> Self {
        let mut next = (*self.0).clone();
        next.insert(key.to_string(), value);
        Self(Arc::new(next))
    }

    pub fn to_value(&self) -> Value {
        Value::Object((*self.0).clone())
    }
}

impl Serialize for StateSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.as_ref().serialize(serializer)
    }
}

impl Deref for StateSnapshot {
    type Target = Map<String, Value>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Map<String, Value>> for StateSnapshot {
    fn from(value: Map<String, Value>) -> Self {
        Self(Arc::new(value))
    }
}

#[derive(Default)]
struct StoreInner {
    current: StateSnapshot,
    subscribers: Vec<mpsc::UnboundedSender<StateSnapshot>>,
}

/// Holds the current snapshot and fans every publish out to each subscriber's own
/// unbounded queue, so a slow subscriber never loses a notification.
#[derive(Default)]
pub struct StateStore {
    inner: Mutex<StoreInner>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> StateSnapshot {
        self.inner().current.clone()
    }

    /// Replaces the current snapshot and notifies every live subscriber once.
    /// Subscribers that have been dropped are pruned here.
    pub(crate) fn publish(&self, snapshot: StateSnapshot) {
        let mut inner = self.inner();
        inner.current = snapshot.clone();
        inner
            .subscribers
            .retain(|subscriber| subscriber.send(snapshot.clone()).is_ok());
    }

    pub fn subscribe(&self) -> StateSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner();
        inner.subscribers.push(tx);
        StateSubscription {
            pending: Some(inner.current.clone()),
            updates: rx,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner()
            .subscribers
            .iter()
            .filter(|subscriber| !subscriber.is_closed())
            .count()
    }
}

/// Receives the snapshot current at subscription time, then every later one.
/// Dropping the subscription unsubscribes.
pub struct StateSubscription {
    pending: Option<StateSnapshot>,
    updates: mpsc::UnboundedReceiver<StateSnapshot>,
}

impl StateSubscription {
    /// Next snapshot, or `None` once the store is gone.
    pub async fn next(&mut self) -> Option<StateSnapshot> {
        if let Some(snapshot) = self.pending.take() {
            return Some(snapshot);
        }
        self.updates.recv().await
    }
}
