//! Observer channel over a single store key
//!
//! A channel caches the last value it has seen and notifies subscribers
//! when a new value *differs* according to the record's predicate. Two
//! capability views exist: [`ReadWrite`] for the owning role and
//! [`ReadOnly`] for everyone else. Publishing persists through the store and
//! notifies local subscribers synchronously, because storage events are
//! never delivered to the writer.

use crate::error::ChannelError;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, trace};
use wargame_store::{SessionKeyStore, StorageEvent, StorageEvents};

/// A value that can travel through a shared channel
pub trait ChannelRecord: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Whether `self` is a change relative to `previous`
    fn differs(&self, previous: &Self) -> bool;
}

/// Handle returned by `subscribe`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Inner<T> {
    store: Arc<SessionKeyStore>,
    key: String,
    cached: Mutex<Option<T>>,
    subscribers: Mutex<Vec<(SubscriptionId, Callback<T>)>>,
    next_id: AtomicU64,
}

/// Shared record channel
pub(crate) struct Channel<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: ChannelRecord> Channel<T> {
    fn new(store: Arc<SessionKeyStore>, key: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                key: key.into(),
                cached: Mutex::new(None),
                subscribers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    fn key(&self) -> &str {
        &self.inner.key
    }

    fn current(&self) -> Option<T> {
        self.inner.cached.lock().clone()
    }

    fn read(&self) -> Option<T> {
        self.inner.store.get_opt(&self.inner.key)
    }

    fn subscribe(&self, on_change: impl Fn(&T) + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner.subscribers.lock().push((id, Arc::new(on_change)));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.inner.subscribers.lock().retain(|(sid, _)| *sid != id);
    }

    /// Replace the cache if `value` is a change; returns whether it was
    fn apply(&self, value: &T) -> bool {
        let mut cached = self.inner.cached.lock();
        let changed = cached.as_ref().map_or(true, |prev| value.differs(prev));
        if changed {
            *cached = Some(value.clone());
        }
        changed
    }

    fn notify(&self, value: &T) {
        let callbacks: Vec<Callback<T>> = self
            .inner
            .subscribers
            .lock()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in callbacks {
            callback(value);
        }
    }

    fn poll(&self) -> Option<T> {
        let value = self.read()?;
        if self.apply(&value) {
            trace!(key = %self.inner.key, "channel value changed");
            self.notify(&value);
            Some(value)
        } else {
            None
        }
    }

    fn publish(&self, value: &T) -> Result<(), ChannelError> {
        self.inner
            .store
            .try_set(&self.inner.key, value)
            .map_err(|e| ChannelError::publish(self.inner.key.clone(), e))?;
        if self.apply(value) {
            self.notify(value);
        }
        Ok(())
    }

    fn on_storage_event(&self, event: &StorageEvent) -> Option<T> {
        if event.key == self.inner.key {
            self.poll()
        } else {
            None
        }
    }

    fn spawn_poller(&self, every: Duration, events: Option<StorageEvents>) -> JoinHandle<()> {
        let channel = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut events = events;
            loop {
                let closed = tokio::select! {
                    _ = ticker.tick() => {
                        channel.poll();
                        false
                    }
                    event = next_event(&mut events) => match event {
                        Some(event) => {
                            channel.on_storage_event(&event);
                            false
                        }
                        None => true,
                    },
                };
                if closed {
                    debug!(key = %channel.inner.key, "storage events closed, polling only");
                    events = None;
                }
            }
        })
    }
}

async fn next_event(events: &mut Option<StorageEvents>) -> Option<StorageEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

macro_rules! read_api {
    () => {
        /// Store key
        #[must_use]
        pub fn key(&self) -> &str {
            self.channel.key()
        }

        /// Last value seen
        #[must_use]
        pub fn current(&self) -> Option<T> {
            self.channel.current()
        }

        /// Fresh read from the store, bypassing the cache
        #[must_use]
        pub fn read(&self) -> Option<T> {
            self.channel.read()
        }

        /// Register a change callback
        pub fn subscribe(&self, on_change: impl Fn(&T) + Send + Sync + 'static) -> SubscriptionId {
            self.channel.subscribe(on_change)
        }

        /// Drop a change callback
        pub fn unsubscribe(&self, id: SubscriptionId) {
            self.channel.unsubscribe(id);
        }

        /// Read the store; notify and return the value if it changed
        pub fn poll(&self) -> Option<T> {
            self.channel.poll()
        }

        /// React to a foreign storage change
        pub fn on_storage_event(&self, event: &StorageEvent) -> Option<T> {
            self.channel.on_storage_event(event)
        }

        /// Poll on an interval and on storage events until aborted
        pub fn spawn_poller(&self, every: Duration, events: Option<StorageEvents>) -> JoinHandle<()> {
            self.channel.spawn_poller(every, events)
        }
    };
}

/// Owner's view: read and publish
pub struct ReadWrite<T> {
    channel: Channel<T>,
}

impl<T: ChannelRecord> ReadWrite<T> {
    /// Open the owning view of `key`
    #[must_use]
    pub fn open(store: Arc<SessionKeyStore>, key: impl Into<String>) -> Self {
        Self {
            channel: Channel::new(store, key),
        }
    }

    read_api!();

    /// Persist and notify local subscribers
    pub fn publish(&self, value: &T) -> Result<(), ChannelError> {
        self.channel.publish(value)
    }

    /// A read-only view sharing this cache and subscriber list
    #[must_use]
    pub fn read_only(&self) -> ReadOnly<T> {
        ReadOnly {
            channel: self.channel.clone(),
        }
    }
}

/// Non-owner's view: read and subscribe only
pub struct ReadOnly<T> {
    channel: Channel<T>,
}

impl<T: ChannelRecord> ReadOnly<T> {
    /// Open a read-only view of `key`
    #[must_use]
    pub fn open(store: Arc<SessionKeyStore>, key: impl Into<String>) -> Self {
        Self {
            channel: Channel::new(store, key),
        }
    }

    read_api!();
}

impl<T> Clone for ReadOnly<T> {
    fn clone(&self) -> Self {
        Self {
            channel: self.channel.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::sync::atomic::AtomicUsize;
    use wargame_store::{MemoryBackend, SharedStorage};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Counter {
        value: u32,
        touched: u64,
    }

    impl ChannelRecord for Counter {
        fn differs(&self, previous: &Self) -> bool {
            self.value != previous.value
        }
    }

    fn store() -> Arc<SessionKeyStore> {
        Arc::new(SessionKeyStore::new(Arc::new(MemoryBackend::new())))
    }

    #[test]
    fn publish_notifies_local_subscribers_once_per_change() {
        let writer: ReadWrite<Counter> = ReadWrite::open(store(), "counter");
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        writer.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        writer.publish(&Counter { value: 1, touched: 1 }).unwrap();
        writer.publish(&Counter { value: 1, touched: 2 }).unwrap();
        writer.publish(&Counter { value: 2, touched: 3 }).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        // Store always holds the latest write
        assert_eq!(writer.read().unwrap().touched, 3);
    }

    #[test]
    fn poll_is_idempotent() {
        let s = store();
        let writer: ReadWrite<Counter> = ReadWrite::open(Arc::clone(&s), "counter");
        let reader: ReadOnly<Counter> = ReadOnly::open(s, "counter");
        assert!(reader.poll().is_none());

        writer.publish(&Counter { value: 5, touched: 0 }).unwrap();
        assert_eq!(reader.poll().unwrap().value, 5);
        assert!(reader.poll().is_none());
        assert_eq!(reader.current().unwrap().value, 5);
    }

    #[test]
    fn unsubscribe_stops_callbacks() {
        let writer: ReadWrite<Counter> = ReadWrite::open(store(), "counter");
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        let id = writer.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        writer.unsubscribe(id);
        writer.publish(&Counter { value: 9, touched: 0 }).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn poller_reacts_to_foreign_events() {
        let shared = SharedStorage::new(Arc::new(MemoryBackend::new()));
        let white_store = Arc::new(SessionKeyStore::new(Arc::new(shared.context())));
        let blue_ctx = shared.context();
        let events = blue_ctx.subscribe();
        let blue_store = Arc::new(SessionKeyStore::new(Arc::new(blue_ctx)));

        let writer: ReadWrite<Counter> = ReadWrite::open(white_store, "counter");
        let reader: ReadOnly<Counter> = ReadOnly::open(blue_store, "counter");
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        reader.subscribe(move |c| {
            let _ = tx.send(c.value);
        });
        let handle = reader.spawn_poller(Duration::from_secs(3600), Some(events));

        writer.publish(&Counter { value: 7, touched: 0 }).unwrap();
        let got = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
        assert_eq!(got, Some(7));
        handle.abort();
    }
}
