//! One backend shared by several browsing contexts
//!
//! Each participant page gets a [`StorageContext`]. Successful writes are
//! broadcast as [`StorageEvent`]s to every *other* context; the writing
//! context never hears its own changes.

use crate::backend::StorageBackend;
use crate::error::BackendError;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

const EVENT_CAPACITY: usize = 256;

/// Identity of a browsing context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(Uuid);

impl ContextId {
    /// Generate a fresh context id
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Change notification delivered to other contexts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    /// Key that changed
    pub key: String,
    /// New raw value, `None` after removal
    pub new_value: Option<String>,
    /// Writer
    pub origin: ContextId,
}

/// Backend shared by many contexts
#[derive(Clone)]
pub struct SharedStorage {
    backend: Arc<dyn StorageBackend>,
    events: broadcast::Sender<StorageEvent>,
}

impl SharedStorage {
    /// Share a backend
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { backend, events }
    }

    /// Open a new browsing context
    #[must_use]
    pub fn context(&self) -> StorageContext {
        StorageContext {
            id: ContextId::new(),
            backend: Arc::clone(&self.backend),
            events: self.events.clone(),
        }
    }
}

/// A single context's view of the shared backend
#[derive(Clone)]
pub struct StorageContext {
    id: ContextId,
    backend: Arc<dyn StorageBackend>,
    events: broadcast::Sender<StorageEvent>,
}

impl StorageContext {
    /// This context's id
    #[inline]
    #[must_use]
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Listen for changes made by other contexts
    #[must_use]
    pub fn subscribe(&self) -> StorageEvents {
        StorageEvents {
            me: self.id,
            rx: self.events.subscribe(),
        }
    }

    fn announce(&self, key: &str, new_value: Option<&str>) {
        // No receivers is fine: nobody is listening yet.
        let _ = self.events.send(StorageEvent {
            key: key.to_string(),
            new_value: new_value.map(str::to_string),
            origin: self.id,
        });
    }
}

impl StorageBackend for StorageContext {
    fn get(&self, key: &str) -> Option<String> {
        self.backend.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), BackendError> {
        self.backend.set(key, value)?;
        self.announce(key, Some(value));
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), BackendError> {
        self.backend.remove(key)?;
        self.announce(key, None);
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        self.backend.keys()
    }

    fn contains(&self, key: &str) -> bool {
        self.backend.contains(key)
    }
}

/// Stream of foreign storage changes
pub struct StorageEvents {
    me: ContextId,
    rx: broadcast::Receiver<StorageEvent>,
}

impl StorageEvents {
    /// Next change made by another context; `None` once the storage is gone
    pub async fn recv(&mut self) -> Option<StorageEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.origin == self.me => {}
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    trace!(skipped, "storage event receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`Self::recv`]
    pub fn try_recv(&mut self) -> Option<StorageEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if event.origin == self.me => {}
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => {}
                Err(_) => return None,
            }
        }
    }
}
