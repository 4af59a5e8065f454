//! Optional remote document store with local fallback
//!
//! A [`RemoteStore`] persists documents by collection and id. The
//! [`FallbackStore`] wraps one and never lets a remote failure reach the
//! caller: saves and loads fall back to the local key `<collection>_<id>`,
//! `add` yields `None` and `query` an empty list.

use crate::error::RemoteError;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;
use wargame_store::SessionKeyStore;

/// Comparison used in a query condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    /// `==`
    #[serde(rename = "==")]
    Eq,
    /// `!=`
    #[serde(rename = "!=")]
    Ne,
    /// `<`
    #[serde(rename = "<")]
    Lt,
    /// `<=`
    #[serde(rename = "<=")]
    Le,
    /// `>`
    #[serde(rename = ">")]
    Gt,
    /// `>=`
    #[serde(rename = ">=")]
    Ge,
}

/// One `field op value` filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Document field
    pub field: String,
    /// Comparison
    pub operator: Operator,
    /// Right-hand side
    pub value: Value,
}

impl Condition {
    /// Equality filter
    #[must_use]
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator: Operator::Eq,
            value: value.into(),
        }
    }

    /// Whether a document satisfies the filter
    #[must_use]
    pub fn matches(&self, document: &Map<String, Value>) -> bool {
        let Some(actual) = document.get(&self.field) else {
            return false;
        };
        match self.operator {
            Operator::Eq => actual == &self.value,
            Operator::Ne => actual != &self.value,
            op => match (compare(actual, &self.value), op) {
                (Some(ord), Operator::Lt) => ord.is_lt(),
                (Some(ord), Operator::Le) => ord.is_le(),
                (Some(ord), Operator::Gt) => ord.is_gt(),
                (Some(ord), Operator::Ge) => ord.is_ge(),
                _ => false,
            },
        }
    }
}

fn compare(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Document returned by a query
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Document id
    pub id: String,
    /// Stored fields
    pub data: Map<String, Value>,
}

/// Remote document persistence
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Create or replace a document
    async fn save(&self, collection: &str, id: &str, data: &Value) -> Result<(), RemoteError>;

    /// Fetch a document
    async fn load(&self, collection: &str, id: &str) -> Result<Option<Value>, RemoteError>;

    /// Add a document with a generated id
    async fn add(&self, collection: &str, data: &Value) -> Result<String, RemoteError>;

    /// Documents matching every condition
    async fn query(&self, collection: &str, conditions: &[Condition]) -> Result<Vec<Document>, RemoteError>;
}

/// Remote wrapper that downgrades every failure to local storage
pub struct FallbackStore {
    remote: Arc<dyn RemoteStore>,
    local: Arc<SessionKeyStore>,
}

impl FallbackStore {
    /// Wrap `remote`, falling back to `local`
    #[must_use]
    pub fn new(remote: Arc<dyn RemoteStore>, local: Arc<SessionKeyStore>) -> Self {
        Self { remote, local }
    }

    /// Local fallback key
    #[must_use]
    pub fn local_key(collection: &str, id: &str) -> String {
        format!("{collection}_{id}")
    }

    /// Save remotely; on failure write the local key. Returns whether the remote accepted it.
    pub async fn save(&self, collection: &str, id: &str, data: &Value) -> bool {
        match self.remote.save(collection, id, data).await {
            Ok(()) => {
                debug!(collection, id, "saved remote document");
                true
            }
            Err(e) => {
                warn!(collection, id, error = %e, "remote save failed, keeping local copy");
                self.local.set(&Self::local_key(collection, id), data);
                false
            }
        }
    }

    /// Load remotely; when absent or failing, read the local key
    pub async fn load(&self, collection: &str, id: &str) -> Option<Value> {
        match self.remote.load(collection, id).await {
            Ok(Some(value)) => Some(value),
            Ok(None) => {
                debug!(collection, id, "no remote document, checking local copy");
                self.local.get_value(&Self::local_key(collection, id))
            }
            Err(e) => {
                warn!(collection, id, error = %e, "remote load failed, using local copy");
                self.local.get_value(&Self::local_key(collection, id))
            }
        }
    }

    /// Add remotely; `None` on failure
    pub async fn add(&self, collection: &str, data: &Value) -> Option<String> {
        match self.remote.add(collection, data).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(collection, error = %e, "remote add failed");
                None
            }
        }
    }

    /// Query remotely; empty on failure
    pub async fn query(&self, collection: &str, conditions: &[Condition]) -> Vec<Document> {
        match self.remote.query(collection, conditions).await {
            Ok(documents) => documents,
            Err(e) => {
                warn!(collection, error = %e, "remote query failed");
                Vec::new()
            }
        }
    }
}

/// In-process remote, optionally forced offline
#[derive(Debug, Default)]
pub struct MemoryRemote {
    documents: DashMap<(String, String), Map<String, Value>>,
    offline: AtomicBool,
}

impl MemoryRemote {
    /// Empty, online
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage (or recovery)
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of stored documents
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Whether nothing is stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    fn check(&self) -> Result<(), RemoteError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(RemoteError::Unavailable("memory remote is offline".into()))
        } else {
            Ok(())
        }
    }

    fn object(data: &Value) -> Map<String, Value> {
        match data {
            Value::Object(map) => map.clone(),
            other => {
                let mut map = Map::new();
                map.insert("value".into(), other.clone());
                map
            }
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn save(&self, collection: &str, id: &str, data: &Value) -> Result<(), RemoteError> {
        self.check()?;
        self.documents
            .insert((collection.to_string(), id.to_string()), Self::object(data));
        Ok(())
    }

    async fn load(&self, collection: &str, id: &str) -> Result<Option<Value>, RemoteError> {
        self.check()?;
        Ok(self
            .documents
            .get(&(collection.to_string(), id.to_string()))
            .map(|doc| Value::Object(doc.clone())))
    }

    async fn add(&self, collection: &str, data: &Value) -> Result<String, RemoteError> {
        self.check()?;
        let id = Uuid::new_v4().simple().to_string();
        self.documents
            .insert((collection.to_string(), id.clone()), Self::object(data));
        Ok(id)
    }

    async fn query(&self, collection: &str, conditions: &[Condition]) -> Result<Vec<Document>, RemoteError> {
        self.check()?;
        let mut found: Vec<Document> = self
            .documents
            .iter()
            .filter(|entry| entry.key().0 == collection)
            .filter(|entry| conditions.iter().all(|c| c.matches(entry.value())))
            .map(|entry| Document {
                id: entry.key().1.clone(),
                data: entry.value().clone(),
            })
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }
}
