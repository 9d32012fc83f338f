//! Namespaced long-term memory store
//!
//! The store holds memories that outlive a single thread: user preferences,
//! profiles, content calendars. Records are addressed by a [`Namespace`]
//! (a tuple of string segments) and a key inside it.
//!
//! # Operations
//!
//! | Operation | Semantics |
//! |-----------|-----------|
//! | `get` | current [`Item`] or `None` |
//! | `put` | insert or overwrite, keeps `created_at` |
//! | `delete` | remove, reports whether it existed |
//! | `search` | every item whose namespace starts with the given segments, ordered by (namespace, key) |
//! | `get_or_default` | atomic read-through-init |
//! | `patch` | atomic recursive object merge, unspecified fields preserved |
//! | `list_namespaces` | known namespaces under a prefix |
//!
//! # Concurrency
//!
//! [`InMemoryStore`] shards by namespace. A short-lived index lock maps a
//! namespace to its shard; the shard itself sits behind an async mutex, so
//! read-modify-write operations on one namespace are serialized while
//! distinct namespaces never contend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised by store backends
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Key '{key}' not found in namespace {namespace}")]
    KeyNotFound { namespace: Namespace, key: String },

    #[error("Invalid namespace: {0}")]
    InvalidNamespace(String),

    #[error("Invalid patch: {0}")]
    InvalidPatch(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Hierarchical address of a memory region
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Namespace(Vec<String>);

impl Namespace {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Namespace one level deeper
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    /// Segment-wise prefix test
    pub fn starts_with(&self, prefix: &Namespace) -> bool {
        self.0.starts_with(&prefix.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn validate(&self) -> Result<()> {
        if self.0.is_empty() {
            return Err(StoreError::InvalidNamespace("namespace is empty".to_string()));
        }
        if self.0.iter().any(|segment| segment.is_empty()) {
            return Err(StoreError::InvalidNamespace(format!(
                "namespace {self} contains an empty segment"
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.0.join(", "))
    }
}

impl<S: Into<String>, const N: usize> From<[S; N]> for Namespace {
    fn from(segments: [S; N]) -> Self {
        Namespace::new(segments)
    }
}

/// A stored memory record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub namespace: Namespace,
    pub key: String,
    pub value: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Item {
    fn new(namespace: Namespace, key: String, value: Value) -> Self {
        let now = Utc::now();
        Self {
            namespace,
            key,
            value,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Recursive object merge: object fields merge, everything else replaces
///
/// A `null` in the patch removes the field from the target object.
pub fn merge_patch(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                if value.is_null() {
                    target.remove(key);
                } else if let Some(existing) = target.get_mut(key) {
                    merge_patch(existing, value);
                } else {
                    target.insert(key.clone(), value.clone());
                }
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

/// Namespaced key-value memory
#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, namespace: &Namespace, key: &str) -> Result<Option<Item>>;

    async fn put(&self, namespace: &Namespace, key: &str, value: Value) -> Result<Item>;

    async fn delete(&self, namespace: &Namespace, key: &str) -> Result<bool>;

    /// Items under a namespace prefix, ordered by (namespace, key)
    async fn search(&self, prefix: &Namespace) -> Result<Vec<Item>>;

    /// Stored value, or store `default` and return it
    async fn get_or_default(&self, namespace: &Namespace, key: &str, default: Value)
        -> Result<Value>;

    /// Merge `patch` into an existing object record
    async fn patch(&self, namespace: &Namespace, key: &str, patch: Value) -> Result<Item>;

    async fn list_namespaces(&self, prefix: Option<&Namespace>) -> Result<Vec<Namespace>>;
}

type Shard = Arc<Mutex<BTreeMap<String, Item>>>;

/// In-memory [`Store`] sharded per namespace
#[derive(Clone, Default)]
pub struct InMemoryStore {
    shards: Arc<parking_lot::RwLock<BTreeMap<Namespace, Shard>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from a [`snapshot`](Self::snapshot)
    pub fn from_items(items: impl IntoIterator<Item = Item>) -> Self {
        let mut shards: BTreeMap<Namespace, BTreeMap<String, Item>> = BTreeMap::new();
        for item in items {
            shards
                .entry(item.namespace.clone())
                .or_default()
                .insert(item.key.clone(), item);
        }
        let shards = shards
            .into_iter()
            .map(|(namespace, items)| (namespace, Arc::new(Mutex::new(items))))
            .collect();
        Self {
            shards: Arc::new(parking_lot::RwLock::new(shards)),
        }
    }

    /// Every item, ordered by (namespace, key)
    pub async fn snapshot(&self) -> Vec<Item> {
        let shards: Vec<Shard> = self.shards.read().values().cloned().collect();
        let mut items = Vec::new();
        for shard in shards {
            items.extend(shard.lock().await.values().cloned());
        }
        items
    }

    fn shard(&self, namespace: &Namespace) -> Option<Shard> {
        self.shards.read().get(namespace).cloned()
    }

    fn shard_or_create(&self, namespace: &Namespace) -> Shard {
        if let Some(shard) = self.shard(namespace) {
            return shard;
        }
        self.shards
            .write()
            .entry(namespace.clone())
            .or_default()
            .clone()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get(&self, namespace: &Namespace, key: &str) -> Result<Option<Item>> {
        namespace.validate()?;
        match self.shard(namespace) {
            Some(shard) => Ok(shard.lock().await.get(key).cloned()),
            None => Ok(None),
        }
    }

    async fn put(&self, namespace: &Namespace, key: &str, value: Value) -> Result<Item> {
        namespace.validate()?;
        let shard = self.shard_or_create(namespace);
        let mut items = shard.lock().await;
        let item = match items.get(key) {
            Some(existing) => Item {
                value,
                updated_at: Utc::now(),
                ..existing.clone()
            },
            None => Item::new(namespace.clone(), key.to_string(), value),
        };
        items.insert(key.to_string(), item.clone());
        Ok(item)
    }

    async fn delete(&self, namespace: &Namespace, key: &str) -> Result<bool> {
        namespace.validate()?;
        match self.shard(namespace) {
            Some(shard) => Ok(shard.lock().await.remove(key).is_some()),
            None => Ok(false),
        }
    }

    async fn search(&self, prefix: &Namespace) -> Result<Vec<Item>> {
        let shards: Vec<Shard> = self
            .shards
            .read()
            .iter()
            .filter(|(namespace, _)| namespace.starts_with(prefix))
            .map(|(_, shard)| shard.clone())
            .collect();

        let mut items = Vec::new();
        for shard in shards {
            items.extend(shard.lock().await.values().cloned());
        }
        Ok(items)
    }

    async fn get_or_default(
        &self,
        namespace: &Namespace,
        key: &str,
        default: Value,
    ) -> Result<Value> {
        namespace.validate()?;
        let shard = self.shard_or_create(namespace);
        let mut items = shard.lock().await;
        let item = items
            .entry(key.to_string())
            .or_insert_with(|| Item::new(namespace.clone(), key.to_string(), default));
        Ok(item.value.clone())
    }

    async fn patch(&self, namespace: &Namespace, key: &str, patch: Value) -> Result<Item> {
        namespace.validate()?;
        if !patch.is_object() {
            return Err(StoreError::InvalidPatch(format!(
                "patch for '{key}' must be a JSON object"
            )));
        }
        let not_found = || StoreError::KeyNotFound {
            namespace: namespace.clone(),
            key: key.to_string(),
        };

        let shard = self.shard(namespace).ok_or_else(not_found)?;
        let mut items = shard.lock().await;
        let item = items.get_mut(key).ok_or_else(not_found)?;
        if !item.value.is_object() {
            return Err(StoreError::InvalidPatch(format!(
                "record '{key}' is not an object and cannot be patched"
            )));
        }
        merge_patch(&mut item.value, &patch);
        item.updated_at = Utc::now();
        Ok(item.clone())
    }

    async fn list_namespaces(&self, prefix: Option<&Namespace>) -> Result<Vec<Namespace>> {
        Ok(self
            .shards
            .read()
            .keys()
            .filter(|namespace| prefix.map_or(true, |p| namespace.starts_with(p)))
            .cloned()
            .collect())
    }
}
