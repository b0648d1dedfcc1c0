//! EventedStore - a store wrapper that emits watch events after writes.
//!
//! This wrapper delegates all operations to an inner store while publishing
//! a [`WatchEvent`] on a broadcast channel after each successful write.
//! Events are emitted only after the write succeeded, so every event
//! corresponds to a durable change.
//!
//! # Example
//!
//! ```ignore
//! use vela_storage::EventedStore;
//!
//! let store = EventedStore::new(InMemoryStore::new());
//! let mut events = store.subscribe();
//!
//! store.create(&application_json).await?;
//! let event = events.recv().await?;
//! ```

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;
use vela_core::{ObjectKey, ObjectMeta};

use crate::error::StorageError;
use crate::traits::ObjectStore;
use crate::types::{ListParams, ListResult, StoredObject};

/// Default buffer size for the broadcast channel.
/// Slow receivers lose the oldest events beyond this limit.
const DEFAULT_BUFFER_SIZE: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    Created,
    Updated,
    Deleted,
}

/// A change to one stored object.
#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub key: ObjectKey,
    /// Metadata after the change, or at deletion time.
    pub metadata: ObjectMeta,
}

/// A store wrapper that emits events after successful writes.
pub struct EventedStore<S: ObjectStore> {
    inner: S,
    sender: broadcast::Sender<WatchEvent>,
}

impl<S: ObjectStore> EventedStore<S> {
    /// Create a new evented store wrapper.
    pub fn new(inner: S) -> Self {
        let (sender, _) = broadcast::channel(DEFAULT_BUFFER_SIZE);
        Self { inner, sender }
    }

    /// Get a reference to the inner store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Subscribe to future events.
    pub fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.sender.subscribe()
    }

    fn emit(&self, kind: WatchEventKind, key: ObjectKey, metadata: ObjectMeta) {
        if self.sender.receiver_count() == 0 {
            return;
        }
        debug!(object = %key, event = ?kind, "Emitted watch event");
        let _ = self.sender.send(WatchEvent {
            kind,
            key,
            metadata,
        });
    }

    fn emit_stored(&self, kind: WatchEventKind, stored: &StoredObject) {
        let metadata = stored.metadata().unwrap_or_default();
        self.emit(kind, stored.key.clone(), metadata);
    }
}

#[async_trait]
impl<S: ObjectStore> ObjectStore for EventedStore<S> {
    async fn get(&self, key: &ObjectKey) -> Result<Option<StoredObject>, StorageError> {
        self.inner.get(key).await
    }

    async fn list(&self, kind: &str, params: &ListParams) -> Result<ListResult, StorageError> {
        self.inner.list(kind, params).await
    }

    async fn create(&self, object: &Value) -> Result<StoredObject, StorageError> {
        let stored = self.inner.create(object).await?;
        self.emit_stored(WatchEventKind::Created, &stored);
        Ok(stored)
    }

    async fn update(
        &self,
        object: &Value,
        if_match: Option<&str>,
    ) -> Result<StoredObject, StorageError> {
        let stored = self.inner.update(object, if_match).await?;
        self.emit_stored(WatchEventKind::Updated, &stored);
        Ok(stored)
    }

    async fn delete(
        &self,
        key: &ObjectKey,
        if_match: Option<&str>,
    ) -> Result<Vec<ObjectKey>, StorageError> {
        // Owner references must be captured before the object disappears so
        // watchers can map a deleted dependent back to its owner.
        let metadata = match self.inner.get(key).await? {
            Some(stored) => stored.metadata().unwrap_or_default(),
            None => ObjectMeta::default(),
        };
        let deleted = self.inner.delete(key, if_match).await?;
        for k in &deleted {
            let meta = if k == key {
                metadata.clone()
            } else {
                ObjectMeta::new(k.name.clone(), k.namespace.clone())
            };
            self.emit(WatchEventKind::Deleted, k.clone(), meta);
        }
        Ok(deleted)
    }

    async fn collect_garbage(&self) -> Result<Vec<ObjectKey>, StorageError> {
        let collected = self.inner.collect_garbage().await?;
        for k in &collected {
            self.emit(
                WatchEventKind::Deleted,
                k.clone(),
                ObjectMeta::new(k.name.clone(), k.namespace.clone()),
            );
        }
        Ok(collected)
    }

    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }
}
