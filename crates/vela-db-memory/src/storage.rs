use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde_json::{Map, Value};
use vela_core::{ObjectKey, ObjectMeta};
use vela_storage::{StorageError, StoredObject};

/// A stored object together with its parsed metadata.
#[derive(Debug, Clone)]
pub(crate) struct Record {
    pub(crate) stored: StoredObject,
    pub(crate) meta: ObjectMeta,
}

/// In-memory object store backed by a sharded concurrent map.
///
/// This storage implementation provides:
/// - Atomic conditional writes (version check and write share a shard lock)
/// - Label and owner selectors for listing
/// - Owner-reference cascade deletion and orphan collection
#[derive(Debug)]
pub struct InMemoryStore {
    pub(crate) data: DashMap<ObjectKey, Record>,
    /// Atomic counter for generating resource versions
    pub(crate) version_counter: AtomicU64,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
            version_counter: AtomicU64::new(1),
        }
    }

    /// Generates the next resource version.
    pub(crate) fn next_version(&self) -> String {
        self.version_counter
            .fetch_add(1, Ordering::SeqCst)
            .to_string()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Keys of every object that lists `uid` as an owner.
    pub(crate) fn dependents_of(&self, uid: &str) -> Vec<ObjectKey> {
        self.data
            .iter()
            .filter(|r| r.meta.is_owned_by(uid))
            .map(|r| r.key().clone())
            .collect()
    }

    /// Removes the objects in `roots` and everything they transitively own.
    ///
    /// Returns removed keys in removal order.
    pub(crate) fn cascade_remove(&self, roots: Vec<(ObjectKey, String)>) -> Vec<ObjectKey> {
        let mut removed = Vec::new();
        let mut pending: Vec<String> = Vec::new();
        for (key, uid) in roots {
            removed.push(key);
            pending.push(uid);
        }
        while let Some(uid) = pending.pop() {
            for key in self.dependents_of(&uid) {
                if let Some((key, record)) = self.data.remove(&key) {
                    pending.push(record.stored.uid.clone());
                    removed.push(key);
                }
            }
        }
        removed
    }

    /// Uids of every stored object.
    pub(crate) fn live_uids(&self) -> HashSet<String> {
        self.data.iter().map(|r| r.stored.uid.clone()).collect()
    }
}

/// Parses the metadata block of a document being written.
pub(crate) fn parse_meta(object: &Value) -> Result<ObjectMeta, StorageError> {
    let meta = object.get("metadata").cloned().unwrap_or(Value::Null);
    serde_json::from_value(meta)
        .map_err(|e| StorageError::invalid_object(format!("invalid metadata: {e}")))
}

/// Writes store-assigned identity into the document's metadata block.
pub(crate) fn stamp_metadata(
    object: &mut Value,
    uid: &str,
    resource_version: &str,
    creation_timestamp: &str,
) -> Result<(), StorageError> {
    let root = object
        .as_object_mut()
        .ok_or_else(|| StorageError::invalid_object("object must be a JSON object"))?;
    let meta = root
        .entry("metadata")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| StorageError::invalid_object("metadata must be a JSON object"))?;
    meta.insert("uid".into(), Value::String(uid.to_string()));
    meta.insert(
        "resourceVersion".into(),
        Value::String(resource_version.to_string()),
    );
    meta.insert(
        "creationTimestamp".into(),
        Value::String(creation_timestamp.to_string()),
    );
    Ok(())
}
