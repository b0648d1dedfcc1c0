//! Storage traits for the object store abstraction layer.
//!
//! This module defines the core trait that all storage backends must implement.

use async_trait::async_trait;
use serde_json::Value;
use vela_core::ObjectKey;

use crate::error::StorageError;
use crate::types::{ListParams, ListResult, StoredObject};

/// The object store every backend implements.
///
/// Writes are optimistic: `update` and `delete` take the version token the
/// caller last read and reject the write if the stored version moved on.
/// Implementations must be thread-safe (`Send + Sync`) and give strong
/// read-after-write consistency for a single object.
///
/// # Example
///
/// ```ignore
/// use vela_storage::{ObjectStore, StorageError};
///
/// async fn bump(store: &dyn ObjectStore, key: &ObjectKey) -> Result<(), StorageError> {
///     let current = store
///         .get(key)
///         .await?
///         .ok_or_else(|| StorageError::not_found(key.clone()))?;
///     let mut object = current.object.clone();
///     object["spec"]["replicas"] = 3.into();
///     store.update(&object, Some(&current.resource_version)).await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Reads an object by key.
    ///
    /// Returns `None` if the object does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure issues, not for missing objects.
    async fn get(&self, key: &ObjectKey) -> Result<Option<StoredObject>, StorageError>;

    /// Lists objects of one kind matching `params`.
    ///
    /// # Errors
    ///
    /// Returns an error for infrastructure issues.
    async fn list(&self, kind: &str, params: &ListParams) -> Result<ListResult, StorageError>;

    /// Creates a new object.
    ///
    /// The document must carry `kind` and `metadata.name`. The store assigns
    /// `metadata.uid`, `metadata.resourceVersion` and `metadata.creationTimestamp`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::AlreadyExists` if an object with the same key exists.
    /// Returns `StorageError::InvalidObject` if the document is malformed.
    async fn create(&self, object: &Value) -> Result<StoredObject, StorageError>;

    /// Replaces an existing object.
    ///
    /// If `if_match` is provided, the update only succeeds when the stored
    /// version equals it. Identity fields (`uid`, `creationTimestamp`) are
    /// preserved from the stored object.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the object does not exist.
    /// Returns `StorageError::VersionConflict` if `if_match` doesn't match.
    /// Returns `StorageError::InvalidObject` if the document is malformed.
    async fn update(
        &self,
        object: &Value,
        if_match: Option<&str>,
    ) -> Result<StoredObject, StorageError>;

    /// Deletes an object and, transitively, every object that names it as
    /// owner.
    ///
    /// Returns the keys of all deleted objects, the requested one first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the object does not exist.
    /// Returns `StorageError::VersionConflict` if `if_match` doesn't match.
    async fn delete(
        &self,
        key: &ObjectKey,
        if_match: Option<&str>,
    ) -> Result<Vec<ObjectKey>, StorageError>;

    /// Deletes objects whose owners no longer exist.
    ///
    /// Returns the keys of the collected objects.
    ///
    /// # Errors
    ///
    /// Returns an error for infrastructure issues.
    async fn collect_garbage(&self) -> Result<Vec<ObjectKey>, StorageError>;

    /// Returns the name of this storage backend for logging.
    fn backend_name(&self) -> &'static str;
}
