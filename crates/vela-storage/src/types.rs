//! Storage types for the object store abstraction layer.
//!
//! This module defines all data types used by the storage traits.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use vela_core::{Object, ObjectKey, ObjectMeta};

use crate::error::StorageError;

/// An object as stored in the storage backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredObject {
    /// Kind, namespace and name.
    pub key: ObjectKey,
    /// Store-assigned unique id, stable for the object's lifetime.
    pub uid: String,
    /// Version token of this write; pass it back as `if_match`.
    pub resource_version: String,
    /// The full object document, including store-assigned metadata.
    pub object: Value,
    /// When this version was written.
    #[serde(with = "time::serde::rfc3339")]
    pub last_updated: OffsetDateTime,
    /// When the object was originally created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl StoredObject {
    /// Decodes the document into a typed view.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidObject` if the document does not match `T`.
    pub fn decode<T: Object>(&self) -> Result<T, StorageError> {
        Ok(T::from_value(self.object.clone())?)
    }

    /// Parsed `metadata` block.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidObject` if metadata is malformed.
    pub fn metadata(&self) -> Result<ObjectMeta, StorageError> {
        let meta = self.object.get("metadata").cloned().unwrap_or(Value::Null);
        serde_json::from_value(meta).map_err(|e| StorageError::invalid_object(e.to_string()))
    }

    /// Value under `spec`, or `Null` when absent.
    #[must_use]
    pub fn spec(&self) -> &Value {
        self.object.get("spec").unwrap_or(&Value::Null)
    }
}

/// Filters for list operations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListParams {
    /// Restrict to one namespace.
    pub namespace: Option<String>,
    /// Equality label selector; every entry must match.
    pub labels: BTreeMap<String, String>,
    /// Restrict to objects that carry an owner reference with this uid.
    pub owner_uid: Option<String>,
    /// Maximum number of results.
    pub limit: Option<usize>,
}

impl ListParams {
    /// Creates empty list parameters (match everything).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts to a namespace.
    #[must_use]
    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Adds an equality label requirement.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Restricts to objects owned by `uid`.
    #[must_use]
    pub fn owned_by(mut self, uid: impl Into<String>) -> Self {
        self.owner_uid = Some(uid.into());
        self
    }

    /// Sets the result limit.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns true if `meta` satisfies every filter except `limit`.
    #[must_use]
    pub fn matches(&self, meta: &ObjectMeta) -> bool {
        if let Some(ns) = &self.namespace {
            if &meta.namespace != ns {
                return false;
            }
        }
        if let Some(uid) = &self.owner_uid {
            if !meta.is_owned_by(uid) {
                return false;
            }
        }
        self.labels
            .iter()
            .all(|(k, v)| meta.labels.get(k).is_some_and(|actual| actual == v))
    }
}

/// Result of a list operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListResult {
    /// The matching objects, ordered by namespace then name.
    pub entries: Vec<StoredObject>,
    /// Whether `limit` cut the result short.
    pub has_more: bool,
}

impl ListResult {
    /// Creates a new `ListResult` with entries.
    #[must_use]
    pub fn with_entries(entries: Vec<StoredObject>) -> Self {
        Self {
            entries,
            has_more: false,
        }
    }

    /// Returns the number of entries in this result.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
