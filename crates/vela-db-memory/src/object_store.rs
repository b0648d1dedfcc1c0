//! Implementation of the ObjectStore trait for InMemoryStore.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use serde_json::Value;
use time::OffsetDateTime;
use vela_core::{ObjectKey, generate_uid, validate_name};
use vela_storage::{ListParams, ListResult, ObjectStore, StorageError, StoredObject};

use crate::storage::{InMemoryStore, Record, parse_meta, stamp_metadata};

fn format_timestamp(at: OffsetDateTime) -> Result<String, StorageError> {
    vela_core::time::format_rfc3339(at).map_err(|e| StorageError::internal(e.to_string()))
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn get(&self, key: &ObjectKey) -> Result<Option<StoredObject>, StorageError> {
        Ok(self.data.get(key).map(|r| r.stored.clone()))
    }

    async fn list(&self, kind: &str, params: &ListParams) -> Result<ListResult, StorageError> {
        let mut entries: Vec<StoredObject> = self
            .data
            .iter()
            .filter(|r| r.key().kind == kind && params.matches(&r.meta))
            .map(|r| r.stored.clone())
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));

        let mut has_more = false;
        if let Some(limit) = params.limit {
            has_more = entries.len() > limit;
            entries.truncate(limit);
        }
        Ok(ListResult { entries, has_more })
    }

    async fn create(&self, object: &Value) -> Result<StoredObject, StorageError> {
        let key = ObjectKey::from_value(object)?;
        validate_name(&key.name)?;

        let uid = generate_uid();
        let resource_version = self.next_version();
        let now = OffsetDateTime::now_utc();

        let mut object = object.clone();
        stamp_metadata(&mut object, &uid, &resource_version, &format_timestamp(now)?)?;
        let meta = parse_meta(&object)?;

        match self.data.entry(key.clone()) {
            Entry::Occupied(_) => Err(StorageError::already_exists(key)),
            Entry::Vacant(slot) => {
                let stored = StoredObject {
                    key,
                    uid,
                    resource_version,
                    object,
                    last_updated: now,
                    created_at: now,
                };
                slot.insert(Record {
                    stored: stored.clone(),
                    meta,
                });
                Ok(stored)
            }
        }
    }

    async fn update(
        &self,
        object: &Value,
        if_match: Option<&str>,
    ) -> Result<StoredObject, StorageError> {
        let key = ObjectKey::from_value(object)?;

        match self.data.entry(key.clone()) {
            Entry::Vacant(_) => Err(StorageError::not_found(key)),
            Entry::Occupied(mut slot) => {
                let current = &slot.get().stored;
                if let Some(expected) = if_match {
                    if current.resource_version != expected {
                        return Err(StorageError::version_conflict(
                            expected,
                            current.resource_version.clone(),
                        ));
                    }
                }

                let resource_version = self.next_version();
                let mut object = object.clone();
                stamp_metadata(
                    &mut object,
                    &current.uid,
                    &resource_version,
                    &format_timestamp(current.created_at)?,
                )?;
                let meta = parse_meta(&object)?;
                let stored = StoredObject {
                    key,
                    uid: current.uid.clone(),
                    resource_version,
                    object,
                    last_updated: OffsetDateTime::now_utc(),
                    created_at: current.created_at,
                };
                slot.insert(Record {
                    stored: stored.clone(),
                    meta,
                });
                Ok(stored)
            }
        }
    }

    async fn delete(
        &self,
        key: &ObjectKey,
        if_match: Option<&str>,
    ) -> Result<Vec<ObjectKey>, StorageError> {
        // The entry guard must be released before the cascade walks the map.
        let removed = match self.data.entry(key.clone()) {
            Entry::Vacant(_) => return Err(StorageError::not_found(key.clone())),
            Entry::Occupied(slot) => {
                if let Some(expected) = if_match {
                    let actual = &slot.get().stored.resource_version;
                    if actual != expected {
                        return Err(StorageError::version_conflict(expected, actual.clone()));
                    }
                }
                slot.remove()
            }
        };

        let deleted = self.cascade_remove(vec![(key.clone(), removed.stored.uid)]);
        if deleted.len() > 1 {
            tracing::debug!(
                object = %key,
                dependents = deleted.len() - 1,
                "Cascade deleted dependents"
            );
        }
        Ok(deleted)
    }

    async fn collect_garbage(&self) -> Result<Vec<ObjectKey>, StorageError> {
        let live = self.live_uids();
        let orphans: Vec<ObjectKey> = self
            .data
            .iter()
            .filter(|r| {
                !r.meta.owner_references.is_empty()
                    && r.meta.owner_references.iter().all(|o| !live.contains(&o.uid))
            })
            .map(|r| r.key().clone())
            .collect();

        let mut roots = Vec::new();
        for key in orphans {
            if let Some((key, record)) = self.data.remove(&key) {
                roots.push((key, record.stored.uid));
            }
        }
        let collected = self.cascade_remove(roots);
        if !collected.is_empty() {
            tracing::info!(collected = collected.len(), "Garbage collected orphaned objects");
        }
        Ok(collected)
    }

    fn backend_name(&self) -> &'static str {
        "in-memory-dashmap"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn as_object_store(storage: &InMemoryStore) -> &dyn ObjectStore {
        storage
    }

    fn app(name: &str) -> Value {
        json!({
            "apiVersion": "core.oam.dev/v1beta1",
            "kind": "Application",
            "metadata": {"name": name, "namespace": "default"},
            "spec": {"components": []}
        })
    }

    fn owned(kind: &str, name: &str, owner: &StoredObject) -> Value {
        json!({
            "kind": kind,
            "metadata": {
                "name": name,
                "namespace": "default",
                "labels": {"app.oam.dev/name": owner.key.name},
                "ownerReferences": [{
                    "apiVersion": "core.oam.dev/v1beta1",
                    "kind": owner.key.kind,
                    "name": owner.key.name,
                    "uid": owner.uid,
                    "controller": true
                }]
            }
        })
    }

    #[tokio::test]
    async fn test_create_get() {
        let storage = InMemoryStore::new();
        let store = as_object_store(&storage);

        let created = store.create(&app("demo")).await.unwrap();
        assert!(!created.uid.is_empty());
        assert_eq!(created.object["metadata"]["uid"], json!(created.uid));
        assert_eq!(
            created.object["metadata"]["resourceVersion"],
            json!(created.resource_version)
        );

        let read = store.get(&created.key).await.unwrap().unwrap();
        assert_eq!(read.resource_version, created.resource_version);

        let missing = ObjectKey::new("Application", "default", "other");
        assert!(store.get(&missing).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_duplicate_and_invalid() {
        let storage = InMemoryStore::new();
        let store = as_object_store(&storage);

        store.create(&app("demo")).await.unwrap();
        let err = store.create(&app("demo")).await.unwrap_err();
        assert!(err.is_already_exists());

        let err = store.create(&app("Not_Valid")).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidObject { .. }));

        let err = store.create(&json!({"metadata": {"name": "x"}})).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidObject { .. }));
    }

    #[tokio::test]
    async fn test_conditional_update() {
        let storage = InMemoryStore::new();
        let store = as_object_store(&storage);

        let created = store.create(&app("demo")).await.unwrap();
        let mut next = created.object.clone();
        next["spec"]["components"] = json!([{"name": "web", "type": "worker"}]);

        let updated = store
            .update(&next, Some(&created.resource_version))
            .await
            .unwrap();
        assert_ne!(updated.resource_version, created.resource_version);
        assert_eq!(updated.uid, created.uid);

        // Stale version is rejected.
        let err = store
            .update(&next, Some(&created.resource_version))
            .await
            .unwrap_err();
        assert!(err.is_version_conflict());

        // Unconditional update always wins.
        assert!(store.update(&next, None).await.is_ok());

        let err = store.update(&app("ghost"), None).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_concurrent_conditional_updates_single_winner() {
        let storage = Arc::new(InMemoryStore::new());
        let created = storage.create(&app("race")).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..16 {
            let storage = storage.clone();
            let mut object = created.object.clone();
            let version = created.resource_version.clone();
            handles.push(tokio::spawn(async move {
                object["spec"]["writer"] = json!(i);
                storage.update(&object, Some(&version)).await.is_ok()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_list_with_selectors() {
        let storage = InMemoryStore::new();
        let store = as_object_store(&storage);

        let a = store.create(&app("a")).await.unwrap();
        let b = store.create(&app("b")).await.unwrap();
        store.create(&owned("Component", "a-web", &a)).await.unwrap();
        store.create(&owned("Component", "a-db", &a)).await.unwrap();
        store.create(&owned("Component", "b-web", &b)).await.unwrap();

        let all = store.list("Component", &ListParams::new()).await.unwrap();
        assert_eq!(all.len(), 3);

        let of_a = store
            .list("Component", &ListParams::new().with_label("app.oam.dev/name", "a"))
            .await
            .unwrap();
        let names: Vec<_> = of_a.entries.iter().map(|e| e.key.name.as_str()).collect();
        assert_eq!(names, vec!["a-db", "a-web"]);

        let owned_by_b = store
            .list("Component", &ListParams::new().owned_by(b.uid.clone()))
            .await
            .unwrap();
        assert_eq!(owned_by_b.len(), 1);

        let limited = store
            .list("Component", &ListParams::new().with_limit(2))
            .await
            .unwrap();
        assert_eq!(limited.len(), 2);
        assert!(limited.has_more);
    }

    #[tokio::test]
    async fn test_delete_cascades_to_dependents() {
        let storage = InMemoryStore::new();
        let store = as_object_store(&storage);

        let owner = store.create(&app("demo")).await.unwrap();
        let comp = store.create(&owned("Component", "web", &owner)).await.unwrap();
        store
            .create(&owned("ComponentRevision", "web-v1", &comp))
            .await
            .unwrap();
        store.create(&app("other")).await.unwrap();

        let deleted = store.delete(&owner.key, None).await.unwrap();
        assert_eq!(deleted.len(), 3);
        assert_eq!(deleted[0], owner.key);
        assert_eq!(storage.len(), 1);

        let err = store.delete(&owner.key, None).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_checks_version() {
        let storage = InMemoryStore::new();
        let store = as_object_store(&storage);

        let created = store.create(&app("demo")).await.unwrap();
        let err = store.delete(&created.key, Some("0")).await.unwrap_err();
        assert!(err.is_version_conflict());
        assert!(store
            .delete(&created.key, Some(&created.resource_version))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_collect_garbage_removes_orphans() {
        let storage = InMemoryStore::new();
        let store = as_object_store(&storage);

        let owner = store.create(&app("demo")).await.unwrap();
        store.create(&owned("Component", "web", &owner)).await.unwrap();

        // Orphan: owner uid that never existed.
        let mut ghost = owner.clone();
        ghost.uid = "missing-uid".into();
        store.create(&owned("Component", "stray", &ghost)).await.unwrap();

        let collected = store.collect_garbage().await.unwrap();
        assert_eq!(collected, vec![ObjectKey::new("Component", "default", "stray")]);
        assert_eq!(storage.len(), 2);
        assert_eq!(store.backend_name(), "in-memory-dashmap");
    }
}
