//! Shared fixtures for controller integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use vela_controller::{AppKey, AppParser, ApplyHandler, DefinitionRegistry};
use vela_core::{Application, Object, ObjectKey};
use vela_db_memory::InMemoryStore;
use vela_storage::{
    DynStore, EventedStore, ListParams, ListResult, ObjectStore, StorageError, StoredObject,
};
use vela_template::Renderer;

pub const SYSTEM_NAMESPACE: &str = "vela-system";

pub fn worker_definition() -> Value {
    json!({
        "apiVersion": "core.oam.dev/v1beta1",
        "kind": "ComponentDefinition",
        "metadata": {"name": "worker", "namespace": SYSTEM_NAMESPACE},
        "spec": {
            "workload": {"definition": {"apiVersion": "apps/v1", "kind": "Deployment"}},
            "schematic": {"template": {
                "parameter": {
                    "image": {"type": "string"},
                    "cmd": {"type": "array", "items": {"type": "string"}, "optional": true}
                },
                "output": {
                    "apiVersion": "apps/v1",
                    "kind": "Deployment",
                    "spec": {
                        "selector": {"matchLabels": {"app.oam.dev/component": "${context.name}"}},
                        "template": {
                            "metadata": {"labels": {"app.oam.dev/component": "${context.name}"}},
                            "spec": {"containers": [{
                                "name": "${context.name}",
                                "image": "${parameter.image}",
                                "command?": "${parameter.cmd}"
                            }]}
                        }
                    }
                }
            }}
        }
    })
}

pub fn scaler_definition() -> Value {
    json!({
        "apiVersion": "core.oam.dev/v1beta1",
        "kind": "TraitDefinition",
        "metadata": {"name": "scaler", "namespace": SYSTEM_NAMESPACE},
        "spec": {
            "appliesToWorkloads": ["deployments.apps"],
            "schematic": {"template": {
                "parameter": {"replicas": {"type": "integer", "default": 1}},
                "output": {
                    "apiVersion": "core.oam.dev/v1alpha2",
                    "kind": "ManualScalerTrait",
                    "spec": {"replicaCount": "${parameter.replicas}"}
                }
            }}
        }
    })
}

pub fn health_scope_definition() -> Value {
    json!({
        "apiVersion": "core.oam.dev/v1beta1",
        "kind": "ScopeDefinition",
        "metadata": {"name": "healthscopes.core.oam.dev", "namespace": SYSTEM_NAMESPACE},
        "spec": {
            "definitionRef": {"name": "healthscopes.core.oam.dev"},
            "reference": {"apiVersion": "core.oam.dev/v1alpha2", "kind": "HealthScope"},
            "workloadRefsPath": "spec.workloadRefs",
            "allowComponentOverlap": true
        }
    })
}

/// Worker whose auxiliary ConfigMap feeds health and status.
pub fn game_worker_definition() -> Value {
    json!({
        "apiVersion": "core.oam.dev/v1beta1",
        "kind": "ComponentDefinition",
        "metadata": {"name": "game-worker", "namespace": SYSTEM_NAMESPACE},
        "spec": {
            "status": {
                "healthPolicy": "isHealth: context.output.status.readyReplicas > 0 && context.outputs.gameconfig.data.lives == \"3\"",
                "customStatus": "message: \"type: \" + context.output.spec.template.spec.containers[0].image + \",\\t enemies:\" + context.outputs.gameconfig.data.enemies"
            },
            "schematic": {"template": {
                "parameter": {
                    "image": {"type": "string"},
                    "lives": {"type": "string"},
                    "enemies": {"type": "string"}
                },
                "output": {
                    "apiVersion": "apps/v1",
                    "kind": "Deployment",
                    "spec": {"template": {"spec": {"containers": [{
                        "name": "${context.name}",
                        "image": "${parameter.image}"
                    }]}}}
                },
                "outputs": {
                    "gameconfig": {
                        "apiVersion": "v1",
                        "kind": "ConfigMap",
                        "metadata": {"name": "${context.name}-game-config"},
                        "data": {"enemies": "${parameter.enemies}", "lives": "${parameter.lives}"}
                    }
                }
            }}
        }
    })
}

/// A store that broadcasts change events, plus its DynStore view.
pub fn evented_store() -> (Arc<EventedStore<InMemoryStore>>, DynStore) {
    let evented = Arc::new(EventedStore::new(InMemoryStore::new()));
    let store: DynStore = evented.clone();
    (evented, store)
}

pub async fn seed(store: &DynStore, objects: &[Value]) {
    for object in objects {
        store.create(object).await.unwrap();
    }
}

pub async fn handler(store: &DynStore) -> ApplyHandler {
    handler_with_registry(store).await.0
}

/// A handler plus the registry it parses with, for refresh tests.
pub async fn handler_with_registry(store: &DynStore) -> (ApplyHandler, Arc<DefinitionRegistry>) {
    let registry = Arc::new(DefinitionRegistry::new(SYSTEM_NAMESPACE));
    registry.refresh(store.as_ref()).await.unwrap();
    let renderer = Renderer::with_http(Duration::from_secs(5)).unwrap();
    let handler = ApplyHandler::new(store.clone(), AppParser::new(registry.clone(), renderer));
    (handler, registry)
}

/// In-memory store with switchable faults.
#[derive(Default)]
pub struct FaultyStore {
    inner: InMemoryStore,
    fail_create: Mutex<Option<String>>,
    edit_before_app_update: AtomicBool,
}

impl FaultyStore {
    /// Makes every create of `kind` fail until cleared with `None`.
    pub fn fail_creates_of(&self, kind: Option<&str>) {
        *self.fail_create.lock().unwrap() = kind.map(str::to_string);
    }

    /// Makes the next Application update lose to a concurrent edit.
    pub fn race_next_app_update(&self) {
        self.edit_before_app_update.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStore for FaultyStore {
    async fn get(&self, key: &ObjectKey) -> Result<Option<StoredObject>, StorageError> {
        self.inner.get(key).await
    }

    async fn list(&self, kind: &str, params: &ListParams) -> Result<ListResult, StorageError> {
        self.inner.list(kind, params).await
    }

    async fn create(&self, object: &Value) -> Result<StoredObject, StorageError> {
        let failing = self.fail_create.lock().unwrap().clone();
        if failing.is_some_and(|kind| object["kind"] == kind.as_str()) {
            return Err(StorageError::internal("injected create failure"));
        }
        self.inner.create(object).await
    }

    async fn update(
        &self,
        object: &Value,
        if_match: Option<&str>,
    ) -> Result<StoredObject, StorageError> {
        if object["kind"] == "Application" && self.edit_before_app_update.swap(false, Ordering::SeqCst)
        {
            let key = ObjectKey::from_value(object).unwrap();
            let mut current = self.inner.get(&key).await?.unwrap().object;
            current["metadata"]["annotations"]["edited-by"] = json!("someone-else");
            self.inner.update(&current, None).await?;
        }
        self.inner.update(object, if_match).await
    }

    async fn delete(
        &self,
        key: &ObjectKey,
        if_match: Option<&str>,
    ) -> Result<Vec<ObjectKey>, StorageError> {
        self.inner.delete(key, if_match).await
    }

    async fn collect_garbage(&self) -> Result<Vec<ObjectKey>, StorageError> {
        self.inner.collect_garbage().await
    }

    fn backend_name(&self) -> &'static str {
        "faulty-memory"
    }
}

pub fn faulty_store() -> (Arc<FaultyStore>, DynStore) {
    let faulty = Arc::new(FaultyStore::default());
    let store: DynStore = faulty.clone();
    (faulty, store)
}

pub fn app_key() -> AppKey {
    AppKey::new("default", "app")
}

pub async fn create_app(store: &DynStore, application: &Application) {
    store.create(&application.to_value().unwrap()).await.unwrap();
}

pub async fn load_app(store: &DynStore) -> Application {
    store
        .get(&app_key().object_key())
        .await
        .unwrap()
        .unwrap()
        .decode()
        .unwrap()
}

/// Replaces the Application spec, keeping metadata and status.
pub async fn update_app(store: &DynStore, edit: impl FnOnce(&mut Application)) {
    let mut application = load_app(store).await;
    edit(&mut application);
    store
        .update(&application.to_value().unwrap(), None)
        .await
        .unwrap();
}

pub async fn get_object(store: &DynStore, kind: &str, name: &str) -> Option<Value> {
    store
        .get(&ObjectKey::new(kind, "default", name))
        .await
        .unwrap()
        .map(|stored| stored.object)
}
