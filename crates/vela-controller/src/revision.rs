//! Revision engine: content hashing and ApplicationRevision lineage.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info};
use vela_core::canonical::{content_equal, content_hash};
use vela_core::oam::{kind, label};
use vela_core::{
    Application, ApplicationConfiguration, ApplicationRevision, ApplicationRevisionSpec,
    Definition, LatestRevision, Object, ObjectKey, ObjectMeta, extract_revision, revision_name,
};
use vela_storage::{ListParams, ObjectStore, StorageError};

use crate::appfile::AppFile;
use crate::configuration::owned_meta;
use crate::error::ControllerError;

/// Where the Application stands relative to its latest revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevisionState {
    /// No revision has been recorded yet.
    NoRevision,
    /// The latest revision matches the current inputs.
    Stable,
    /// The inputs changed since the latest revision.
    PendingNewRevision,
}

/// Result of the revision step of a pass.
#[derive(Debug, Clone)]
pub struct RevisionDecision {
    pub state: RevisionState,
    pub revision: ApplicationRevision,
    pub hash: String,
    /// `true` when this pass wrote the revision object.
    pub created: bool,
}

impl RevisionDecision {
    pub fn name(&self) -> &str {
        &self.revision.metadata.name
    }

    pub fn latest(&self) -> LatestRevision {
        LatestRevision {
            name: self.revision.metadata.name.clone(),
            revision: self.revision.spec.revision,
            revision_hash: self.hash.clone(),
        }
    }
}

/// Hash input: the Application spec and the spec of every definition, keyed
/// by name. Metadata and status never take part.
fn hash_input(spec: &ApplicationRevisionSpec) -> vela_core::Result<Value> {
    let mut application = serde_json::to_value(&spec.application.spec)?;
    normalize_properties(&mut application);

    let mut input = Map::new();
    input.insert("application".into(), application);
    input.insert(
        "componentDefinitions".into(),
        definition_specs(&spec.component_definitions)?,
    );
    input.insert(
        "workloadDefinitions".into(),
        definition_specs(&spec.workload_definitions)?,
    );
    input.insert(
        "traitDefinitions".into(),
        definition_specs(&spec.trait_definitions)?,
    );
    input.insert(
        "scopeDefinitions".into(),
        definition_specs(&spec.scope_definitions)?,
    );
    Ok(Value::Object(input))
}

/// Missing `properties` render like `{}`, so they hash like it too.
fn normalize_properties(application: &mut Value) {
    let components = application
        .get_mut("components")
        .and_then(Value::as_array_mut)
        .into_iter()
        .flatten();
    for component in components {
        let traits: Vec<&mut Value> = match component.as_object_mut() {
            Some(object) => {
                object
                    .entry("properties")
                    .or_insert_with(|| Value::Object(Map::new()));
                object
                    .get_mut("traits")
                    .and_then(Value::as_array_mut)
                    .map(|traits| traits.iter_mut().collect())
                    .unwrap_or_default()
            }
            None => Vec::new(),
        };
        for declared in traits {
            if let Some(object) = declared.as_object_mut() {
                object
                    .entry("properties")
                    .or_insert_with(|| Value::Object(Map::new()));
            }
        }
    }
}

fn definition_specs<S: Serialize>(
    definitions: &BTreeMap<String, Definition<S>>,
) -> vela_core::Result<Value> {
    let mut out = Map::new();
    for (name, definition) in definitions {
        out.insert(name.clone(), serde_json::to_value(&definition.spec)?);
    }
    Ok(Value::Object(out))
}

/// Content hash of a revision's inputs.
pub fn compute_app_revision_hash(spec: &ApplicationRevisionSpec) -> Result<String, ControllerError> {
    Ok(content_hash(&hash_input(spec)?))
}

/// Structural equality of the canonical hash inputs of two revisions.
pub fn deep_equal_revision(
    a: &ApplicationRevisionSpec,
    b: &ApplicationRevisionSpec,
) -> Result<bool, ControllerError> {
    Ok(content_equal(&hash_input(a)?, &hash_input(b)?))
}

/// Builds the revision content for the current pass.
///
/// The stored Application copy carries only identity, labels and
/// annotations besides its spec.
pub fn build_revision_spec(
    app_file: &AppFile,
    configuration: &ApplicationConfiguration,
) -> Result<ApplicationRevisionSpec, ControllerError> {
    let source = &app_file.application;
    let mut application = Application::new(source.name(), source.namespace());
    application.metadata.labels = source.metadata.labels.clone();
    application.metadata.annotations = source.metadata.annotations.clone();
    application.spec = source.spec.clone();

    Ok(ApplicationRevisionSpec {
        application,
        component_definitions: app_file.definitions.components.clone(),
        workload_definitions: app_file.definitions.workloads.clone(),
        trait_definitions: app_file.definitions.traits.clone(),
        scope_definitions: app_file.definitions.scopes.clone(),
        application_configuration: configuration.to_value()?,
        revision: 0,
    })
}

/// Decides the revision for this pass and persists it when needed.
///
/// This is the only place ApplicationRevisions are created.
pub async fn decide_revision(
    store: &dyn ObjectStore,
    app_file: &AppFile,
    mut candidate: ApplicationRevisionSpec,
) -> Result<RevisionDecision, ControllerError> {
    let hash = compute_app_revision_hash(&candidate)?;
    let pointer = app_file.application.status.latest_revision.as_ref();

    let state = match pointer {
        None => RevisionState::NoRevision,
        Some(p) if p.revision_hash == hash => RevisionState::Stable,
        Some(_) => RevisionState::PendingNewRevision,
    };
    debug!(app = %app_file.name, hash = %hash, state = ?state, "Revision state");

    if let (RevisionState::Stable, Some(pointer)) = (state, pointer) {
        if let Some(current) = load_revision(store, &app_file.namespace, &pointer.name).await? {
            if !deep_equal_revision(&current.spec, &candidate)? {
                return Err(hash_mismatch(app_file, &hash));
            }
            return Ok(RevisionDecision {
                state,
                revision: current,
                hash,
                created: false,
            });
        }
        // The pointer survived its revision object; recreate it in place.
        candidate.revision = pointer.revision;
        return create_revision(store, app_file, state, candidate, hash).await;
    }

    if let (RevisionState::PendingNewRevision, Some(pointer)) = (state, pointer)
        && let Some(current) = load_revision(store, &app_file.namespace, &pointer.name).await?
        && deep_equal_revision(&current.spec, &candidate)?
    {
        return Err(hash_mismatch(app_file, &hash));
    }

    let highest = highest_revision(store, app_file).await?;
    if let Some(existing) = &highest
        && existing.recorded_hash() == Some(hash.as_str())
    {
        if !deep_equal_revision(&existing.spec, &candidate)? {
            return Err(hash_mismatch(app_file, &hash));
        }
        debug!(app = %app_file.name, revision = %existing.metadata.name, "Adopted existing revision");
        return Ok(RevisionDecision {
            state,
            revision: existing.clone(),
            hash,
            created: false,
        });
    }

    let latest_number = pointer.map_or(0, |p| p.revision);
    let highest_number = highest.as_ref().map_or(0, |r| r.spec.revision);
    candidate.revision = latest_number.max(highest_number) + 1;
    create_revision(store, app_file, state, candidate, hash).await
}

fn hash_mismatch(app_file: &AppFile, hash: &str) -> ControllerError {
    ControllerError::HashMismatch {
        app: app_file.name.clone(),
        hash: hash.to_string(),
    }
}

async fn load_revision(
    store: &dyn ObjectStore,
    namespace: &str,
    name: &str,
) -> Result<Option<ApplicationRevision>, ControllerError> {
    let key = ObjectKey::new(kind::APPLICATION_REVISION, namespace, name);
    match store.get(&key).await? {
        Some(stored) => Ok(Some(stored.decode()?)),
        None => Ok(None),
    }
}

/// Highest-numbered revision labelled with the app's name, if any.
async fn highest_revision(
    store: &dyn ObjectStore,
    app_file: &AppFile,
) -> Result<Option<ApplicationRevision>, ControllerError> {
    let params = ListParams::new()
        .in_namespace(app_file.namespace.clone())
        .with_label(label::APP_NAME, app_file.name.clone());
    let listed = store.list(kind::APPLICATION_REVISION, &params).await?;

    let mut highest: Option<ApplicationRevision> = None;
    for entry in listed.entries {
        let revision: ApplicationRevision = entry.decode()?;
        let number = extract_revision(&revision.metadata.name).unwrap_or(revision.spec.revision);
        if highest.as_ref().is_none_or(|h| h.spec.revision < number) {
            let mut revision = revision;
            revision.spec.revision = number;
            highest = Some(revision);
        }
    }
    Ok(highest)
}

async fn create_revision(
    store: &dyn ObjectStore,
    app_file: &AppFile,
    state: RevisionState,
    spec: ApplicationRevisionSpec,
    hash: String,
) -> Result<RevisionDecision, ControllerError> {
    let name = revision_name(&app_file.name, spec.revision);
    let meta: ObjectMeta =
        owned_meta(app_file, &name).with_label(label::APP_REVISION_HASH, hash.clone());
    let revision = ApplicationRevision::new(meta, spec);

    match store.create(&revision.to_value()?).await {
        Ok(stored) => {
            info!(
                app = %app_file.name,
                revision = %name,
                hash = %hash,
                "Created application revision"
            );
            Ok(RevisionDecision {
                state,
                revision: stored.decode()?,
                hash,
                created: true,
            })
        }
        Err(StorageError::AlreadyExists { key }) => {
            let existing = store
                .get(&key)
                .await?
                .ok_or_else(|| StorageError::not_found(key.clone()))?;
            let existing: ApplicationRevision = existing.decode()?;
            if existing.recorded_hash() == Some(hash.as_str()) {
                debug!(app = %app_file.name, revision = %name, "Revision already exists with same hash");
                Ok(RevisionDecision {
                    state,
                    revision: existing,
                    hash,
                    created: false,
                })
            } else {
                Err(ControllerError::Conflict {
                    message: format!("revision {name} exists with a different hash"),
                })
            }
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appfile::DefinitionClosure;
    use serde_json::json;
    use vela_core::{ApplicationComponent, ComponentDefinitionSpec, Schematic};
    use vela_db_memory::InMemoryStore;

    fn app(image: &str) -> Application {
        Application::new("app", "default").with_component(ApplicationComponent::new(
            "myweb",
            "worker",
            json!({"image": image}),
        ))
    }

    fn app_file(application: Application) -> AppFile {
        let mut definitions = DefinitionClosure::default();
        definitions.components.insert(
            "worker".into(),
            vela_core::ComponentDefinition::new(
                "worker",
                "vela-system",
                ComponentDefinitionSpec {
                    workload: Default::default(),
                    schematic: Some(Schematic {
                        template: json!({"output": {"kind": "Deployment"}}),
                    }),
                    status: None,
                },
            ),
        );
        AppFile {
            name: "app".into(),
            namespace: "default".into(),
            owner: None,
            config: vec![],
            components: vec![],
            definitions,
            application,
        }
    }

    fn spec(file: &AppFile) -> ApplicationRevisionSpec {
        let configuration = ApplicationConfiguration::new(ObjectMeta::new("app", "default"));
        build_revision_spec(file, &configuration).unwrap()
    }

    #[test]
    fn test_hash_ignores_volatile_metadata() {
        let file = app_file(app("busybox"));
        let base = spec(&file);

        let mut noisy = base.clone();
        noisy.application.metadata.uid = Some("u-1".into());
        noisy.application.metadata.resource_version = Some("42".into());
        noisy.application.metadata.labels.insert("x".into(), "y".into());
        noisy.revision = 7;
        if let Some(definition) = noisy.component_definitions.get_mut("worker") {
            definition.metadata.resource_version = Some("9".into());
        }

        assert_eq!(
            compute_app_revision_hash(&base).unwrap(),
            compute_app_revision_hash(&noisy).unwrap()
        );
        assert!(deep_equal_revision(&base, &noisy).unwrap());
        assert_eq!(compute_app_revision_hash(&base).unwrap().len(), 16);
    }

    #[test]
    fn test_hash_sensitive_to_content() {
        let a = spec(&app_file(app("busybox")));
        let b = spec(&app_file(app("nginx")));
        assert_ne!(
            compute_app_revision_hash(&a).unwrap(),
            compute_app_revision_hash(&b).unwrap()
        );
        assert!(!deep_equal_revision(&a, &b).unwrap());
    }

    #[test]
    fn test_unset_and_empty_properties_hash_equal() {
        let mut bare = app("busybox");
        bare.spec.components[0].properties = Value::Null;
        let mut empty = app("busybox");
        empty.spec.components[0].properties = json!({});
        assert_eq!(
            compute_app_revision_hash(&spec(&app_file(bare))).unwrap(),
            compute_app_revision_hash(&spec(&app_file(empty))).unwrap()
        );
    }

    #[test]
    fn test_empty_list_and_missing_property_hash_differently() {
        let with_empty = Application::new("app", "default").with_component(
            ApplicationComponent::new("myweb", "worker", json!({"image": "busybox", "cmd": []})),
        );
        let without = app("busybox");
        let a = spec(&app_file(with_empty));
        let b = spec(&app_file(without));
        assert_ne!(
            compute_app_revision_hash(&a).unwrap(),
            compute_app_revision_hash(&b).unwrap()
        );
        assert!(!deep_equal_revision(&a, &b).unwrap());
    }

    #[tokio::test]
    async fn test_revision_lineage() {
        let store = InMemoryStore::new();

        let mut file = app_file(app("busybox"));
        let first = decide_revision(&store, &file, spec(&file)).await.unwrap();
        assert_eq!(first.state, RevisionState::NoRevision);
        assert!(first.created);
        assert_eq!(first.name(), "app-v1");
        assert_eq!(first.revision.recorded_hash(), Some(first.hash.as_str()));

        file.application.status.latest_revision = Some(first.latest());
        let again = decide_revision(&store, &file, spec(&file)).await.unwrap();
        assert_eq!(again.state, RevisionState::Stable);
        assert!(!again.created);
        assert_eq!(again.name(), "app-v1");

        let mut changed = app_file(app("nginx"));
        changed.application.status.latest_revision = Some(first.latest());
        let second = decide_revision(&store, &changed, spec(&changed)).await.unwrap();
        assert_eq!(second.state, RevisionState::PendingNewRevision);
        assert_eq!(second.name(), "app-v2");
        assert_eq!(second.revision.spec.revision, 2);
        assert_ne!(second.hash, first.hash);
    }

    #[tokio::test]
    async fn test_lineage_survives_recreation() {
        let store = InMemoryStore::new();
        let file = app_file(app("busybox"));
        decide_revision(&store, &file, spec(&file)).await.unwrap();
        let changed = app_file(app("nginx"));
        let second = decide_revision(&store, &changed, spec(&changed)).await.unwrap();
        assert_eq!(second.name(), "app-v2");

        // Same content as the highest revision is adopted, not duplicated.
        let recreated = app_file(app("nginx"));
        let adopted = decide_revision(&store, &recreated, spec(&recreated)).await.unwrap();
        assert!(!adopted.created);
        assert_eq!(adopted.name(), "app-v2");

        // New content continues numbering past the highest revision.
        let third = app_file(app("redis"));
        let next = decide_revision(&store, &third, spec(&third)).await.unwrap();
        assert_eq!(next.name(), "app-v3");
    }

    #[tokio::test]
    async fn test_name_collision_with_different_hash_conflicts() {
        let store = InMemoryStore::new();
        let file = app_file(app("busybox"));
        let first = decide_revision(&store, &file, spec(&file)).await.unwrap();

        // A stale pointer naming v1 with a different hash would overwrite v1.
        let mut stale = app_file(app("nginx"));
        stale.application.status.latest_revision = Some(LatestRevision {
            name: "app-v1".into(),
            revision: 0,
            revision_hash: "0000000000000000".into(),
        });
        store
            .delete(&ObjectKey::new(kind::APPLICATION_REVISION, "default", "app-v1"), None)
            .await
            .unwrap();
        let mut colliding = first.revision.clone();
        colliding.metadata = ObjectMeta::new("app-v1", "default")
            .with_label(label::APP_REVISION_HASH, "ffffffffffffffff");
        store.create(&colliding.to_value().unwrap()).await.unwrap();

        let err = decide_revision(&store, &stale, spec(&stale)).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_hash_mismatch_detected() {
        let store = InMemoryStore::new();
        let file = app_file(app("busybox"));
        let first = decide_revision(&store, &file, spec(&file)).await.unwrap();

        // Pointer hash differs, but the stored content is identical.
        let mut lying = app_file(app("busybox"));
        lying.application.status.latest_revision = Some(LatestRevision {
            revision_hash: "0000000000000000".into(),
            ..first.latest()
        });
        let err = decide_revision(&store, &lying, spec(&lying)).await.unwrap_err();
        assert!(matches!(err, ControllerError::HashMismatch { .. }));
    }
}
