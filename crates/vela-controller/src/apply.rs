//! Reconcile pass for one Application.
//!
//! A pass moves through `Init → Parsed → Configured → RevisionDecided →
//! Applied → StatusUpdated` and ends `Done` or `Error`. Every write is
//! conditioned on the version last read; a lost race aborts the pass with
//! [`ControllerError::Conflict`] and the caller retries from `Init`.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info, warn};
use vela_core::canonical::content_equal;
use vela_core::oam::{annotation, kind, label};
use vela_core::{
    Application, ApplicationConfiguration, ApplicationContext, ApplicationPhase,
    ApplicationStatus, Component, ComponentRevision, Condition, Object, ObjectKey, ObjectMeta,
    OwnerReference, RevisionPointer, now_rfc3339, revision_name,
};
use vela_storage::{DynStore, ListParams, ObjectStore, StoredObject};
use vela_template::ConfigEntry;

use crate::appfile::{AppFile, AppParser};
use crate::configuration::{generate_application_configuration, owned_meta};
use crate::error::ControllerError;
use crate::health::evaluate_application_health;
use crate::revision::{RevisionDecision, build_revision_spec, decide_revision};

pub const CONDITION_PARSED: &str = "Parsed";
pub const CONDITION_REVISION: &str = "Revision";
pub const CONDITION_APPLIED: &str = "Applied";

/// Identity of an Application.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AppKey {
    pub namespace: String,
    pub name: String,
}

impl AppKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn object_key(&self) -> ObjectKey {
        ObjectKey::new(kind::APPLICATION, self.namespace.clone(), self.name.clone())
    }
}

impl fmt::Display for AppKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Steps of a reconcile pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    Init,
    Parsed,
    Configured,
    RevisionDecided,
    Applied,
    StatusUpdated,
    Done,
    Error,
}

/// How a pass ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// The Application no longer exists.
    Deleted,
    /// The pass finished; `requeue` asks for another pass later.
    Done { requeue: bool },
}

impl PassOutcome {
    pub fn requeue(&self) -> bool {
        matches!(self, Self::Done { requeue: true })
    }
}

/// Writes performed by the apply step.
#[derive(Debug, Default)]
pub struct ApplySummary {
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub pruned: Vec<String>,
}

impl ApplySummary {
    pub fn writes(&self) -> usize {
        self.created.len() + self.updated.len() + self.pruned.len()
    }
}

/// Runs reconcile passes against a store.
#[derive(Clone)]
pub struct ApplyHandler {
    store: DynStore,
    parser: AppParser,
}

impl ApplyHandler {
    pub fn new(store: DynStore, parser: AppParser) -> Self {
        Self { store, parser }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Runs one pass for `key`.
    ///
    /// Parse, revision and partial-apply failures are recorded in the
    /// Application status and end the pass with `Ok`. Conflicts and store
    /// failures are returned.
    pub async fn reconcile(&self, key: &AppKey) -> Result<PassOutcome, ControllerError> {
        let mut pass = Pass::new(key);

        let Some(stored) = self.store.get(&key.object_key()).await? else {
            debug!(app = %key, "Application not found, nothing to reconcile");
            return Ok(PassOutcome::Deleted);
        };
        let resource_version = stored.resource_version.clone();
        let mut application: Application = stored.decode()?;
        // Ownership needs the store-assigned uid even if the document lacks it.
        application.metadata.uid.get_or_insert_with(|| stored.uid.clone());

        let app_file = match self.parse(&application).await {
            Ok(app_file) => app_file,
            Err(e) if e.is_parse_error() => {
                warn!(app = %key, error = %e, "Failed to parse application");
                let mut status = application.status.clone();
                status.set_condition(
                    Condition::failed(CONDITION_PARSED, e.reason(), e.to_string()),
                    &now_rfc3339()?,
                );
                self.write_status(&application, status, &resource_version).await?;
                pass.advance(PassState::Error);
                return Ok(PassOutcome::Done { requeue: true });
            }
            Err(e) => return Err(e),
        };
        pass.advance(PassState::Parsed);

        let (mut configuration, components) = generate_application_configuration(&app_file)?;
        pass.advance(PassState::Configured);

        let candidate = build_revision_spec(&app_file, &configuration)?;
        let revision = match decide_revision(self.store.as_ref(), &app_file, candidate).await {
            Ok(revision) => revision,
            Err(e @ ControllerError::HashMismatch { .. }) => {
                error!(app = %key, error = %e, "Revision hash disagrees with content comparison");
                let mut status = application.status.clone();
                status.set_condition(Condition::ready(CONDITION_PARSED), &now_rfc3339()?);
                status.set_condition(
                    Condition::failed(CONDITION_REVISION, e.reason(), e.to_string()),
                    &now_rfc3339()?,
                );
                self.write_status(&application, status, &resource_version).await?;
                pass.advance(PassState::Error);
                return Ok(PassOutcome::Done { requeue: false });
            }
            Err(e) => return Err(e),
        };
        pass.advance(PassState::RevisionDecided);

        let mut summary = ApplySummary::default();
        if let Err(e) = self
            .apply(&app_file, &mut configuration, components, &revision, &mut summary)
            .await
        {
            let e = partial(e, &summary);
            if e.is_conflict() {
                return Err(e);
            }
            warn!(app = %key, error = %e, "Failed to apply application");
            let mut status = application.status.clone();
            status.set_condition(Condition::ready(CONDITION_PARSED), &now_rfc3339()?);
            status.set_condition(Condition::ready(CONDITION_REVISION), &now_rfc3339()?);
            status.set_condition(
                Condition::failed(CONDITION_APPLIED, e.reason(), e.to_string()),
                &now_rfc3339()?,
            );
            status.latest_revision = Some(revision.latest());
            self.write_status(&application, status, &resource_version).await?;
            pass.advance(PassState::Error);
            return Ok(PassOutcome::Done { requeue: true });
        }
        if summary.writes() > 0 {
            info!(
                app = %key,
                revision = %revision.name(),
                created = summary.created.len(),
                updated = summary.updated.len(),
                pruned = summary.pruned.len(),
                "Application applied"
            );
        }
        pass.advance(PassState::Applied);

        let services = evaluate_application_health(self.store.as_ref(), &app_file).await?;
        let healthy = services.iter().all(|s| s.healthy);

        let now = now_rfc3339()?;
        let mut status = application.status.clone();
        status.set_condition(Condition::ready(CONDITION_PARSED), &now);
        status.set_condition(Condition::ready(CONDITION_REVISION), &now);
        status.set_condition(Condition::ready(CONDITION_APPLIED), &now);
        status.services = services;
        status.latest_revision = Some(revision.latest());
        status.phase = Some(if healthy {
            ApplicationPhase::Running
        } else {
            ApplicationPhase::HealthChecking
        });
        self.write_status(&application, status, &resource_version).await?;
        pass.advance(PassState::StatusUpdated);

        pass.advance(PassState::Done);
        Ok(PassOutcome::Done { requeue: !healthy })
    }

    async fn parse(&self, application: &Application) -> Result<AppFile, ControllerError> {
        let config = self.load_user_config(application).await?;
        self.parser.generate_app_file(application, config).await
    }

    /// Reads the ConfigMap named by the config annotation into sorted
    /// entries.
    async fn load_user_config(
        &self,
        application: &Application,
    ) -> Result<Vec<ConfigEntry>, ControllerError> {
        let Some(name) = application.metadata.annotation(annotation::USER_CONFIG) else {
            return Ok(Vec::new());
        };
        let key = ObjectKey::new(kind::CONFIG_MAP, application.namespace(), name);
        let stored = self
            .store
            .get(&key)
            .await?
            .ok_or_else(|| ControllerError::UserConfigNotFound {
                name: name.to_string(),
            })?;

        let mut config: Vec<ConfigEntry> = stored
            .object
            .get("data")
            .and_then(Value::as_object)
            .map(|data| {
                data.iter()
                    .map(|(name, value)| ConfigEntry {
                        name: name.clone(),
                        value: value
                            .as_str()
                            .map_or_else(|| value.to_string(), str::to_string),
                    })
                    .collect()
            })
            .unwrap_or_default();
        config.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(config)
    }

    async fn apply(
        &self,
        app_file: &AppFile,
        configuration: &mut ApplicationConfiguration,
        components: Vec<Component>,
        revision: &RevisionDecision,
        summary: &mut ApplySummary,
    ) -> Result<(), ControllerError> {
        let mut revisions = BTreeMap::new();
        for component in components {
            let pointer = self.apply_component(component, summary).await?;
            revisions.insert(pointer.0, pointer.1);
        }

        self.prune_components(app_file, summary).await?;

        if app_file.under_rollout() {
            for reference in &mut configuration.spec.components {
                if let Some(pointer) = reference
                    .component_name
                    .as_ref()
                    .and_then(|name| revisions.get(name))
                {
                    let name = pointer.name.clone();
                    reference.pin(name);
                }
            }
        }

        self.apply_configuration(configuration, summary).await?;

        let context = ApplicationContext::new(
            owned_meta(app_file, &app_file.name),
            revision.name().to_string(),
        );
        self.apply_context(context, summary).await?;
        Ok(())
    }

    /// Creates or updates one Component, recording a ComponentRevision for
    /// every spec change. Label or owner changes are written in place.
    /// Returns the component name and its current revision.
    async fn apply_component(
        &self,
        mut component: Component,
        summary: &mut ApplySummary,
    ) -> Result<(String, RevisionPointer), ControllerError> {
        let name = component.name().to_string();
        let Some(existing) = self.store.get(&component.key()).await? else {
            let pointer = RevisionPointer {
                name: revision_name(&name, 1),
                revision: 1,
            };
            component.status.latest_revision = Some(pointer.clone());
            let stored = self.store.create(&component.to_value()?).await?;
            summary.created.push(format!("{}/{name}", kind::COMPONENT));
            self.create_component_revision(&stored, &component, &pointer, summary)
                .await?;
            return Ok((name, pointer));
        };

        let current: Component = existing.decode()?;
        let same_spec = content_equal(
            &serde_json::to_value(&current.spec)?,
            &serde_json::to_value(&component.spec)?,
        );
        let same_meta = current.metadata.labels == component.metadata.labels
            && current.metadata.owner_references == component.metadata.owner_references;

        if same_spec && let Some(pointer) = current.status.latest_revision.clone() {
            let mut stored = existing;
            if !same_meta {
                component.metadata.uid = current.metadata.uid.clone();
                component.status = current.status.clone();
                stored = self
                    .store
                    .update(&component.to_value()?, Some(&stored.resource_version))
                    .await?;
                summary.updated.push(format!("{}/{name}", kind::COMPONENT));
            }
            // Repair a pointer whose revision object went missing.
            let revision_key =
                ObjectKey::new(kind::COMPONENT_REVISION, stored.key.namespace.clone(), &pointer.name);
            if self.store.get(&revision_key).await?.is_none() {
                let owner: Component = stored.decode()?;
                self.create_component_revision(&stored, &owner, &pointer, summary)
                    .await?;
            }
            return Ok((name, pointer));
        }

        let next = current
            .status
            .latest_revision
            .as_ref()
            .map_or(1, |p| p.revision + 1);
        let pointer = RevisionPointer {
            name: revision_name(&name, next),
            revision: next,
        };
        component.metadata.uid = current.metadata.uid.clone();
        component.status.latest_revision = Some(pointer.clone());
        let stored = self
            .store
            .update(&component.to_value()?, Some(&existing.resource_version))
            .await?;
        summary.updated.push(format!("{}/{name}", kind::COMPONENT));
        self.create_component_revision(&stored, &component, &pointer, summary)
            .await?;
        Ok((name, pointer))
    }

    async fn create_component_revision(
        &self,
        stored: &StoredObject,
        component: &Component,
        pointer: &RevisionPointer,
        summary: &mut ApplySummary,
    ) -> Result<(), ControllerError> {
        let mut owner_meta = component.metadata.clone();
        owner_meta.uid = Some(stored.uid.clone());
        let owner = OwnerReference::controller_of(&component.api_version, &component.kind, &owner_meta)?;

        let mut meta = ObjectMeta::new(pointer.name.clone(), stored.key.namespace.clone())
            .with_label(label::APP_COMPONENT, component.name())
            .with_owner(owner);
        if let Some(app) = component.metadata.labels.get(label::APP_NAME) {
            meta = meta.with_label(label::APP_NAME, app.clone());
        }
        let revision = ComponentRevision::new(meta, pointer.revision, component.spec.clone());
        self.store.create(&revision.to_value()?).await?;
        summary
            .created
            .push(format!("{}/{}", kind::COMPONENT_REVISION, pointer.name));
        Ok(())
    }

    /// Deletes Components owned by the Application that it no longer
    /// declares. Their revisions go with them through the owner cascade.
    async fn prune_components(
        &self,
        app_file: &AppFile,
        summary: &mut ApplySummary,
    ) -> Result<(), ControllerError> {
        let Some(owner) = &app_file.owner else {
            return Ok(());
        };
        let declared: HashSet<&str> = app_file.components.iter().map(|c| c.name.as_str()).collect();
        let params = ListParams::new()
            .in_namespace(app_file.namespace.clone())
            .owned_by(owner.uid.clone());
        let listed = self.store.list(kind::COMPONENT, &params).await?;

        for entry in listed.entries {
            if declared.contains(entry.key.name.as_str()) {
                continue;
            }
            self.store
                .delete(&entry.key, Some(&entry.resource_version))
                .await?;
            debug!(app = %app_file.name, component = %entry.key.name, "Pruned component");
            summary.pruned.push(format!("{}/{}", kind::COMPONENT, entry.key.name));
        }
        Ok(())
    }

    async fn apply_configuration(
        &self,
        configuration: &ApplicationConfiguration,
        summary: &mut ApplySummary,
    ) -> Result<(), ControllerError> {
        let desired_spec = serde_json::to_value(&configuration.spec)?;
        self.create_or_update(configuration, &desired_spec, summary)
            .await
    }

    async fn apply_context(
        &self,
        context: ApplicationContext,
        summary: &mut ApplySummary,
    ) -> Result<(), ControllerError> {
        let desired_spec = serde_json::to_value(&context.spec)?;
        self.create_or_update(&context, &desired_spec, summary).await
    }

    /// Creates `object`, or updates it when its spec, labels or owners differ.
    async fn create_or_update<T: Object>(
        &self,
        object: &T,
        desired_spec: &Value,
        summary: &mut ApplySummary,
    ) -> Result<(), ControllerError> {
        let key = object.key();
        let Some(existing) = self.store.get(&key).await? else {
            self.store.create(&object.to_value()?).await?;
            summary.created.push(format!("{}/{}", key.kind, key.name));
            return Ok(());
        };

        let current_meta = existing.metadata()?;
        let desired_meta = object.metadata();
        if content_equal(existing.spec(), desired_spec)
            && current_meta.labels == desired_meta.labels
            && current_meta.owner_references == desired_meta.owner_references
        {
            return Ok(());
        }

        self.store
            .update(&object.to_value()?, Some(&existing.resource_version))
            .await?;
        summary.updated.push(format!("{}/{}", key.kind, key.name));
        Ok(())
    }

    /// Writes `status` when it differs from the stored one.
    async fn write_status(
        &self,
        application: &Application,
        status: ApplicationStatus,
        resource_version: &str,
    ) -> Result<(), ControllerError> {
        if status == application.status {
            return Ok(());
        }
        let mut updated = application.clone();
        updated.status = status;
        self.store
            .update(&updated.to_value()?, Some(resource_version))
            .await?;
        debug!(app = %application.name(), "Application status updated");
        Ok(())
    }
}

/// Wraps a non-conflict failure that followed successful writes.
fn partial(error: ControllerError, summary: &ApplySummary) -> ControllerError {
    let applied = summary.writes();
    if applied == 0 || error.is_conflict() {
        return error;
    }
    ControllerError::PartialApply {
        applied,
        source: Box::new(error),
    }
}

/// Tracks the current step of a pass for logging.
struct Pass<'a> {
    key: &'a AppKey,
    state: PassState,
}

impl<'a> Pass<'a> {
    fn new(key: &'a AppKey) -> Self {
        debug!(app = %key, state = ?PassState::Init, "Reconcile pass started");
        Self {
            key,
            state: PassState::Init,
        }
    }

    fn advance(&mut self, next: PassState) {
        debug!(app = %self.key, from = ?self.state, to = ?next, "Pass state transition");
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{DefinitionRegistry, DefinitionSnapshot};
    use serde_json::json;
    use vela_core::{ApplicationComponent, ComponentDefinitionSpec, ConditionStatus, Schematic};
    use vela_db_memory::InMemoryStore;
    use vela_template::{DEFAULT_FETCH_TIMEOUT, Renderer};

    fn handler(store: DynStore) -> ApplyHandler {
        let mut snapshot = DefinitionSnapshot::default();
        snapshot.insert_component(vela_core::ComponentDefinition::new(
            "worker",
            "vela-system",
            ComponentDefinitionSpec {
                workload: Default::default(),
                schematic: Some(Schematic {
                    template: json!({
                        "parameter": {"image": {"type": "string"}},
                        "output": {
                            "apiVersion": "apps/v1",
                            "kind": "Deployment",
                            "spec": {"image": "${parameter.image}"}
                        }
                    }),
                }),
                status: None,
            },
        ));
        let registry = Arc::new(DefinitionRegistry::with_snapshot("vela-system", snapshot));
        let renderer = Renderer::with_http(DEFAULT_FETCH_TIMEOUT).unwrap();
        ApplyHandler::new(store, AppParser::new(registry, renderer))
    }

    async fn create_app(store: &DynStore, application: &Application) {
        store.create(&application.to_value().unwrap()).await.unwrap();
    }

    async fn load_app(store: &DynStore) -> Application {
        store
            .get(&AppKey::new("default", "app").object_key())
            .await
            .unwrap()
            .unwrap()
            .decode()
            .unwrap()
    }

    #[tokio::test]
    async fn test_missing_application_is_deleted() {
        let store: DynStore = Arc::new(InMemoryStore::new());
        let outcome = handler(store)
            .reconcile(&AppKey::new("default", "ghost"))
            .await
            .unwrap();
        assert_eq!(outcome, PassOutcome::Deleted);
    }

    #[tokio::test]
    async fn test_user_config_not_found_sets_parsed_false() {
        let store: DynStore = Arc::new(InMemoryStore::new());
        let mut app = Application::new("app", "default").with_component(ApplicationComponent::new(
            "myweb",
            "worker",
            json!({"image": "busybox"}),
        ));
        app.metadata
            .annotations
            .insert(annotation::USER_CONFIG.into(), "db-conn".into());
        create_app(&store, &app).await;

        let outcome = handler(store.clone())
            .reconcile(&AppKey::new("default", "app"))
            .await
            .unwrap();
        assert!(outcome.requeue());

        let app = load_app(&store).await;
        let parsed = app.status.condition(CONDITION_PARSED).unwrap();
        assert_eq!(parsed.status, ConditionStatus::False);
        assert_eq!(parsed.reason, "UserConfigNotFound");
        assert!(app.status.latest_revision.is_none());
    }

    #[tokio::test]
    async fn test_component_revisions_follow_payload() {
        let store: DynStore = Arc::new(InMemoryStore::new());
        let app = Application::new("app", "default").with_component(ApplicationComponent::new(
            "myweb",
            "worker",
            json!({"image": "busybox"}),
        ));
        create_app(&store, &app).await;
        let handler = handler(store.clone());
        let key = AppKey::new("default", "app");

        handler.reconcile(&key).await.unwrap();
        let component: Component = store
            .get(&ObjectKey::new("Component", "default", "myweb"))
            .await
            .unwrap()
            .unwrap()
            .decode()
            .unwrap();
        assert_eq!(
            component.status.latest_revision.as_ref().map(|p| p.name.as_str()),
            Some("myweb-v1")
        );

        let mut app = load_app(&store).await;
        app.spec.components[0].properties = json!({"image": "nginx"});
        store.update(&app.to_value().unwrap(), None).await.unwrap();
        handler.reconcile(&key).await.unwrap();

        let revisions = store
            .list(
                "ComponentRevision",
                &ListParams::new().with_label(label::APP_COMPONENT, "myweb"),
            )
            .await
            .unwrap();
        let names: Vec<_> = revisions.entries.iter().map(|e| e.key.name.as_str()).collect();
        assert_eq!(names, vec!["myweb-v1", "myweb-v2"]);
        assert_eq!(
            revisions.entries[1].object["data"]["workload"]["spec"]["image"],
            json!("nginx")
        );
    }

    #[test]
    fn test_partial_wraps_only_after_writes() {
        let mut summary = ApplySummary::default();
        let err = partial(ControllerError::UserConfigNotFound { name: "x".into() }, &summary);
        assert!(matches!(err, ControllerError::UserConfigNotFound { .. }));

        summary.created.push("Component/myweb".into());
        let err = partial(ControllerError::UserConfigNotFound { name: "x".into() }, &summary);
        assert!(matches!(err, ControllerError::PartialApply { applied: 1, .. }));

        let err = partial(
            ControllerError::Conflict {
                message: "stale".into(),
            },
            &summary,
        );
        assert!(err.is_conflict());
    }
}
