//! Health and custom-status evaluation of applied components against the
//! live objects in the store.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::warn;
use vela_core::oam::label;
use vela_core::{ApplicationComponentStatus, ApplicationTraitStatus, ObjectKey};
use vela_storage::{ListParams, ObjectStore};
use vela_template::{RenderContext, RenderError, evaluate_custom_status, evaluate_health};

use crate::appfile::{AppFile, ComponentFile, RenderedObject, TraitFile};
use crate::error::ControllerError;

/// Evaluates every component of `app_file`, in declared order.
pub async fn evaluate_application_health(
    store: &dyn ObjectStore,
    app_file: &AppFile,
) -> Result<Vec<ApplicationComponentStatus>, ControllerError> {
    let mut statuses = Vec::with_capacity(app_file.components.len());
    for component in &app_file.components {
        statuses.push(evaluate_component_health(store, app_file, component).await?);
    }
    Ok(statuses)
}

/// A component is healthy when its workload and every declared trait are.
pub async fn evaluate_component_health(
    store: &dyn ObjectStore,
    app_file: &AppFile,
    component: &ComponentFile,
) -> Result<ApplicationComponentStatus, ControllerError> {
    let workload = find_live_workload(store, app_file, component).await?;
    let auxiliary = match component.auxiliary() {
        Some(aux) => find_live_outputs(store, app_file, component, aux).await?,
        None => BTreeMap::new(),
    };

    let mut context = base_context(app_file, component).with_outputs(auxiliary);
    if let Some(live) = workload {
        context = context.with_output(live);
    }

    let (healthy, message) = evaluate(
        component.health_policy.as_deref(),
        component.custom_status.as_deref(),
        &context,
        &component.params,
        &component.name,
        None,
    );

    let mut traits = Vec::new();
    for declared in component.declared_traits() {
        traits.push(evaluate_trait_health(store, app_file, component, declared).await?);
    }

    Ok(ApplicationComponentStatus {
        name: component.name.clone(),
        healthy: healthy && traits.iter().all(|t| t.healthy),
        message,
        traits,
    })
}

async fn evaluate_trait_health(
    store: &dyn ObjectStore,
    app_file: &AppFile,
    component: &ComponentFile,
    declared: &TraitFile,
) -> Result<ApplicationTraitStatus, ControllerError> {
    let mut live = find_live_outputs(store, app_file, component, declared).await?;
    let mut context = base_context(app_file, component);
    // The primary object is keyed by the empty string while collecting.
    if let Some(primary) = live.remove("") {
        context = context.with_output(primary);
    }
    context = context.with_outputs(live);

    let (healthy, message) = evaluate(
        declared.health_policy.as_deref(),
        declared.custom_status.as_deref(),
        &context,
        &declared.params,
        &component.name,
        Some(&declared.trait_type),
    );

    Ok(ApplicationTraitStatus {
        trait_type: declared.trait_type.clone(),
        healthy,
        message,
    })
}

fn base_context(app_file: &AppFile, component: &ComponentFile) -> RenderContext {
    RenderContext {
        name: component.name.clone(),
        app_name: app_file.name.clone(),
        namespace: app_file.namespace.clone(),
        config: app_file.config.clone(),
        ..Default::default()
    }
}

/// A broken policy makes the target unhealthy, with the error as message.
fn evaluate(
    health_policy: Option<&str>,
    custom_status: Option<&str>,
    context: &RenderContext,
    params: &Value,
    component: &str,
    trait_type: Option<&str>,
) -> (bool, String) {
    let healthy = match evaluate_health(health_policy, context, params) {
        Ok(healthy) => healthy,
        Err(e) => return broken(component, trait_type, "health policy", e),
    };
    match evaluate_custom_status(custom_status, context, params) {
        Ok(message) => (healthy, message.unwrap_or_default()),
        Err(e) => broken(component, trait_type, "custom status", e),
    }
}

fn broken(
    component: &str,
    trait_type: Option<&str>,
    what: &str,
    error: RenderError,
) -> (bool, String) {
    warn!(
        component = %component,
        trait_type = trait_type.unwrap_or_default(),
        error = %error,
        "Failed to evaluate {what}"
    );
    (false, error.to_string())
}

fn kind_of(object: &Value) -> Option<&str> {
    object.get("kind").and_then(Value::as_str)
}

fn name_of(object: &Value) -> Option<&str> {
    object
        .get("metadata")
        .and_then(|m| m.get("name"))
        .and_then(Value::as_str)
}

/// Looks the live workload up by its app and component labels, falling
/// back to the rendered name or the component name.
async fn find_live_workload(
    store: &dyn ObjectStore,
    app_file: &AppFile,
    component: &ComponentFile,
) -> Result<Option<Value>, ControllerError> {
    let Some(kind) = kind_of(&component.workload) else {
        return Ok(None);
    };

    let params = ListParams::new()
        .in_namespace(app_file.namespace.clone())
        .with_label(label::APP_NAME, app_file.name.clone())
        .with_label(label::APP_COMPONENT, component.name.clone());
    let listed = store.list(kind, &params).await?;
    if let Some(entry) = listed
        .entries
        .into_iter()
        .find(|e| e.metadata().is_ok_and(|m| !m.labels.contains_key(label::TRAIT_TYPE)))
    {
        return Ok(Some(entry.object));
    }

    let name = name_of(&component.workload).unwrap_or(&component.name);
    let key = ObjectKey::new(kind, app_file.namespace.clone(), name);
    Ok(store.get(&key).await?.map(|stored| stored.object))
}

/// Live counterparts of a trait's rendered objects, keyed by output key
/// (`""` for the primary output).
async fn find_live_outputs(
    store: &dyn ObjectStore,
    app_file: &AppFile,
    component: &ComponentFile,
    declared: &TraitFile,
) -> Result<BTreeMap<String, Value>, ControllerError> {
    let mut live = BTreeMap::new();
    for rendered in &declared.objects {
        if let Some(object) = find_live_object(store, app_file, component, declared, rendered).await? {
            live.insert(rendered.resource.clone().unwrap_or_default(), object);
        }
    }
    Ok(live)
}

async fn find_live_object(
    store: &dyn ObjectStore,
    app_file: &AppFile,
    component: &ComponentFile,
    declared: &TraitFile,
    rendered: &RenderedObject,
) -> Result<Option<Value>, ControllerError> {
    let Some(kind) = kind_of(&rendered.object) else {
        return Ok(None);
    };

    let mut params = ListParams::new()
        .in_namespace(app_file.namespace.clone())
        .with_label(label::APP_NAME, app_file.name.clone())
        .with_label(label::APP_COMPONENT, component.name.clone())
        .with_label(label::TRAIT_TYPE, declared.trait_type.clone());
    if let Some(resource) = &rendered.resource {
        params = params.with_label(label::TRAIT_RESOURCE, resource.clone());
    }
    let listed = store.list(kind, &params).await?;
    let found = listed.entries.into_iter().find(|e| {
        // The primary output carries no resource label.
        rendered.resource.is_some()
            || e
                .metadata()
                .is_ok_and(|m| !m.labels.contains_key(label::TRAIT_RESOURCE))
    });
    if let Some(entry) = found {
        return Ok(Some(entry.object));
    }

    match name_of(&rendered.object) {
        Some(name) => {
            let key = ObjectKey::new(kind, app_file.namespace.clone(), name);
            Ok(store.get(&key).await?.map(|stored| stored.object))
        }
        None => Ok(None),
    }
}
