//! The user-facing Application object and its status.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::meta::{Object, ObjectMeta};
use crate::oam;

fn default_api_version() -> String {
    oam::API_VERSION_V1BETA1.to_string()
}

fn default_kind() -> String {
    oam::kind::APPLICATION.to_string()
}

/// Desired state declared by an end user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ApplicationSpec,
    #[serde(default)]
    pub status: ApplicationStatus,
}

impl Application {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            metadata: ObjectMeta::new(name, namespace),
            spec: ApplicationSpec::default(),
            status: ApplicationStatus::default(),
        }
    }

    pub fn with_component(mut self, component: ApplicationComponent) -> Self {
        self.spec.components.push(component);
        self
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn namespace(&self) -> &str {
        &self.metadata.namespace
    }

    /// Whether an external rollout controller asked for pinned revisions.
    pub fn is_under_rollout(&self) -> bool {
        self.metadata
            .annotation(oam::annotation::ROLLOUT_TEMPLATE)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }

    pub fn component(&self, name: &str) -> Option<&ApplicationComponent> {
        self.spec.components.iter().find(|c| c.name == name)
    }
}

impl Object for Application {
    const API_VERSION: &'static str = oam::API_VERSION_V1BETA1;
    const KIND: &'static str = oam::kind::APPLICATION;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSpec {
    #[serde(default)]
    pub components: Vec<ApplicationComponent>,
    /// Opaque plan consumed by an external rollout controller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollout_plan: Option<Value>,
}

/// One workload declaration within an Application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationComponent {
    pub name: String,
    #[serde(rename = "type")]
    pub workload_type: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub properties: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub traits: Vec<ApplicationTrait>,
    /// Scope definition name to scope instance name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub scopes: BTreeMap<String, String>,
}

impl ApplicationComponent {
    pub fn new(name: impl Into<String>, workload_type: impl Into<String>, properties: Value) -> Self {
        Self {
            name: name.into(),
            workload_type: workload_type.into(),
            properties,
            traits: Vec::new(),
            scopes: BTreeMap::new(),
        }
    }

    pub fn with_trait(mut self, trait_type: impl Into<String>, properties: Value) -> Self {
        self.traits.push(ApplicationTrait {
            trait_type: trait_type.into(),
            properties,
        });
        self
    }

    pub fn with_scope(mut self, scope_type: impl Into<String>, scope_name: impl Into<String>) -> Self {
        self.scopes.insert(scope_type.into(), scope_name.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationTrait {
    #[serde(rename = "type")]
    pub trait_type: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub properties: Value,
}

/// Lifecycle phase surfaced on the Application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ApplicationPhase {
    Rendering,
    Running,
    HealthChecking,
    RollingOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// Observed condition of one reconcile phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: ConditionStatus,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

impl Condition {
    pub fn ready(condition_type: impl Into<String>) -> Self {
        Self {
            condition_type: condition_type.into(),
            status: ConditionStatus::True,
            reason: "Available".to_string(),
            message: String::new(),
            last_transition_time: None,
        }
    }

    pub fn failed(
        condition_type: impl Into<String>,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            condition_type: condition_type.into(),
            status: ConditionStatus::False,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: None,
        }
    }

    fn same_state(&self, other: &Condition) -> bool {
        self.status == other.status && self.reason == other.reason && self.message == other.message
    }
}

/// Pointer to the most recent ApplicationRevision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestRevision {
    pub name: String,
    pub revision: i64,
    pub revision_hash: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplicationTraitStatus {
    #[serde(rename = "type")]
    pub trait_type: String,
    pub healthy: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplicationComponentStatus {
    pub name: String,
    pub healthy: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub traits: Vec<ApplicationTraitStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<ApplicationPhase>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<ApplicationComponentStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_revision: Option<LatestRevision>,
}

impl ApplicationStatus {
    /// Sets a condition, keeping its transition time when nothing changed.
    pub fn set_condition(&mut self, mut condition: Condition, now: &str) {
        match self
            .conditions
            .iter_mut()
            .find(|c| c.condition_type == condition.condition_type)
        {
            Some(existing) if existing.same_state(&condition) => {}
            Some(existing) => {
                condition.last_transition_time = Some(now.to_string());
                *existing = condition;
            }
            None => {
                condition.last_transition_time = Some(now.to_string());
                self.conditions.push(condition);
            }
        }
    }

    pub fn condition(&self, condition_type: &str) -> Option<&Condition> {
        self.conditions
            .iter()
            .find(|c| c.condition_type == condition_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_application_deserialize() {
        let app: Application = serde_json::from_value(json!({
            "metadata": {"name": "app", "namespace": "default"},
            "spec": {
                "components": [{
                    "name": "web",
                    "type": "worker",
                    "properties": {"image": "busybox"},
                    "traits": [{"type": "scaler", "properties": {"replicas": 2}}],
                    "scopes": {"healthscopes.core.oam.dev": "default-health"}
                }]
            }
        }))
        .unwrap();

        assert_eq!(app.kind, "Application");
        assert_eq!(app.api_version, oam::API_VERSION_V1BETA1);
        let comp = app.component("web").unwrap();
        assert_eq!(comp.workload_type, "worker");
        assert_eq!(comp.traits[0].trait_type, "scaler");
        assert_eq!(comp.scopes.len(), 1);
        assert!(app.status.phase.is_none());
    }

    #[test]
    fn test_rollout_annotation() {
        let mut app = Application::new("app", "default");
        assert!(!app.is_under_rollout());
        app.metadata
            .annotations
            .insert(oam::annotation::ROLLOUT_TEMPLATE.into(), "true".into());
        assert!(app.is_under_rollout());
    }

    #[test]
    fn test_set_condition_keeps_transition_time() {
        let mut status = ApplicationStatus::default();
        status.set_condition(Condition::ready("Parsed"), "t1");
        status.set_condition(Condition::ready("Parsed"), "t2");
        assert_eq!(
            status.condition("Parsed").unwrap().last_transition_time.as_deref(),
            Some("t1")
        );

        status.set_condition(Condition::failed("Parsed", "Render", "boom"), "t3");
        let cond = status.condition("Parsed").unwrap();
        assert_eq!(cond.status, ConditionStatus::False);
        assert_eq!(cond.last_transition_time.as_deref(), Some("t3"));
        assert_eq!(status.conditions.len(), 1);
    }

    #[test]
    fn test_phase_serialization() {
        assert_eq!(
            serde_json::to_value(ApplicationPhase::HealthChecking).unwrap(),
            json!("healthChecking")
        );
        assert_eq!(serde_json::to_value(ApplicationPhase::Running).unwrap(), json!("running"));
    }
}
