//! Capability definitions owned by platform operators.
//!
//! Definitions are read-only input to the controller. Each one carries the
//! template consumed by the renderer and optional health/status expressions
//! that are evaluated later against live objects.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::meta::{Object, ObjectMeta, TypeReference};
use crate::oam;

/// Binds a definition spec type to its object kind.
pub trait DefinitionSpec: Serialize + DeserializeOwned + Clone {
    const KIND: &'static str;

    fn schematic(&self) -> Option<&Schematic>;
    fn status(&self) -> Option<&StatusSpec>;
}

fn default_api_version() -> String {
    oam::API_VERSION_V1BETA1.to_string()
}

/// A capability definition document with a typed spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Definition<S> {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    pub spec: S,
}

impl<S: DefinitionSpec> Definition<S> {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, spec: S) -> Self {
        Self {
            api_version: default_api_version(),
            kind: S::KIND.to_string(),
            metadata: ObjectMeta::new(name, namespace),
            spec,
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn template(&self) -> Option<&Value> {
        self.spec.schematic().map(|s| &s.template)
    }

    pub fn health_policy(&self) -> Option<&str> {
        self.spec.status().and_then(|s| s.health_policy.as_deref())
    }

    pub fn custom_status(&self) -> Option<&str> {
        self.spec.status().and_then(|s| s.custom_status.as_deref())
    }
}

impl<S: DefinitionSpec> Object for Definition<S> {
    const API_VERSION: &'static str = oam::API_VERSION_V1BETA1;
    const KIND: &'static str = S::KIND;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

pub type ComponentDefinition = Definition<ComponentDefinitionSpec>;
pub type WorkloadDefinition = Definition<WorkloadDefinitionSpec>;
pub type TraitDefinition = Definition<TraitDefinitionSpec>;
pub type ScopeDefinition = Definition<ScopeDefinitionSpec>;

/// Template body of a definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schematic {
    pub template: Value,
}

/// Expressions evaluated against live objects after apply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_policy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinitionReference {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
}

/// What a component definition renders: an inline resource type or a
/// named WorkloadDefinition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkloadTypeDescriptor {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub workload_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<TypeReference>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentDefinitionSpec {
    #[serde(default)]
    pub workload: WorkloadTypeDescriptor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schematic: Option<Schematic>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusSpec>,
}

impl DefinitionSpec for ComponentDefinitionSpec {
    const KIND: &'static str = oam::kind::COMPONENT_DEFINITION;

    fn schematic(&self) -> Option<&Schematic> {
        self.schematic.as_ref()
    }

    fn status(&self) -> Option<&StatusSpec> {
        self.status.as_ref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadDefinitionSpec {
    pub definition_ref: DefinitionReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<TypeReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schematic: Option<Schematic>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusSpec>,
}

impl DefinitionSpec for WorkloadDefinitionSpec {
    const KIND: &'static str = oam::kind::WORKLOAD_DEFINITION;

    fn schematic(&self) -> Option<&Schematic> {
        self.schematic.as_ref()
    }

    fn status(&self) -> Option<&StatusSpec> {
        self.status.as_ref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraitDefinitionSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub applies_to_workloads: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts_with: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition_ref: Option<DefinitionReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workload_ref_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schematic: Option<Schematic>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusSpec>,
}

impl DefinitionSpec for TraitDefinitionSpec {
    const KIND: &'static str = oam::kind::TRAIT_DEFINITION;

    fn schematic(&self) -> Option<&Schematic> {
        self.schematic.as_ref()
    }

    fn status(&self) -> Option<&StatusSpec> {
        self.status.as_ref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeDefinitionSpec {
    pub definition_ref: DefinitionReference,
    /// Resource type scope instances are referenced as.
    pub reference: TypeReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workload_refs_path: Option<String>,
    #[serde(default)]
    pub allow_component_overlap: bool,
}

impl DefinitionSpec for ScopeDefinitionSpec {
    const KIND: &'static str = oam::kind::SCOPE_DEFINITION;

    fn schematic(&self) -> Option<&Schematic> {
        None
    }

    fn status(&self) -> Option<&StatusSpec> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_component_definition_parse() {
        let def: ComponentDefinition = serde_json::from_value(json!({
            "kind": "ComponentDefinition",
            "metadata": {"name": "worker", "namespace": "vela-system"},
            "spec": {
                "workload": {"definition": {"apiVersion": "apps/v1", "kind": "Deployment"}},
                "status": {"healthPolicy": "context.output.status.readyReplicas > 0"},
                "schematic": {"template": {"output": {"kind": "Deployment"}}}
            }
        }))
        .unwrap();

        assert_eq!(def.name(), "worker");
        assert_eq!(
            def.spec.workload.definition.as_ref().map(|d| d.kind.as_str()),
            Some("Deployment")
        );
        assert_eq!(def.template(), Some(&json!({"output": {"kind": "Deployment"}})));
        assert_eq!(def.health_policy(), Some("context.output.status.readyReplicas > 0"));
        assert!(def.custom_status().is_none());
    }

    #[test]
    fn test_scope_definition_has_no_template() {
        let def = ScopeDefinition::new(
            "healthscopes.core.oam.dev",
            "vela-system",
            ScopeDefinitionSpec {
                definition_ref: DefinitionReference {
                    name: "healthscopes.core.oam.dev".into(),
                    version: String::new(),
                },
                reference: TypeReference {
                    api_version: "core.oam.dev/v1alpha2".into(),
                    kind: "HealthScope".into(),
                },
                workload_refs_path: Some("spec.workloadRefs".into()),
                allow_component_overlap: true,
            },
        );
        assert_eq!(def.kind, "ScopeDefinition");
        assert!(def.template().is_none());
        assert_eq!(def.key().kind, "ScopeDefinition");
    }
}
