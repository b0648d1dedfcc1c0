//! ApplicationConfiguration and ApplicationContext: the low-level objects
//! that bind components, traits and scopes for one Application.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::meta::{Object, ObjectMeta};
use crate::oam;

fn default_api_version() -> String {
    oam::API_VERSION_V1ALPHA2.to_string()
}

fn default_configuration_kind() -> String {
    oam::kind::APPLICATION_CONFIGURATION.to_string()
}

fn default_context_kind() -> String {
    oam::kind::APPLICATION_CONTEXT.to_string()
}

/// Ordered component bindings for one Application, named after it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationConfiguration {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_configuration_kind")]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ApplicationConfigurationSpec,
}

impl ApplicationConfiguration {
    pub fn new(metadata: ObjectMeta) -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_configuration_kind(),
            metadata,
            spec: ApplicationConfigurationSpec::default(),
        }
    }
}

impl Object for ApplicationConfiguration {
    const API_VERSION: &'static str = oam::API_VERSION_V1ALPHA2;
    const KIND: &'static str = oam::kind::APPLICATION_CONFIGURATION;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfigurationSpec {
    #[serde(default)]
    pub components: Vec<ComponentReference>,
}

/// A component binding. Exactly one of `component_name` and
/// `revision_name` is set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub traits: Vec<ComponentTrait>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<ComponentScope>,
}

impl ComponentReference {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            component_name: Some(name.into()),
            ..Default::default()
        }
    }

    /// Binds the reference to a concrete component revision.
    pub fn pin(&mut self, revision_name: impl Into<String>) {
        self.component_name = None;
        self.revision_name = Some(revision_name.into());
    }

    /// Component this reference points at, with any `-vN` suffix intact.
    pub fn target(&self) -> Option<&str> {
        self.component_name
            .as_deref()
            .or(self.revision_name.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentTrait {
    #[serde(rename = "trait")]
    pub object: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentScope {
    pub scope_ref: ScopeReference,
}

/// Resolved reference to a scope instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeReference {
    pub api_version: String,
    pub kind: String,
    pub name: String,
}

/// Points at the latest ApplicationRevision; named after the Application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationContext {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_context_kind")]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    pub spec: ApplicationContextSpec,
}

impl ApplicationContext {
    pub fn new(metadata: ObjectMeta, application_revision_name: impl Into<String>) -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_context_kind(),
            metadata,
            spec: ApplicationContextSpec {
                application_revision_name: application_revision_name.into(),
            },
        }
    }
}

impl Object for ApplicationContext {
    const API_VERSION: &'static str = oam::API_VERSION_V1ALPHA2;
    const KIND: &'static str = oam::kind::APPLICATION_CONTEXT;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationContextSpec {
    pub application_revision_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reference_pinning() {
        let mut reference = ComponentReference::named("myweb");
        assert_eq!(reference.target(), Some("myweb"));

        reference.pin("myweb-v3");
        assert_eq!(reference.component_name, None);
        assert_eq!(reference.target(), Some("myweb-v3"));
        assert_eq!(
            serde_json::to_value(&reference).unwrap(),
            json!({"revisionName": "myweb-v3"})
        );
    }

    #[test]
    fn test_configuration_shape() {
        let mut config = ApplicationConfiguration::new(ObjectMeta::new("app", "default"));
        config.spec.components.push(ComponentReference {
            component_name: Some("myweb".into()),
            revision_name: None,
            traits: vec![ComponentTrait {
                object: json!({"kind": "ManualScalerTrait"}),
            }],
            scopes: vec![ComponentScope {
                scope_ref: ScopeReference {
                    api_version: "core.oam.dev/v1alpha2".into(),
                    kind: "HealthScope".into(),
                    name: "health-check".into(),
                },
            }],
        });

        let value = config.to_value().unwrap();
        assert_eq!(
            value["spec"]["components"][0],
            json!({
                "componentName": "myweb",
                "traits": [{"trait": {"kind": "ManualScalerTrait"}}],
                "scopes": [{"scopeRef": {
                    "apiVersion": "core.oam.dev/v1alpha2",
                    "kind": "HealthScope",
                    "name": "health-check"
                }}]
            })
        );
    }

    #[test]
    fn test_context_shape() {
        let ctx = ApplicationContext::new(ObjectMeta::new("app", "default"), "app-v2");
        let value = ctx.to_value().unwrap();
        assert_eq!(value["kind"], json!("ApplicationContext"));
        assert_eq!(value["spec"], json!({"applicationRevisionName": "app-v2"}));
    }
}
