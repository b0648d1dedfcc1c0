//! Immutable ApplicationRevision snapshots.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::application::Application;
use crate::definition::{
    ComponentDefinition, ScopeDefinition, TraitDefinition, WorkloadDefinition,
};
use crate::meta::{Object, ObjectMeta};
use crate::oam;

fn default_api_version() -> String {
    oam::API_VERSION_V1BETA1.to_string()
}

fn default_kind() -> String {
    oam::kind::APPLICATION_REVISION.to_string()
}

/// Snapshot of an Application plus every definition it was rendered with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationRevision {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    pub spec: ApplicationRevisionSpec,
}

impl ApplicationRevision {
    pub fn new(metadata: ObjectMeta, spec: ApplicationRevisionSpec) -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            metadata,
            spec,
        }
    }

    /// Hash recorded in the `app.oam.dev/appRevisionHash` label.
    pub fn recorded_hash(&self) -> Option<&str> {
        self.metadata
            .labels
            .get(oam::label::APP_REVISION_HASH)
            .map(String::as_str)
    }
}

impl Object for ApplicationRevision {
    const API_VERSION: &'static str = oam::API_VERSION_V1BETA1;
    const KIND: &'static str = oam::kind::APPLICATION_REVISION;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

/// Definition maps are keyed by definition name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationRevisionSpec {
    pub application: Application,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub component_definitions: BTreeMap<String, ComponentDefinition>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub workload_definitions: BTreeMap<String, WorkloadDefinition>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub trait_definitions: BTreeMap<String, TraitDefinition>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub scope_definitions: BTreeMap<String, ScopeDefinition>,
    /// Rendered configuration at this revision. Informational only.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub application_configuration: Value,
    #[serde(default)]
    pub revision: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_revision_hash_label() {
        let spec = ApplicationRevisionSpec {
            application: Application::new("app", "default"),
            component_definitions: BTreeMap::new(),
            workload_definitions: BTreeMap::new(),
            trait_definitions: BTreeMap::new(),
            scope_definitions: BTreeMap::new(),
            application_configuration: Value::Null,
            revision: 1,
        };
        let meta = ObjectMeta::new("app-v1", "default")
            .with_label(oam::label::APP_REVISION_HASH, "0123456789abcdef");
        let rev = ApplicationRevision::new(meta, spec);

        assert_eq!(rev.recorded_hash(), Some("0123456789abcdef"));
        let value = rev.to_value().unwrap();
        assert_eq!(value["kind"], json!("ApplicationRevision"));
        assert_eq!(value["spec"]["revision"], json!(1));
        assert!(value["spec"].get("applicationConfiguration").is_none());
    }
}
