//! Low-level Component objects and their immutable revisions.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::meta::{Object, ObjectMeta};
use crate::oam;

fn default_api_version() -> String {
    oam::API_VERSION_V1ALPHA2.to_string()
}

fn default_kind() -> String {
    oam::kind::COMPONENT.to_string()
}

fn default_revision_kind() -> String {
    oam::kind::COMPONENT_REVISION.to_string()
}

/// One rendered workload, owned by its Application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    pub spec: ComponentSpec,
    #[serde(default)]
    pub status: ComponentStatus,
}

impl Component {
    pub fn new(metadata: ObjectMeta, workload: Value) -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            metadata,
            spec: ComponentSpec { workload },
            status: ComponentStatus::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}

impl Object for Component {
    const API_VERSION: &'static str = oam::API_VERSION_V1ALPHA2;
    const KIND: &'static str = oam::kind::COMPONENT;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSpec {
    /// Opaque rendered workload.
    pub workload: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_revision: Option<RevisionPointer>,
}

/// Name and sequence number of a revision object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionPointer {
    pub name: String,
    pub revision: i64,
}

/// Immutable snapshot of a Component's spec, named `<component>-v<N>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentRevision {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_revision_kind")]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    pub revision: i64,
    /// The Component spec at this revision.
    pub data: ComponentSpec,
}

impl ComponentRevision {
    pub fn new(metadata: ObjectMeta, revision: i64, data: ComponentSpec) -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_revision_kind(),
            metadata,
            revision,
            data,
        }
    }
}

impl Object for ComponentRevision {
    const API_VERSION: &'static str = oam::API_VERSION_V1ALPHA2;
    const KIND: &'static str = oam::kind::COMPONENT_REVISION;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_component_roundtrip_shape() {
        let mut component = Component::new(
            ObjectMeta::new("myweb", "default").with_label(oam::label::APP_NAME, "app"),
            json!({"kind": "Deployment"}),
        );
        component.status.latest_revision = Some(RevisionPointer {
            name: "myweb-v1".into(),
            revision: 1,
        });

        let value = component.to_value().unwrap();
        assert_eq!(value["apiVersion"], json!("core.oam.dev/v1alpha2"));
        assert_eq!(value["kind"], json!("Component"));
        assert_eq!(value["spec"]["workload"]["kind"], json!("Deployment"));
        assert_eq!(value["status"]["latestRevision"]["name"], json!("myweb-v1"));

        let back = Component::from_value(value).unwrap();
        assert_eq!(back, component);
    }

    #[test]
    fn test_component_revision_key() {
        let rev = ComponentRevision::new(
            ObjectMeta::new("myweb-v2", "default"),
            2,
            ComponentSpec {
                workload: json!({}),
            },
        );
        assert_eq!(rev.key().to_string(), "ComponentRevision/default/myweb-v2");
    }
}
