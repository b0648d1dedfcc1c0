//! Well-known API groups, kinds, labels and annotations.

/// API version of user-facing objects (Application, definitions).
pub const API_VERSION_V1BETA1: &str = "core.oam.dev/v1beta1";

/// API version of the lower-level objects the controller writes.
pub const API_VERSION_V1ALPHA2: &str = "core.oam.dev/v1alpha2";

/// Namespace searched for definitions that are not found in the
/// Application's own namespace.
pub const DEFAULT_SYSTEM_NAMESPACE: &str = "vela-system";

/// Trait type given to auxiliary outputs of a component template.
pub const AUXILIARY_WORKLOAD: &str = "AuxiliaryWorkload";

pub mod kind {
    pub const APPLICATION: &str = "Application";
    pub const COMPONENT: &str = "Component";
    pub const COMPONENT_REVISION: &str = "ComponentRevision";
    pub const APPLICATION_CONFIGURATION: &str = "ApplicationConfiguration";
    pub const APPLICATION_CONTEXT: &str = "ApplicationContext";
    pub const APPLICATION_REVISION: &str = "ApplicationRevision";
    pub const COMPONENT_DEFINITION: &str = "ComponentDefinition";
    pub const WORKLOAD_DEFINITION: &str = "WorkloadDefinition";
    pub const TRAIT_DEFINITION: &str = "TraitDefinition";
    pub const SCOPE_DEFINITION: &str = "ScopeDefinition";
    pub const CONFIG_MAP: &str = "ConfigMap";

    /// Kinds whose changes must refresh the definition registry.
    pub const DEFINITIONS: [&str; 4] = [
        COMPONENT_DEFINITION,
        WORKLOAD_DEFINITION,
        TRAIT_DEFINITION,
        SCOPE_DEFINITION,
    ];
}

pub mod label {
    /// Name of the Application an object belongs to.
    pub const APP_NAME: &str = "app.oam.dev/name";
    /// Name of the component an object was rendered for.
    pub const APP_COMPONENT: &str = "app.oam.dev/component";
    /// Definition name a workload was rendered from.
    pub const WORKLOAD_TYPE: &str = "workload.oam.dev/type";
    /// Definition name a trait object was rendered from.
    pub const TRAIT_TYPE: &str = "trait.oam.dev/type";
    /// Output key of a named template output.
    pub const TRAIT_RESOURCE: &str = "trait.oam.dev/resource";
    /// Content hash of an ApplicationRevision.
    pub const APP_REVISION_HASH: &str = "app.oam.dev/appRevisionHash";
}

pub mod annotation {
    /// When `"true"`, configuration references are pinned to component revisions.
    pub const ROLLOUT_TEMPLATE: &str = "app.oam.dev/rollout-template";
    /// Name of a ConfigMap whose data becomes `context.config`.
    pub const USER_CONFIG: &str = "app.oam.dev/config";
}
