//! # vela-core
//!
//! Object model shared by every Vela crate: the Application and its status,
//! capability definitions, object metadata with explicit owner references,
//! deterministic revision naming and canonical JSON for content hashing.
//!
//! Persisted objects travel as `serde_json::Value` documents; the types here
//! are typed views over those documents (see [`Object`]).

pub mod application;
pub mod canonical;
pub mod component;
pub mod configuration;
pub mod definition;
pub mod error;
pub mod id;
pub mod meta;
pub mod naming;
pub mod oam;
pub mod revision;
pub mod time;

pub use application::{
    Application, ApplicationComponent, ApplicationComponentStatus, ApplicationPhase,
    ApplicationSpec, ApplicationStatus, ApplicationTrait, ApplicationTraitStatus, Condition,
    ConditionStatus, LatestRevision,
};
pub use component::{Component, ComponentRevision, ComponentSpec, ComponentStatus, RevisionPointer};
pub use configuration::{
    ApplicationConfiguration, ApplicationConfigurationSpec, ApplicationContext,
    ApplicationContextSpec, ComponentReference, ComponentScope, ComponentTrait, ScopeReference,
};
pub use definition::{
    ComponentDefinition, ComponentDefinitionSpec, Definition, DefinitionReference,
    DefinitionSpec, Schematic, ScopeDefinition, ScopeDefinitionSpec, StatusSpec,
    TraitDefinition, TraitDefinitionSpec, WorkloadDefinition, WorkloadDefinitionSpec,
    WorkloadTypeDescriptor,
};
pub use error::{CoreError, Result};
pub use id::generate_uid;
pub use meta::{Object, ObjectKey, ObjectMeta, OwnerReference, TypeReference};
pub use naming::{extract_revision, revision_name, validate_name};
pub use revision::{ApplicationRevision, ApplicationRevisionSpec};
pub use self::time::{now_rfc3339, now_utc};
