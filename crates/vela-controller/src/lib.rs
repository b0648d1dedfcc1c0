//! # vela-controller
//!
//! Turns Applications into the objects that run them:
//!
//! - [`appfile`]: resolves definitions and renders components and traits
//! - [`configuration`]: builds Components and the ApplicationConfiguration
//! - [`revision`]: content hashing and ApplicationRevision lineage
//! - [`apply`]: the per-Application reconcile pass
//! - [`health`]: health and custom status against live objects
//! - [`controller`]: watch-driven work queue and workers
//!
//! Definitions come from a [`DefinitionRegistry`], an explicit object
//! refreshed from the store.

pub mod appfile;
pub mod apply;
pub mod configuration;
pub mod controller;
pub mod error;
pub mod health;
pub mod registry;
pub mod revision;

pub use appfile::{AppFile, AppParser, ComponentFile, DefinitionClosure, RenderedObject, TraitFile};
pub use apply::{
    AppKey, ApplyHandler, ApplySummary, CONDITION_APPLIED, CONDITION_PARSED, CONDITION_REVISION,
    PassOutcome, PassState,
};
pub use configuration::generate_application_configuration;
pub use controller::{Controller, ControllerConfig, WorkQueue};
pub use error::{ControllerError, ErrorCategory};
pub use health::{evaluate_application_health, evaluate_component_health};
pub use registry::{DefinitionLookup, DefinitionRegistry, DefinitionSnapshot, is_definition_kind};
pub use revision::{
    RevisionDecision, RevisionState, build_revision_spec, compute_app_revision_hash,
    decide_revision, deep_equal_revision,
};
