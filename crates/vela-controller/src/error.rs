//! Controller error types.

use std::fmt;

use vela_core::CoreError;
use vela_storage::StorageError;
use vela_template::RenderError;

/// Errors that end a reconcile pass.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// A component, trait or scope type names a definition that does not exist.
    #[error("{kind} {name} not found")]
    DefinitionNotFound { kind: String, name: String },

    /// The user config named by the Application does not exist.
    #[error("user config {name} not found")]
    UserConfigNotFound { name: String },

    /// Rendering a component or one of its traits failed.
    #[error("{}: {source}", render_target(.component, .trait_type))]
    Render {
        component: String,
        trait_type: Option<String>,
        #[source]
        source: RenderError,
    },

    /// A concurrent writer won; the pass restarts from the beginning.
    #[error("conflict: {message}")]
    Conflict { message: String },

    /// Hash equality and structural equality disagree for a revision.
    #[error("revision hash mismatch for {app}: hash {hash} disagrees with content comparison")]
    HashMismatch { app: String, hash: String },

    /// A write failed after other writes of the same pass succeeded.
    #[error("apply stopped after {applied} writes: {source}")]
    PartialApply {
        applied: usize,
        #[source]
        source: Box<ControllerError>,
    },

    /// A stored document could not be decoded or built.
    #[error("invalid object: {0}")]
    InvalidObject(#[from] CoreError),

    #[error(transparent)]
    Storage(StorageError),
}

fn render_target(component: &str, trait_type: &Option<String>) -> String {
    match trait_type {
        Some(t) => format!("component {component} trait {t}"),
        None => format!("component {component}"),
    }
}

impl From<StorageError> for ControllerError {
    fn from(err: StorageError) -> Self {
        if err.is_conflict() {
            Self::Conflict {
                message: err.to_string(),
            }
        } else {
            Self::Storage(err)
        }
    }
}

impl From<serde_json::Error> for ControllerError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidObject(CoreError::from(err))
    }
}

impl ControllerError {
    /// Creates a new `DefinitionNotFound` error.
    #[must_use]
    pub fn definition_not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::DefinitionNotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Wraps a render failure of a component's workload.
    #[must_use]
    pub fn render_component(component: impl Into<String>, source: RenderError) -> Self {
        Self::Render {
            component: component.into(),
            trait_type: None,
            source,
        }
    }

    /// Wraps a render failure of one of a component's traits.
    #[must_use]
    pub fn render_trait(
        component: impl Into<String>,
        trait_type: impl Into<String>,
        source: RenderError,
    ) -> Self {
        Self::Render {
            component: component.into(),
            trait_type: Some(trait_type.into()),
            source,
        }
    }

    /// Returns `true` if the pass should be retried immediately.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Returns `true` for failures caused by the Application's content or its
    /// definitions, surfaced as the `Parsed` condition.
    #[must_use]
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            Self::DefinitionNotFound { .. } | Self::UserConfigNotFound { .. } | Self::Render { .. }
        )
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::DefinitionNotFound { .. } | Self::UserConfigNotFound { .. } => {
                ErrorCategory::Definition
            }
            Self::Render { .. } => ErrorCategory::Render,
            Self::Conflict { .. } => ErrorCategory::Conflict,
            Self::HashMismatch { .. } => ErrorCategory::Internal,
            Self::PartialApply { .. } => ErrorCategory::Apply,
            Self::InvalidObject(_) => ErrorCategory::Validation,
            Self::Storage(_) => ErrorCategory::Storage,
        }
    }

    /// Condition reason recorded in the Application status.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::DefinitionNotFound { .. } => "DefinitionNotFound",
            Self::UserConfigNotFound { .. } => "UserConfigNotFound",
            Self::Render { .. } => "RenderFailed",
            Self::Conflict { .. } => "Conflict",
            Self::HashMismatch { .. } => "HashMismatch",
            Self::PartialApply { .. } => "PartialApply",
            Self::InvalidObject(_) => "InvalidObject",
            Self::Storage(_) => "StorageError",
        }
    }
}

/// Categories of controller errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Definition,
    Render,
    Conflict,
    Apply,
    Validation,
    Storage,
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Definition => write!(f, "definition"),
            Self::Render => write!(f, "render"),
            Self::Conflict => write!(f, "conflict"),
            Self::Apply => write!(f, "apply"),
            Self::Validation => write!(f, "validation"),
            Self::Storage => write!(f, "storage"),
            Self::Internal => write!(f, "internal"),
        }
    }
}
