//! Render error types.

use std::fmt;

use crate::expr::ExprError;

/// Errors produced while validating parameters or evaluating a template.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// The template document itself is malformed.
    #[error("Invalid template: {message}")]
    InvalidTemplate { message: String },

    /// A required parameter was not supplied and has no default.
    #[error("Missing required parameter: {path}")]
    MissingParameter { path: String },

    /// A parameter value does not match its declared type.
    #[error("Parameter {path}: expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: String,
        found: String,
    },

    /// A parameter was supplied that the template does not declare.
    #[error("Unknown parameter: {path}")]
    UnknownParameter { path: String },

    /// A parameter value is outside its allowed set.
    #[error("Parameter {path}: {message}")]
    InvalidParameter { path: String, message: String },

    /// An expression inside the template failed to evaluate.
    #[error("{field}: {source}")]
    Expression {
        /// Location inside the template, e.g. `output.spec.replicas`.
        field: String,
        #[source]
        source: ExprError,
    },

    /// The external-data step failed.
    #[error("Fetch {url} failed: {message}")]
    Fetch { url: String, message: String },

    /// The external-data step did not complete within the caller's timeout.
    #[error("Fetch {url} timed out after {timeout_ms}ms")]
    FetchTimeout { url: String, timeout_ms: u64 },
}

impl RenderError {
    /// Creates a new `InvalidTemplate` error.
    #[must_use]
    pub fn invalid_template(message: impl Into<String>) -> Self {
        Self::InvalidTemplate {
            message: message.into(),
        }
    }

    /// Creates a new `TypeMismatch` error.
    #[must_use]
    pub fn type_mismatch(
        path: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            path: path.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Creates a new `Expression` error.
    #[must_use]
    pub fn expression(field: impl Into<String>, source: ExprError) -> Self {
        Self::Expression {
            field: field.into(),
            source,
        }
    }

    /// Creates a new `Fetch` error.
    #[must_use]
    pub fn fetch(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fetch {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if evaluation stopped on a reference with no value.
    #[must_use]
    pub fn is_unresolved(&self) -> bool {
        matches!(
            self,
            Self::Expression {
                source: ExprError::Unresolved { .. },
                ..
            }
        )
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> RenderErrorCategory {
        match self {
            Self::InvalidTemplate { .. } => RenderErrorCategory::Template,
            Self::MissingParameter { .. }
            | Self::TypeMismatch { .. }
            | Self::UnknownParameter { .. }
            | Self::InvalidParameter { .. } => RenderErrorCategory::Parameter,
            Self::Expression { .. } => RenderErrorCategory::Evaluation,
            Self::Fetch { .. } | Self::FetchTimeout { .. } => RenderErrorCategory::ExternalData,
        }
    }
}

/// Categories of render errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderErrorCategory {
    Template,
    Parameter,
    Evaluation,
    ExternalData,
}

impl fmt::Display for RenderErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Template => write!(f, "template"),
            Self::Parameter => write!(f, "parameter"),
            Self::Evaluation => write!(f, "evaluation"),
            Self::ExternalData => write!(f, "external_data"),
        }
    }
}
