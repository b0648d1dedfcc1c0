use thiserror::Error;

/// Core error types for Vela object handling
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid object name: {0}")]
    InvalidName(String),

    #[error("Invalid revision name: {0}")]
    InvalidRevisionName(String),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Time formatting error: {0}")]
    TimeError(#[from] time::error::Format),

    #[error("Invalid object data: {message}")]
    InvalidObject { message: String },

    #[error("Regex error: {0}")]
    RegexError(#[from] regex::Error),
}

impl CoreError {
    /// Create a new InvalidName error
    pub fn invalid_name(name: impl Into<String>) -> Self {
        Self::InvalidName(name.into())
    }

    /// Create a new InvalidRevisionName error
    pub fn invalid_revision_name(name: impl Into<String>) -> Self {
        Self::InvalidRevisionName(name.into())
    }

    /// Create a new InvalidObject error
    pub fn invalid_object(message: impl Into<String>) -> Self {
        Self::InvalidObject {
            message: message.into(),
        }
    }

    /// Check if this error was caused by malformed caller input
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidName(_)
                | Self::InvalidRevisionName(_)
                | Self::InvalidObject { .. }
                | Self::JsonError(_)
        )
    }

    /// Get error category for logging/metrics
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidName(_) | Self::InvalidRevisionName(_) => "validation",
            Self::InvalidObject { .. } => "validation",
            Self::JsonError(_) => "serialization",
            Self::TimeError(_) => "time",
            Self::RegexError(_) => "regex",
        }
    }
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
