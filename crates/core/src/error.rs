//! Error types for domain validation

use thiserror::Error;

/// Result type for domain operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while building or validating domain values
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A field holds a value the domain does not accept
    #[error("Invalid {field}: {reason}")]
    InvalidField { field: String, reason: String },

    /// An identifier string could not be used
    #[error("Invalid identifier: '{0}'")]
    InvalidId(String),

    /// Several validation failures collected together
    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
}

impl CoreError {
    /// Creates an invalid-field error
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Returns a message suitable for showing to the person editing the list
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidField { field, .. } => format!("Please check the {} value.", field),
            Self::InvalidId(_) => "That list or item could not be found.".to_string(),
            Self::Validation(errors) => errors.join(" "),
        }
    }
}
