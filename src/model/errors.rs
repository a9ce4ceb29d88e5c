//! # Model Errors

use thiserror::Error;

use crate::error::ErrorKind;

/// Result type for model operations
pub type ModelResult<T> = Result<T, ModelError>;

/// Model errors
///
/// Transform-chain rejections are not errors; they surface as
/// [`Assignment::Rejected`](super::Assignment::Rejected).
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    /// `before` named a field that was never defined
    #[error("Model: called before on a property ({field}) that does not exist")]
    MissingBeforeTarget { field: String },

    /// A single-change subscription on the wildcard scope, which only
    /// `on_any_update` can serve
    #[error("Model: subscribe to (*) through on_any_update, which receives every field's change")]
    WildcardScope,

    /// Read or write of a field that was never defined
    #[error("Model {model}: no property named ({field})")]
    UnknownField { model: String, field: String },

    /// `fill` or coercion from a value that is neither an object nor null
    #[error("Model {model}: cannot fill from a {found} value")]
    InvalidSource { model: String, found: &'static str },

    /// Assignment of a value with the wrong shape for the field
    #[error("Model {model}: property ({field}) expects {expected}, got {found}")]
    InvalidAssignment {
        model: String,
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    /// A model type's factory built an instance of a different type
    #[error("Model type {expected} produced an instance of {found}")]
    TypeMismatch { expected: String, found: String },

    /// A JSON definition that is not an object
    #[error("Model definition must be an object, got {0}")]
    InvalidDefinition(&'static str),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ModelError {
    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            ModelError::MissingBeforeTarget { .. } => "SYME_MODEL_BEFORE_TARGET",
            ModelError::WildcardScope => "SYME_MODEL_WILDCARD_SCOPE",
            ModelError::UnknownField { .. } => "SYME_MODEL_UNKNOWN_FIELD",
            ModelError::InvalidSource { .. } => "SYME_MODEL_INVALID_SOURCE",
            ModelError::InvalidAssignment { .. } => "SYME_MODEL_INVALID_ASSIGNMENT",
            ModelError::TypeMismatch { .. } => "SYME_MODEL_TYPE_MISMATCH",
            ModelError::InvalidDefinition(_) => "SYME_MODEL_INVALID_DEFINITION",
            ModelError::Internal(_) => "SYME_INTERNAL",
        }
    }

    /// Class of failure
    pub fn kind(&self) -> ErrorKind {
        match self {
            ModelError::MissingBeforeTarget { .. }
            | ModelError::WildcardScope
            | ModelError::UnknownField { .. }
            | ModelError::InvalidDefinition(_) => ErrorKind::Configuration,
            ModelError::InvalidSource { .. }
            | ModelError::InvalidAssignment { .. }
            | ModelError::TypeMismatch { .. } => ErrorKind::Coercion,
            ModelError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn poisoned() -> Self {
        ModelError::Internal("Lock poisoned".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_before_message_names_field() {
        let err = ModelError::MissingBeforeTarget {
            field: "bean".into(),
        };
        assert_eq!(
            err.to_string(),
            "Model: called before on a property (bean) that does not exist"
        );
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_coercion_kind() {
        let err = ModelError::InvalidSource {
            model: "User".into(),
            found: "string",
        };
        assert_eq!(err.kind(), ErrorKind::Coercion);
        assert_eq!(err.code(), "SYME_MODEL_INVALID_SOURCE");
    }
}
