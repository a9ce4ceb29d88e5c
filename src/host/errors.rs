//! # Host Errors

use thiserror::Error;

use crate::error::ErrorKind;

/// Result type for host primitives
pub type HostResult<T> = Result<T, HostError>;

/// Host primitive errors
#[derive(Debug, Clone, Error)]
pub enum HostError {
    /// Identifier generation kept colliding; the entropy source is suspect
    #[error("Max collisions hit while generating an identifier ({attempts} attempts)")]
    MaxCollisions { attempts: usize },

    /// The secure random source failed
    #[error("Secure random source unavailable: {0}")]
    Entropy(String),
}

impl HostError {
    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            HostError::MaxCollisions { .. } => "SYME_MAX_COLLISIONS",
            HostError::Entropy(_) => "SYME_ENTROPY_UNAVAILABLE",
        }
    }

    /// Class of failure
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Entropy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            HostError::MaxCollisions { attempts: 21 }.code(),
            "SYME_MAX_COLLISIONS"
        );
        assert!(HostError::MaxCollisions { attempts: 21 }
            .to_string()
            .starts_with("Max collisions hit"));
    }
}
