//! # Storage Errors

use thiserror::Error;

use crate::error::ErrorKind;
use crate::host::HostError;

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage and controller errors
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// A channel name outside `memory|local|session`
    #[error("Invalid storage mechanism sent to StorageController.{caller}")]
    InvalidChannel { caller: &'static str },

    /// The hydration snapshot could not be decoded or is not an object
    #[error("Invalid snapshot passed through {global}: {reason}")]
    InvalidSnapshot { global: String, reason: String },

    /// `unregister` for a watch that is not registered
    #[error("Cannot unregister an unregistered event")]
    UnknownWatch,

    /// The controller was used after `shutdown`
    #[error("StorageController has been shut down")]
    ShutDown,

    /// A stored value is not valid JSON
    #[error("Stored value for {key} is not valid JSON: {reason}")]
    Encoding { key: String, reason: String },

    /// The host medium failed
    #[error("I/O error: {0}")]
    Io(String),

    /// Identifier generation failed
    #[error(transparent)]
    Host(#[from] HostError),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StorageError {
    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            StorageError::InvalidChannel { .. } => "SYME_INVALID_CHANNEL",
            StorageError::InvalidSnapshot { .. } => "SYME_INVALID_SNAPSHOT",
            StorageError::UnknownWatch => "SYME_UNKNOWN_WATCH",
            StorageError::ShutDown => "SYME_SHUT_DOWN",
            StorageError::Encoding { .. } => "SYME_STORAGE_ENCODING",
            StorageError::Io(_) => "SYME_STORAGE_IO_ERROR",
            StorageError::Host(err) => err.code(),
            StorageError::Internal(_) => "SYME_INTERNAL",
        }
    }

    /// Class of failure
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::InvalidChannel { .. } | StorageError::UnknownWatch => {
                ErrorKind::Configuration
            }
            StorageError::InvalidSnapshot { .. } | StorageError::Encoding { .. } => {
                ErrorKind::Format
            }
            StorageError::Io(_) => ErrorKind::Io,
            StorageError::Host(err) => err.kind(),
            StorageError::ShutDown | StorageError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn poisoned() -> Self {
        StorageError::Internal("Lock poisoned".into())
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_channel_names_caller() {
        let err = StorageError::InvalidChannel { caller: "populate" };
        assert_eq!(
            err.to_string(),
            "Invalid storage mechanism sent to StorageController.populate"
        );
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_host_errors_keep_their_code() {
        let err: StorageError = HostError::MaxCollisions { attempts: 21 }.into();
        assert_eq!(err.code(), "SYME_MAX_COLLISIONS");
        assert_eq!(err.kind(), ErrorKind::Entropy);
    }
}
