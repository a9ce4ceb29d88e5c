//! # Cache Errors

use thiserror::Error;

use crate::bridge::BridgeError;
use crate::error::ErrorKind;
use crate::model::ModelError;
use crate::storage::StorageError;

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache errors
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// Channel outside `memory|local|session`
    #[error("Invalid storage mechanism sent to {cache}.channel")]
    InvalidChannel { cache: String },

    /// Expiration that is not a non-negative integer
    #[error("Invalid expiration time set for {cache}.expiration")]
    InvalidExpiration { cache: String },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

impl CacheError {
    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            CacheError::InvalidChannel { .. } => "SYME_CACHE_INVALID_CHANNEL",
            CacheError::InvalidExpiration { .. } => "SYME_CACHE_INVALID_EXPIRATION",
            CacheError::Storage(err) => err.code(),
            CacheError::Model(err) => err.code(),
            CacheError::Bridge(err) => err.code(),
        }
    }

    /// Class of failure
    pub fn kind(&self) -> ErrorKind {
        match self {
            CacheError::InvalidChannel { .. } | CacheError::InvalidExpiration { .. } => {
                ErrorKind::Configuration
            }
            CacheError::Storage(err) => err.kind(),
            CacheError::Model(err) => err.kind(),
            CacheError::Bridge(err) => err.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_cache() {
        let err = CacheError::InvalidChannel {
            cache: "UserCache".into(),
        };
        assert_eq!(err.to_string(), "Invalid storage mechanism sent to UserCache.channel");
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let err = CacheError::InvalidExpiration {
            cache: "UserCache".into(),
        };
        assert_eq!(err.to_string(), "Invalid expiration time set for UserCache.expiration");
    }

    #[test]
    fn test_wrapped_errors_keep_codes() {
        let err: CacheError = StorageError::UnknownWatch.into();
        assert_eq!(err.code(), "SYME_UNKNOWN_WATCH");
        let err: CacheError = BridgeError::PortClosed.into();
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
