//! # Bridge Errors
//!
//! Error types for the cross-context bridge.

use thiserror::Error;

use crate::error::ErrorKind;
use crate::host::HostError;

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Bridge errors
#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    /// Workers and proxies run their message loops on tokio
    #[error("The worker bridge must be started inside a tokio runtime")]
    NoRuntime,

    /// The other end of the port is gone
    #[error("Port closed")]
    PortClosed,

    /// No answer to a query within the timeout
    #[error("Query {uuid} timed out after {after_ms}ms")]
    QueryTimeout { uuid: String, after_ms: u64 },

    /// A message that is not a bridge action
    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    /// Identifier generation failed
    #[error(transparent)]
    Host(#[from] HostError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::NoRuntime => "SYME_BRIDGE_NO_RUNTIME",
            BridgeError::PortClosed => "SYME_BRIDGE_PORT_CLOSED",
            BridgeError::QueryTimeout { .. } => "SYME_BRIDGE_QUERY_TIMEOUT",
            BridgeError::InvalidMessage(_) => "SYME_BRIDGE_INVALID_MESSAGE",
            BridgeError::Host(err) => err.code(),
            BridgeError::Internal(_) => "SYME_BRIDGE_INTERNAL",
        }
    }

    /// Class of failure
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::NoRuntime => ErrorKind::Configuration,
            BridgeError::PortClosed | BridgeError::QueryTimeout { .. } => ErrorKind::Io,
            BridgeError::InvalidMessage(_) => ErrorKind::Format,
            BridgeError::Host(err) => err.kind(),
            BridgeError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn poisoned() -> Self {
        BridgeError::Internal("lock poisoned".to_string())
    }
}
