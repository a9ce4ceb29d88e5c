//! Error taxonomy shared by every module's error type
//!
//! Each module keeps its own `thiserror` enum; `kind()` on those enums maps
//! into this taxonomy so callers can branch on the class of failure.

use std::fmt;

/// Class of failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid channel, expiration, `before` target or missing model.
    /// Raised synchronously at construction/setup time.
    Configuration,
    /// Malformed hydration snapshot or wire message
    Format,
    /// A raw value could not be coerced into the declared model type
    Coercion,
    /// Identifier generation exhausted its collision budget
    Entropy,
    /// Host medium or transport failure
    Io,
    /// Lock poisoning or a component used after shutdown
    Internal,
}

impl ErrorKind {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "CONFIGURATION",
            ErrorKind::Format => "FORMAT",
            ErrorKind::Coercion => "COERCION",
            ErrorKind::Entropy => "ENTROPY",
            ErrorKind::Io => "IO",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
