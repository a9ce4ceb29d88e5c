//! Observability for syme
//!
//! Structured JSON logging with typed event names.
//!
//! # Principles
//!
//! 1. Observability is read-only
//! 2. No side effects on execution
//! 3. Deterministic output
//!
//! # Usage
//!
//! ```ignore
//! use syme::observability::{Event, Logger};
//!
//! Logger::warn(Event::CachePrune, &[("channel", "local"), ("key", "users")]);
//! ```

mod events;
mod logger;

pub use events::Event;
pub use logger::{Logger, Severity};
