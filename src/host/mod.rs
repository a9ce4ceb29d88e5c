//! # Host primitives
//!
//! The pieces a browser-style host would provide implicitly, made explicit:
//!
//! - **Clock**: wall time in milliseconds for freshness bookkeeping
//! - **Scheduler**: single-shot delayed tasks for throttle windows and hydration
//! - **Identifiers**: secure-random ids with a bounded collision budget
//!
//! Deterministic [`ManualClock`] / [`ManualScheduler`] variants drive time by
//! hand for tests and replay.

mod clock;
mod errors;
pub mod ident;
mod scheduler;

pub use clock::{Clock, ManualClock, SystemClock};
pub use errors::{HostError, HostResult};
pub use scheduler::{ManualScheduler, Scheduler, Task, TaskHandle, TokioScheduler};
