//! syme - Observable models and a channel-keyed, hydratable cache
//!
//! - [`model`]: records with typed, validated fields and batched change events
//! - [`storage`]: memory/local/session channels with freshness bookkeeping,
//!   watchers and hydration snapshots
//! - [`cache`]: a key bound to a channel and an expiration
//! - [`bridge`]: message passing between caches and a shared worker
//!
//! [`host`] supplies the clock, scheduler and identifiers the rest relies on.

pub mod bridge;
pub mod cache;
pub mod config;
pub mod error;
pub mod host;
pub mod model;
pub mod observability;
pub mod storage;

pub use cache::{Cache, CacheData, CacheDefinition};
pub use config::SymeConfig;
pub use error::ErrorKind;
pub use model::{Definition, Model, ModelType};
pub use storage::{Channel, ControllerOptions, HostEnvironment, StorageController};
