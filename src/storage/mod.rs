//! # Storage
//!
//! Channel-keyed JSON storage with freshness bookkeeping.
//!
//! - [`Channel`]: `memory`, `local` or `session`
//! - [`KeyValueMedium`]: host media ([`FileMedium`], [`VolatileMedium`])
//! - [`Storage`]: the three channel stores, probed and degraded
//! - [`StorageController`]: populate/remove/get/freshness, watchers,
//!   pruning and hydration snapshots
//!
//! A [`HostEnvironment::headless`] host has no persistent media and every
//! channel collapses to `memory`.

mod channel;
mod controller;
mod errors;
mod freshness;
mod medium;
mod snapshot;
mod store;
mod watch;

pub use channel::{Channel, IntoChannel, UnknownChannel};
pub use controller::{ControllerOptions, StorageController, DEFAULT_GLOBAL};
pub use errors::{StorageError, StorageResult};
pub use freshness::Freshness;
pub use medium::{FileMedium, KeyValueMedium, VolatileMedium};
pub use snapshot::Snapshot;
pub use store::{probe, ChannelStore, HostEnvironment, Storage, DEFAULT_NAMESPACE};
pub use watch::{WatchCallback, WatchHandle};

pub(crate) use watch::Unregister;
