//! # Cache
//!
//! [`Cache`] binds a key, a channel and an expiration to a backend: the
//! [`StorageController`](crate::storage::StorageController) by default, or a
//! [`WorkerProxy`](crate::bridge::WorkerProxy) after
//! [`Cache::register_worker`].
//!
//! ```ignore
//! let cache = Cache::new(
//!     CacheDefinition::new("Users").channel("local").expiration(1000),
//!     controller,
//! )?;
//! cache.populate(json!([{"name": "rick"}]))?;
//! let users = cache.cached()?;
//! ```

mod backend;
#[allow(clippy::module_inception)]
mod cache;
mod errors;

pub use backend::{Backend, CacheBackend};
pub use cache::{Cache, CacheData, CacheDefinition, CacheModel};
pub use errors::{CacheError, CacheResult};
