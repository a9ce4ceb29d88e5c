//! # Worker Bridge
//!
//! Lets caches in several contexts share one store through message passing.
//!
//! - [`BridgeMessage`]: the `register`/`update`/`remove`/`query` protocol
//! - [`Port`]: one end of a bidirectional channel
//! - [`SharedWorker`]: the background context holding the shared data
//! - [`WorkerProxy`]: the cache-side stand-in for a storage controller
//!
//! Both message loops run on tokio and hold only weak references to their
//! owners, so dropping a worker or proxy stops its loop.

mod errors;
mod message;
mod port;
mod proxy;
mod worker;

pub use errors::{BridgeError, BridgeResult};
pub use message::{BridgeMessage, QueryPayload};
pub use port::{Port, PortReceiver, PortSender};
pub use proxy::WorkerProxy;
pub use worker::{DeliveryReport, SharedWorker};
