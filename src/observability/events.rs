//! Observable events
//!
//! Every log line names one of these. Events are explicit and typed.

use std::fmt;

/// Observable events across models, storage, caches and the worker bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Lifecycle
    /// StorageController initialized
    ControllerInit,
    /// StorageController shut down
    ControllerShutdown,
    /// Configuration loaded
    ConfigLoaded,

    // Hydration
    /// Snapshot accepted, hydration pass scheduled
    HydrationScheduled,
    /// Hydration pass repopulated every seeded entry
    HydrationComplete,
    /// Snapshot payload rejected
    HydrationRejected,

    // Storage
    /// Expired or malformed entry removed by a prune pass
    CachePrune,
    /// Freshness record failed to parse and was dropped
    FreshnessMalformed,
    /// A host medium failed its feature probe
    StorageProbeFailed,
    /// A channel fell back to a weaker medium
    ChannelDegraded,
    /// A host medium failed during a read or write
    StorageMediumFailed,

    // Model
    /// Reserved identifier skipped during extend
    ReservedFieldSkipped,
    /// Transform chain rejected an assignment
    AssignmentRejected,

    // Cache
    /// Watched data could not be coerced into the configured model
    WatchCoercionFailed,
    /// Cache swapped to a worker-backed controller
    WorkerRegistered,

    // Bridge
    /// A bridge message could not be handled
    BridgeMessageDropped,
    /// A query round-trip timed out
    QueryTimeout,
    /// A port disconnected from the shared worker
    PortClosed,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ControllerInit => "CONTROLLER_INIT",
            Event::ControllerShutdown => "CONTROLLER_SHUTDOWN",
            Event::ConfigLoaded => "CONFIG_LOADED",

            Event::HydrationScheduled => "HYDRATION_SCHEDULED",
            Event::HydrationComplete => "HYDRATION_COMPLETE",
            Event::HydrationRejected => "HYDRATION_REJECTED",

            Event::CachePrune => "CACHE_PRUNE",
            Event::FreshnessMalformed => "FRESHNESS_MALFORMED",
            Event::StorageProbeFailed => "STORAGE_PROBE_FAILED",
            Event::ChannelDegraded => "CHANNEL_DEGRADED",
            Event::StorageMediumFailed => "STORAGE_MEDIUM_FAILED",

            Event::ReservedFieldSkipped => "RESERVED_FIELD_SKIPPED",
            Event::AssignmentRejected => "ASSIGNMENT_REJECTED",

            Event::WatchCoercionFailed => "WATCH_COERCION_FAILED",
            Event::WorkerRegistered => "WORKER_REGISTERED",

            Event::BridgeMessageDropped => "BRIDGE_MESSAGE_DROPPED",
            Event::QueryTimeout => "QUERY_TIMEOUT",
            Event::PortClosed => "PORT_CLOSED",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
