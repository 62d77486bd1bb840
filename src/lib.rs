//! Network-bound HTTP core library
//!
//! This library issues HTTP(S) requests that must travel over a specific
//! network interface class (default route, Wi-Fi only, or cellular only) and
//! streams progress back to a subscriber as events instead of returning a
//! single blocking result.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`network`] - Transport classes, network handles, the connectivity
//!   service seam and the [`NetworkSelector`] that acquires handles
//! - [`request`] - Immutable request descriptors built from host arguments
//! - [`events`] - Progress/status/terminal events and the event sink seam
//! - [`executor`] - The [`RequestExecutor`] that performs the exchange over a
//!   handle and streams the body to its output destination
//! - [`plugin`] - The host-facing [`NetworkBoundHttp`] service that wires
//!   acquisition, execution, cancellation and listener management together

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod events;
pub mod executor;
pub mod network;
pub mod plugin;
pub mod request;
#[cfg(test)]
pub mod test_support;
pub(crate) mod user_agent;

// Re-export commonly used types
pub use events::{
    Cancelled, Canceller, ChannelEventSink, ErrorKind, EventSink, RequestEmitter, RequestEvent,
    SubscriberGone, event_channel,
};
pub use executor::{
    DEFAULT_MAX_CHUNK_SIZE, ExecutorOptions, RequestError, RequestExecutor,
};
pub use network::{
    AcquisitionError, ConnectivityService, ListenerId, NetworkCallback, NetworkFilter,
    NetworkHandle, NetworkSelector, PlatformError, SystemConnectivity, TransportClass,
    TransportMedium, UnknownTransport,
};
pub use plugin::{NetworkBoundHttp, PluginError};
pub use request::{
    DEFAULT_TIMEOUT_MS, DescriptorError, Headers, RequestDefaults, RequestDescriptor,
    RequestDescriptorBuilder,
};
