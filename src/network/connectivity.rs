//! Narrow seam over the platform's connectivity service.
//!
//! The selector only needs three things from the platform: the currently
//! active network, a way to register an availability listener for a filter,
//! and a way to remove that listener again. Everything else about the OS
//! networking stack stays behind this trait so acquisition logic can be
//! tested with a fake.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use super::handle::NetworkHandle;
use super::transport::NetworkFilter;

/// Identifies one registered availability listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Wraps a platform-assigned listener number.
    #[must_use]
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the platform-assigned listener number.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

/// Failure reported by the platform itself (not by the network).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("connectivity service error: {message}")]
pub struct PlatformError {
    /// Platform-supplied description.
    pub message: String,
}

impl PlatformError {
    /// Creates a platform error with the given description.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Availability notifications delivered by the platform.
///
/// Implementations must tolerate being called from any thread, and must
/// tolerate signals arriving after the listener was already satisfied.
pub trait NetworkCallback: Send + Sync {
    /// A network matching the filter is available.
    fn on_available(&self, handle: NetworkHandle);

    /// The platform determined the filter cannot be satisfied.
    fn on_unavailable(&self);
}

/// Platform connectivity service.
///
/// Implementations are shared across concurrent requests and must be safe
/// for concurrent registration.
pub trait ConnectivityService: Send + Sync {
    /// Returns the network the platform currently routes through, if any.
    ///
    /// May block; [`NetworkSelector`](super::NetworkSelector) calls it on
    /// tokio's blocking pool.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError`] if the platform could not be queried.
    fn active_network(&self) -> Result<Option<NetworkHandle>, PlatformError>;

    /// Registers `callback` for networks matching `filter`.
    ///
    /// The callback may fire before this method returns. Called from async
    /// context, so slow platform work belongs on a background task.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError`] if the listener could not be registered; in
    /// that case nothing needs to be unregistered.
    fn request_network(
        &self,
        filter: NetworkFilter,
        callback: Arc<dyn NetworkCallback>,
    ) -> Result<ListenerId, PlatformError>;

    /// Removes a previously registered listener.
    fn unregister_network_callback(&self, listener: ListenerId);
}
