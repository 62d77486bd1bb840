//! Error types for network acquisition.

use thiserror::Error;

use super::connectivity::PlatformError;
use super::transport::TransportClass;
use crate::events::ErrorKind;

/// Errors that can occur while acquiring a network handle.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    /// DEFAULT transport requested but the platform reports no active network.
    #[error("no active network available")]
    NoActiveNetwork,

    /// The platform reported the requested transport class cannot be obtained.
    #[error("network {transport} unavailable")]
    Unavailable {
        /// The transport class that was requested.
        transport: TransportClass,
    },

    /// No availability or unavailability signal arrived within the budget.
    #[error("timed out after {timeout_ms}ms waiting for {transport} network")]
    Timeout {
        /// The transport class that was requested.
        transport: TransportClass,
        /// The acquisition budget in milliseconds.
        timeout_ms: u64,
    },

    /// The platform could not be queried or could not register the listener.
    #[error("network {transport} unavailable: {source}")]
    Platform {
        /// The transport class that was requested.
        transport: TransportClass,
        /// The underlying platform failure.
        #[source]
        source: PlatformError,
    },
}

impl AcquisitionError {
    /// Creates an unavailability error.
    pub fn unavailable(transport: TransportClass) -> Self {
        Self::Unavailable { transport }
    }

    /// Creates a timeout error.
    pub fn timeout(transport: TransportClass, timeout_ms: u64) -> Self {
        Self::Timeout {
            transport,
            timeout_ms,
        }
    }

    /// Creates a platform error.
    pub fn platform(transport: TransportClass, source: PlatformError) -> Self {
        Self::Platform { transport, source }
    }

    /// Stable kind tag reported to subscribers.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            // DEFAULT never registers a listener; a failed query means nothing to borrow.
            Self::NoActiveNetwork
            | Self::Platform {
                transport: TransportClass::Default,
                ..
            } => ErrorKind::NoActiveNetwork,
            Self::Unavailable { .. } | Self::Platform { .. } => ErrorKind::NetworkUnavailable,
            Self::Timeout { .. } => ErrorKind::AcquisitionTimeout,
        }
    }
}
