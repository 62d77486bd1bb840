//! Opaque handle to one physical or logical network interface.

use std::net::IpAddr;

use super::transport::TransportClass;

/// A usable binding to a specific network, used to force connections through it.
///
/// Handles are produced by a [`ConnectivityService`](super::ConnectivityService)
/// and consumed by exactly one request. They are deliberately not `Clone`:
/// a handle moves from the selector into the executor and is dropped when the
/// request ends.
///
/// For [`TransportClass::Default`] the handle is borrowed from the platform's
/// ambient routing; the executor does not pin connections to it.
#[derive(Debug, PartialEq, Eq)]
pub struct NetworkHandle {
    transport: TransportClass,
    interface: Option<String>,
    local_address: Option<IpAddr>,
}

impl NetworkHandle {
    /// Creates a handle for a network reached through `interface` and/or `local_address`.
    #[must_use]
    pub fn new(
        transport: TransportClass,
        interface: Option<String>,
        local_address: Option<IpAddr>,
    ) -> Self {
        Self {
            transport,
            interface,
            local_address,
        }
    }

    /// Creates a handle for the platform's ambient route with no interface details.
    #[must_use]
    pub fn ambient() -> Self {
        Self::new(TransportClass::Default, None, None)
    }

    /// Transport class this handle satisfies.
    #[must_use]
    pub fn transport(&self) -> TransportClass {
        self.transport
    }

    /// Interface name (e.g. `wlan0`), when the platform reported one.
    #[must_use]
    pub fn interface(&self) -> Option<&str> {
        self.interface.as_deref()
    }

    /// Local source address connections should originate from.
    #[must_use]
    pub fn local_address(&self) -> Option<IpAddr> {
        self.local_address
    }

    /// Returns true when the handle is borrowed from ambient routing rather than acquired.
    #[must_use]
    pub fn is_borrowed(&self) -> bool {
        self.transport == TransportClass::Default
    }
}
