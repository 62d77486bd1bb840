//! Acquires a [`NetworkHandle`] for a requested transport class.
//!
//! The platform reports availability through callbacks. The selector bridges
//! those callbacks into a single awaitable result with a one-shot channel,
//! races it against the acquisition timeout, and holds the platform listener
//! in a drop guard so it is deregistered exactly once on every exit path.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, instrument, trace, warn};

use super::connectivity::{ConnectivityService, ListenerId, NetworkCallback, PlatformError};
use super::error::AcquisitionError;
use super::handle::NetworkHandle;
use super::transport::{NetworkFilter, TransportClass};

/// Resolves transport classes into network handles.
///
/// A selector holds no per-request state and can be shared across
/// concurrent requests.
#[derive(Clone)]
pub struct NetworkSelector {
    service: Arc<dyn ConnectivityService>,
}

impl std::fmt::Debug for NetworkSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkSelector").finish_non_exhaustive()
    }
}

impl NetworkSelector {
    /// Creates a selector backed by `service`.
    #[must_use]
    pub fn new(service: Arc<dyn ConnectivityService>) -> Self {
        Self { service }
    }

    /// Acquires a handle satisfying `transport` within `timeout`.
    ///
    /// [`TransportClass::Default`] is answered immediately from the
    /// platform's active network. Other classes register a listener and wait
    /// for the first of available, unavailable, or timeout.
    ///
    /// Dropping the returned future while it waits deregisters the listener.
    ///
    /// # Errors
    ///
    /// - [`AcquisitionError::NoActiveNetwork`] when DEFAULT has nothing to borrow
    /// - [`AcquisitionError::Unavailable`] when the platform rejects the request
    /// - [`AcquisitionError::Timeout`] when no signal arrives in time
    /// - [`AcquisitionError::Platform`] when the platform itself fails
    #[instrument(level = "debug", skip(self), fields(transport = %transport))]
    pub async fn acquire(
        &self,
        transport: TransportClass,
        timeout: Duration,
    ) -> Result<NetworkHandle, AcquisitionError> {
        let Some(medium) = transport.medium() else {
            return self.active_network().await;
        };

        let (sender, receiver) = oneshot::channel();
        let bridge = Arc::new(AvailabilityBridge::new(sender));
        let listener = self
            .service
            .request_network(NetworkFilter::for_medium(medium), bridge)
            .map_err(|source| AcquisitionError::platform(transport, source))?;
        let _registration = Registration {
            service: self.service.as_ref(),
            listener,
        };
        debug!(%listener, "waiting for network");

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(Signal::Available(handle))) => {
                debug!(interface = ?handle.interface(), "network available");
                Ok(handle)
            }
            Ok(Ok(Signal::Unavailable)) => {
                debug!("network unavailable");
                Err(AcquisitionError::unavailable(transport))
            }
            Ok(Err(_)) => {
                // The platform released the callback without ever signalling.
                warn!("connectivity service dropped listener without a signal");
                Err(AcquisitionError::unavailable(transport))
            }
            Err(_) => {
                let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                debug!(timeout_ms, "network acquisition timed out");
                Err(AcquisitionError::timeout(transport, timeout_ms))
            }
        }
    }

    // Platform queries may block (interface enumeration, route lookup).
    async fn active_network(&self) -> Result<NetworkHandle, AcquisitionError> {
        let service = Arc::clone(&self.service);
        let handle = tokio::task::spawn_blocking(move || service.active_network())
            .await
            .map_err(|e| {
                PlatformError::new(format!("active network query did not complete: {e}"))
            })
            .and_then(|queried| queried)
            .map_err(|source| AcquisitionError::platform(TransportClass::Default, source))?
            .ok_or(AcquisitionError::NoActiveNetwork)?;
        debug!(interface = ?handle.interface(), "borrowing active network");
        Ok(handle)
    }
}

enum Signal {
    Available(NetworkHandle),
    Unavailable,
}

/// One-shot bridge from platform callbacks to the waiting acquisition.
struct AvailabilityBridge {
    sender: Mutex<Option<oneshot::Sender<Signal>>>,
}

impl AvailabilityBridge {
    fn new(sender: oneshot::Sender<Signal>) -> Self {
        Self {
            sender: Mutex::new(Some(sender)),
        }
    }

    fn resolve(&self, signal: Signal) {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match sender {
            // The receiver may already be gone (timeout won the race).
            Some(sender) => drop(sender.send(signal)),
            None => trace!("ignoring signal for already-resolved acquisition"),
        }
    }
}

impl NetworkCallback for AvailabilityBridge {
    fn on_available(&self, handle: NetworkHandle) {
        self.resolve(Signal::Available(handle));
    }

    fn on_unavailable(&self) {
        self.resolve(Signal::Unavailable);
    }
}

/// Deregisters the platform listener when dropped.
struct Registration<'a> {
    service: &'a dyn ConnectivityService,
    listener: ListenerId,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        trace!(listener = %self.listener, "unregistering network listener");
        self.service.unregister_network_callback(self.listener);
    }
}
