//! Scriptable in-memory connectivity service.
//!
//! Records every registration and deregistration so tests can assert that
//! listeners never leak, and lets tests fire availability signals by hand.

use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::ThreadId;
use std::time::Duration;

use crate::network::{
    ConnectivityService, ListenerId, NetworkCallback, NetworkFilter, NetworkHandle,
    PlatformError, TransportClass,
};

/// How the fake answers a `request_network` call.
#[derive(Debug, Clone, Default)]
pub enum FakeResponse {
    /// Never signal; the test fires signals manually (or lets the timeout win).
    #[default]
    Silent,
    /// Signal availability synchronously during registration.
    Available {
        interface: Option<String>,
        local_address: Option<IpAddr>,
    },
    /// Signal unavailability synchronously during registration.
    Unavailable,
}

type Registered = (ListenerId, NetworkFilter, Arc<dyn NetworkCallback>);

#[derive(Default)]
pub struct FakeConnectivity {
    active_interface: Option<String>,
    platform_error: Option<String>,
    response: FakeResponse,
    next_id: AtomicU64,
    registrations: AtomicUsize,
    unregistrations: AtomicUsize,
    listeners: Mutex<Vec<Registered>>,
    active_network_thread: Mutex<Option<ThreadId>>,
}

impl FakeConnectivity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_active_network(mut self, interface: &str) -> Self {
        self.active_interface = Some(interface.to_string());
        self
    }

    pub fn with_platform_error(mut self, message: &str) -> Self {
        self.platform_error = Some(message.to_string());
        self
    }

    pub fn responding_with(mut self, response: FakeResponse) -> Self {
        self.response = response;
        self
    }

    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }

    pub fn unregistrations(&self) -> usize {
        self.unregistrations.load(Ordering::SeqCst)
    }

    /// Thread the most recent `active_network` query ran on.
    pub fn active_network_thread(&self) -> Option<ThreadId> {
        *self
            .active_network_thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn last_filter(&self) -> Option<NetworkFilter> {
        self.lock().last().map(|(_, filter, _)| *filter)
    }

    /// Fires `on_available` on the most recent listener.
    pub fn signal_available(&self, handle: NetworkHandle) {
        if let Some(callback) = self.last_callback() {
            callback.on_available(handle);
        }
    }

    /// Fires `on_unavailable` on the most recent listener.
    pub fn signal_unavailable(&self) {
        if let Some(callback) = self.last_callback() {
            callback.on_unavailable();
        }
    }

    /// Waits until at least one listener has been registered.
    pub async fn wait_for_registration(&self) {
        while self.registrations() == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    fn last_callback(&self) -> Option<Arc<dyn NetworkCallback>> {
        self.lock().last().map(|(_, _, callback)| Arc::clone(callback))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Registered>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ConnectivityService for FakeConnectivity {
    fn active_network(&self) -> Result<Option<NetworkHandle>, PlatformError> {
        *self
            .active_network_thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(std::thread::current().id());
        if let Some(message) = &self.platform_error {
            return Err(PlatformError::new(message.clone()));
        }
        Ok(self.active_interface.as_ref().map(|interface| {
            NetworkHandle::new(TransportClass::Default, Some(interface.clone()), None)
        }))
    }

    fn request_network(
        &self,
        filter: NetworkFilter,
        callback: Arc<dyn NetworkCallback>,
    ) -> Result<ListenerId, PlatformError> {
        if let Some(message) = &self.platform_error {
            return Err(PlatformError::new(message.clone()));
        }
        let id = ListenerId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.lock().push((id, filter, Arc::clone(&callback)));
        match &self.response {
            FakeResponse::Silent => {}
            FakeResponse::Available {
                interface,
                local_address,
            } => callback.on_available(NetworkHandle::new(
                filter.medium.into(),
                interface.clone(),
                *local_address,
            )),
            FakeResponse::Unavailable => callback.on_unavailable(),
        }
        self.registrations.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    fn unregister_network_callback(&self, _listener: ListenerId) {
        // Listeners stay recorded so tests can fire late signals at them.
        self.unregistrations.fetch_add(1, Ordering::SeqCst);
    }
}
